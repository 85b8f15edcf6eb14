// SPDX-License-Identifier: Apache-2.0

//! End-to-end prepare → execute (simulated) → merge scenarios.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use shardline::statement::{
    AggregationType, ColumnPredicate, GroupByContext, InsertStatement, InsertValueRow, OrderByItem, OrderExpr,
    PaginationContext, PaginationSegment, Projection, ProjectionsContext, SelectStatement, TableSegment, ValueExpr,
    WhereSegment,
};
use shardline::{
    ExecutionContext, HintContext, MemoryQueryResult, QueryResult, ShardingKernel, ShardingResult, ShardingRule,
    ShardingRuleConfig, StatementContext, Value, ValueType,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

const RULE: &str = r#"{
    "data_sources": ["ds_0", "ds_1"],
    "tables": [
        {
            "logic_table": "t_order",
            "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
            "database_strategy": { "type": "standard", "sharding_column": "user_id", "algorithm": "ds_mod" },
            "table_strategy": { "type": "standard", "sharding_column": "order_id", "algorithm": "order_inline" },
            "key_generate": { "column": "order_id", "key_generator": "increment" }
        },
        {
            "logic_table": "t_order_item",
            "actual_data_nodes": "ds_${0..1}.t_order_item_${0..1}",
            "database_strategy": { "type": "standard", "sharding_column": "user_id", "algorithm": "ds_mod" },
            "table_strategy": { "type": "standard", "sharding_column": "order_id", "algorithm": "item_inline" }
        }
    ],
    "binding_tables": ["t_order, t_order_item"],
    "broadcast_tables": ["t_dict"],
    "sharding_algorithms": {
        "ds_mod": { "type": "MOD", "props": { "sharding-count": 2 } },
        "order_inline": { "type": "INLINE", "props": { "algorithm-expression": "t_order_${order_id % 2}" } },
        "item_inline": { "type": "INLINE", "props": { "algorithm-expression": "t_order_item_${order_id % 2}" } }
    },
    "key_generators": { "increment": { "type": "INCREMENT", "props": { "start": 1 } } },
    "props": { "sql_show": true }
}"#;

fn kernel() -> ShardingKernel {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(RULE.as_bytes()).unwrap();
    let config = ShardingRuleConfig::from_path(file.path()).unwrap();
    ShardingKernel::new(ShardingRule::from_config(&config).unwrap())
}

fn assert_parses(ctx: &ExecutionContext) {
    for unit in &ctx.execution_units {
        Parser::parse_sql(&MySqlDialect {}, &unit.sql_unit.sql)
            .unwrap_or_else(|e| panic!("rewritten SQL does not parse: {} ({e})", unit.sql_unit.sql));
    }
}

fn projections(stop_index: usize, items: Vec<Projection>) -> ProjectionsContext {
    ProjectionsContext {
        start_index: 7,
        stop_index,
        distinct_row: false,
        items,
    }
}

fn order_ids(rows: &[i64]) -> Box<dyn QueryResult> {
    Box::new(MemoryQueryResult::from_rows(
        &["order_id"],
        rows.iter().map(|v| vec![Value::Int(*v)]).collect(),
    ))
}

fn drain_ints(merged: &mut impl QueryResult) -> Vec<i64> {
    let mut out = Vec::new();
    while merged.next().unwrap() {
        out.push(merged.value(1).unwrap().as_i64().unwrap());
    }
    out
}

const ORDERED_SQL: &str = "SELECT order_id FROM t_order ORDER BY order_id";

fn ordered_select() -> StatementContext {
    StatementContext::Select(SelectStatement {
        tables: vec![TableSegment::new("t_order", 21)],
        projections: projections(14, vec![Projection::column("order_id")]),
        order_by: Some(vec![OrderByItem::asc(OrderExpr::column("order_id"))]),
        ..Default::default()
    })
}

#[test]
fn bound_tables_route_to_one_unit() {
    let kernel = kernel();
    let sql = "SELECT i.* FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id \
               WHERE o.order_id = ? AND o.user_id = ?";
    let statement = StatementContext::Select(SelectStatement {
        tables: vec![
            TableSegment::new("t_order", 16).with_alias("o"),
            TableSegment::new("t_order_item", 31).with_alias("i"),
        ],
        projections: projections(9, vec![Projection::Shorthand { owner: Some("i".into()) }]),
        where_segment: Some(WhereSegment::and(vec![
            ColumnPredicate::equal("order_id", ValueExpr::Parameter(0)).with_owner("o"),
            ColumnPredicate::equal("user_id", ValueExpr::Parameter(1)).with_owner("o"),
        ])),
        ..Default::default()
    });
    let ctx = kernel
        .prepare(sql, &[Value::Int(1), Value::Int(1)], &statement, &HintContext::new())
        .unwrap();

    assert_eq!(ctx.execution_units.len(), 1);
    let unit = &ctx.execution_units[0];
    assert_eq!(unit.data_source, "ds_1");
    assert_eq!(unit.route_unit.actual_table("t_order"), Some("t_order_1"));
    assert_eq!(unit.route_unit.actual_table("t_order_item"), Some("t_order_item_1"));
    assert_eq!(
        unit.sql_unit.sql,
        "SELECT i.* FROM t_order_1 o JOIN t_order_item_1 i ON o.order_id = i.order_id \
         WHERE o.order_id = ? AND o.user_id = ?"
    );
    assert_parses(&ctx);
}

#[test]
fn ordered_shards_merge_into_one_sorted_stream() {
    let kernel = kernel();
    let ctx = kernel
        .prepare(ORDERED_SQL, &[], &ordered_select(), &HintContext::new())
        .unwrap();
    assert_eq!(ctx.execution_units.len(), 4);
    assert_parses(&ctx);

    let cursors = vec![
        order_ids(&[1, 3, 5]),
        order_ids(&[2, 4, 6]),
        order_ids(&[0, 7, 8]),
        order_ids(&[]),
    ];
    let mut merged = kernel.merge(&ctx, cursors).unwrap();
    assert_eq!(drain_ints(&mut merged), (0..=8).collect::<Vec<_>>());
    assert!(merged.is_closed());
}

#[test]
fn pagination_is_reapplied_after_merge() {
    let kernel = kernel();
    let sql = "SELECT order_id FROM t_order ORDER BY order_id LIMIT 5, 10";
    let statement = StatementContext::Select(SelectStatement {
        pagination: Some(PaginationContext {
            offset: Some(PaginationSegment::literal(5, 53)),
            row_count: Some(PaginationSegment::literal(10, 56)),
        }),
        ..match ordered_select() {
            StatementContext::Select(select) => select,
            _ => unreachable!(),
        }
    });
    let ctx = kernel.prepare(sql, &[], &statement, &HintContext::new()).unwrap();
    for unit in &ctx.execution_units {
        assert!(unit.sql_unit.sql.ends_with("LIMIT 0, 15"), "{}", unit.sql_unit.sql);
    }
    assert_parses(&ctx);

    let cursors = (0..4)
        .map(|shard| order_ids(&(0..20).filter(|v| v % 4 == shard).collect::<Vec<_>>()))
        .collect();
    let mut merged = kernel.merge(&ctx, cursors).unwrap();
    assert_eq!(drain_ints(&mut merged), (5..15).collect::<Vec<_>>());
}

#[test]
fn single_shard_single_row_passes_through() {
    let kernel = kernel();
    let sql = "SELECT * FROM t_order WHERE user_id = ? AND order_id = ?";
    let statement = StatementContext::Select(SelectStatement {
        tables: vec![TableSegment::new("t_order", 14)],
        projections: projections(7, vec![Projection::Shorthand { owner: None }]),
        where_segment: Some(WhereSegment::and(vec![
            ColumnPredicate::equal("user_id", ValueExpr::Parameter(0)),
            ColumnPredicate::equal("order_id", ValueExpr::Parameter(1)),
        ])),
        ..Default::default()
    });
    let ctx = kernel
        .prepare(sql, &[Value::Int(0), Value::Int(4)], &statement, &HintContext::new())
        .unwrap();
    assert_eq!(ctx.execution_units.len(), 1);

    let row = vec![Value::Int(4), Value::Int(0), Value::from("paid")];
    let cursor = MemoryQueryResult::from_rows(&["order_id", "user_id", "status"], vec![row.clone()]);
    let mut merged = kernel.merge(&ctx, vec![Box::new(cursor)]).unwrap();
    assert_eq!(merged.column_count(), 3);
    assert_eq!(merged.column_label(3).unwrap(), "status");
    assert!(merged.next().unwrap());
    let merged_row: Vec<Value> = (1..=3).map(|i| merged.value(i).unwrap()).collect();
    assert_eq!(merged_row, row);
    assert!(!merged.next().unwrap());
}

#[test]
fn hint_values_override_predicates() {
    let kernel = kernel();
    let sql = "SELECT * FROM t_order WHERE user_id = ? AND order_id = ?";
    let statement = StatementContext::Select(SelectStatement {
        tables: vec![TableSegment::new("t_order", 14)],
        projections: projections(7, vec![Projection::Shorthand { owner: None }]),
        where_segment: Some(WhereSegment::and(vec![
            ColumnPredicate::equal("user_id", ValueExpr::Parameter(0)),
            ColumnPredicate::equal("order_id", ValueExpr::Parameter(1)),
        ])),
        ..Default::default()
    });
    let params = [Value::Int(0), Value::Int(0)];

    let plain = kernel.prepare(sql, &params, &statement, &HintContext::new()).unwrap();
    assert_eq!(plain.execution_units[0].data_source, "ds_0");

    let hint = HintContext::new().with_column_value("t_order", "user_id", 1);
    let hinted = kernel.prepare(sql, &params, &statement, &hint).unwrap();
    assert_eq!(hinted.execution_units.len(), 1);
    assert_eq!(hinted.execution_units[0].data_source, "ds_1");
    assert_eq!(
        hinted.execution_units[0].sql_unit.sql,
        "SELECT * FROM t_order_0 WHERE user_id = ? AND order_id = ?"
    );
}

#[test]
fn multi_row_insert_splits_by_generated_key() {
    let kernel = kernel();
    let sql = "INSERT INTO t_order (user_id, status) VALUES (?, ?), (?, ?)";
    let statement = StatementContext::Insert(InsertStatement {
        table: TableSegment::new("t_order", 12),
        columns: vec!["user_id".into(), "status".into()],
        columns_stop_index: Some(36),
        values_start_index: 45,
        values_stop_index: 58,
        rows: vec![
            InsertValueRow::new(vec![ValueExpr::Parameter(0), ValueExpr::Parameter(1)]),
            InsertValueRow::new(vec![ValueExpr::Parameter(2), ValueExpr::Parameter(3)]),
        ],
        generated_key: None,
    });
    let params = [Value::Int(0), Value::from("a"), Value::Int(1), Value::from("b")];
    let ctx = kernel.prepare(sql, &params, &statement, &HintContext::new()).unwrap();
    assert_parses(&ctx);
    assert_eq!(ctx.execution_units.len(), 2);

    let unit = |ds: &str| ctx.execution_units.iter().find(|u| u.data_source == ds).unwrap();
    let first = unit("ds_0");
    assert_eq!(
        first.sql_unit.sql,
        "INSERT INTO t_order_1 (user_id, status, order_id) VALUES (?, ?, ?)"
    );
    assert_eq!(first.sql_unit.parameters, vec![Value::Int(0), Value::from("a"), Value::Int(1)]);
    let second = unit("ds_1");
    assert_eq!(
        second.sql_unit.sql,
        "INSERT INTO t_order_0 (user_id, status, order_id) VALUES (?, ?, ?)"
    );
    assert_eq!(second.sql_unit.parameters, vec![Value::Int(1), Value::from("b"), Value::Int(2)]);
}

#[test]
fn average_is_rebuilt_from_derived_columns() {
    let kernel = kernel();
    let sql = "SELECT user_id, AVG(price) FROM t_order GROUP BY user_id";
    let statement = StatementContext::Select(SelectStatement {
        tables: vec![TableSegment::new("t_order", 32)],
        projections: projections(
            25,
            vec![
                Projection::column("user_id"),
                Projection::aggregation(AggregationType::Avg, "price"),
            ],
        ),
        group_by: Some(GroupByContext {
            items: vec![OrderByItem::asc(OrderExpr::column("user_id"))],
            stop_index: 55,
        }),
        ..Default::default()
    });
    let ctx = kernel.prepare(sql, &[], &statement, &HintContext::new()).unwrap();
    assert_parses(&ctx);
    assert!(ctx.execution_units[0]
        .sql_unit
        .sql
        .contains("COUNT(price) AS AVG_DERIVED_COUNT_0, SUM(price) AS AVG_DERIVED_SUM_0"));

    let shard = |rows: Vec<[i64; 4]>| -> Box<dyn QueryResult> {
        Box::new(MemoryQueryResult::from_rows(
            &["user_id", "AVG(price)", "AVG_DERIVED_COUNT_0", "AVG_DERIVED_SUM_0"],
            rows.into_iter().map(|r| r.iter().map(|v| Value::Int(*v)).collect()).collect(),
        ))
    };
    let cursors = vec![
        shard(vec![[1, 10, 1, 10], [2, 20, 2, 40]]),
        shard(vec![[1, 30, 1, 30]]),
        shard(vec![[2, 5, 2, 10]]),
        shard(Vec::new()),
    ];
    let mut merged = kernel.merge(&ctx, cursors).unwrap();
    assert_eq!(merged.column_count(), 2);

    let mut rows = Vec::new();
    while merged.next().unwrap() {
        rows.push((
            merged.get(1, ValueType::Int).unwrap(),
            merged.get(2, ValueType::Float).unwrap(),
        ));
    }
    assert_eq!(
        rows,
        vec![
            (Value::Int(1), Value::Float(20.0)),
            (Value::Int(2), Value::Float(12.5)),
        ]
    );
}

#[test]
fn mismatched_group_and_order_requests_every_shard_row() {
    let kernel = kernel();
    let sql = "SELECT user_id, COUNT(*) FROM t_order GROUP BY user_id ORDER BY COUNT(*) DESC LIMIT 10";
    let statement = StatementContext::Select(SelectStatement {
        tables: vec![TableSegment::new("t_order", 30)],
        projections: projections(
            23,
            vec![
                Projection::column("user_id"),
                Projection::aggregation(AggregationType::Count, "*"),
            ],
        ),
        group_by: Some(GroupByContext {
            items: vec![OrderByItem::asc(OrderExpr::column("user_id"))],
            stop_index: 53,
        }),
        order_by: Some(vec![OrderByItem::desc(OrderExpr::Expression("COUNT(*)".into()))]),
        pagination: Some(PaginationContext {
            offset: None,
            row_count: Some(PaginationSegment::literal(10, 84)),
        }),
        ..Default::default()
    });
    let ctx = kernel.prepare(sql, &[], &statement, &HintContext::new()).unwrap();
    assert_parses(&ctx);
    for unit in &ctx.execution_units {
        assert!(unit.sql_unit.sql.ends_with(&format!("LIMIT {}", i64::MAX)));
    }
}

#[test]
fn preparation_is_deterministic() {
    let kernel = kernel();
    let first = kernel
        .prepare(ORDERED_SQL, &[], &ordered_select(), &HintContext::new())
        .unwrap();
    let second = kernel
        .prepare(ORDERED_SQL, &[], &ordered_select(), &HintContext::new())
        .unwrap();
    assert_eq!(first.execution_units, second.execution_units);
    assert_eq!(first.route_context, second.route_context);
}

/// Cursor that reports closure through a shared flag.
struct TrackedCursor {
    inner: MemoryQueryResult,
    closed: Arc<AtomicBool>,
}

impl QueryResult for TrackedCursor {
    fn next(&mut self) -> ShardingResult<bool> {
        self.inner.next()
    }

    fn value(&self, column_index: usize) -> ShardingResult<Value> {
        self.inner.value(column_index)
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    fn column_label(&self, column_index: usize) -> ShardingResult<&str> {
        self.inner.column_label(column_index)
    }

    fn close(&mut self) {
        self.inner.close();
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn tracked_rows(labels: &[&str], rows: Vec<Vec<Value>>) -> (Box<dyn QueryResult>, Arc<AtomicBool>) {
    let closed = Arc::new(AtomicBool::new(false));
    let cursor = TrackedCursor {
        inner: MemoryQueryResult::from_rows(labels, rows),
        closed: Arc::clone(&closed),
    };
    (Box::new(cursor), closed)
}

fn tracked(rows: &[i64]) -> (Box<dyn QueryResult>, Arc<AtomicBool>) {
    tracked_rows(&["order_id"], rows.iter().map(|v| vec![Value::Int(*v)]).collect())
}

fn assert_all_closed(flags: &[Arc<AtomicBool>]) {
    let states: Vec<bool> = flags.iter().map(|f| f.load(Ordering::SeqCst)).collect();
    assert!(states.iter().all(|c| *c), "cursor close states: {states:?}");
}

#[test]
fn cancellation_and_drop_close_every_cursor() {
    let kernel = kernel();
    let ctx = kernel
        .prepare(ORDERED_SQL, &[], &ordered_select(), &HintContext::new())
        .unwrap();

    let (cursors, flags): (Vec<_>, Vec<_>) =
        vec![tracked(&[1, 5]), tracked(&[2, 6]), tracked(&[3]), tracked(&[4])].into_iter().unzip();
    let mut merged = kernel.merge(&ctx, cursors).unwrap();
    assert!(merged.next().unwrap());
    assert!(flags.iter().any(|f| !f.load(Ordering::SeqCst)));
    merged.cancel();
    assert!(flags.iter().all(|f| f.load(Ordering::SeqCst)));
    assert!(!merged.next().unwrap());
    assert!(merged.value(1).is_err());

    let (cursors, flags): (Vec<_>, Vec<_>) = vec![tracked(&[1, 5]), tracked(&[2, 6])].into_iter().unzip();
    let mut merged = kernel.merge(&ctx, cursors).unwrap();
    assert!(merged.next().unwrap());
    drop(merged);
    assert!(flags.iter().all(|f| f.load(Ordering::SeqCst)));
}

#[test]
fn ordered_merge_failure_closes_every_cursor() {
    let kernel = kernel();
    let ctx = kernel
        .prepare(ORDERED_SQL, &[], &ordered_select(), &HintContext::new())
        .unwrap();

    let (cursors, flags): (Vec<_>, Vec<_>) = vec![
        tracked(&[1]),
        tracked_rows(&["order_id"], vec![vec![Value::from("x")]]),
        tracked(&[2]),
        tracked(&[3]),
    ]
    .into_iter()
    .unzip();
    let mut merged = kernel.merge(&ctx, cursors).unwrap();
    let err = merged.next().unwrap_err();
    assert!(err.to_string().contains("order_id"));
    assert_all_closed(&flags);
    assert!(merged.value(1).is_err());
}

#[test]
fn streamed_group_merge_failure_closes_every_cursor() {
    let kernel = kernel();
    let sql = "SELECT order_id, COUNT(*) FROM t_order GROUP BY order_id";
    let statement = StatementContext::Select(SelectStatement {
        tables: vec![TableSegment::new("t_order", 31)],
        projections: projections(
            24,
            vec![
                Projection::column("order_id"),
                Projection::aggregation(AggregationType::Count, "*"),
            ],
        ),
        group_by: Some(GroupByContext {
            items: vec![OrderByItem::asc(OrderExpr::column("order_id"))],
            stop_index: 55,
        }),
        ..Default::default()
    });
    let ctx = kernel.prepare(sql, &[], &statement, &HintContext::new()).unwrap();
    assert_parses(&ctx);

    let row = |id: Value| vec![id, Value::Int(1)];
    let labels = ["order_id", "COUNT(*)"];
    let (cursors, flags): (Vec<_>, Vec<_>) = vec![
        tracked_rows(&labels, vec![row(Value::Int(1))]),
        tracked_rows(&labels, vec![row(Value::from("x"))]),
        tracked_rows(&labels, vec![row(Value::Int(2))]),
    ]
    .into_iter()
    .unzip();
    let mut merged = kernel.merge(&ctx, cursors).unwrap();
    assert!(merged.next().is_err());
    assert_all_closed(&flags);
    drop(merged);
    assert_all_closed(&flags);
}

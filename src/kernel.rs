// SPDX-License-Identifier: Apache-2.0

//! Sharding Kernel
//!
//! Runs one logical statement through key generation, routing and rewriting,
//! and merges the shard cursors that come back.

use shardline_core::{QueryResult, ShardingResult, Value};
use tracing::{debug, info, instrument};

use crate::merge::{MergeContext, MergeEngine, ShardingMergedResult};
use crate::observability::{SensitiveParameters, SQL_LOG_TARGET};
use crate::rewrite::{ExecutionUnit, SqlRewriteEngine};
use crate::route::{HintContext, RouteContext, ShardingRouter};
use crate::rule::ShardingRule;
use crate::statement::{GeneratedKeyContext, StatementContext};

/// Everything needed to execute a prepared statement and merge its results.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub route_context: RouteContext,
    pub execution_units: Vec<ExecutionUnit>,
    /// The statement as routed, generated keys included
    pub statement: StatementContext,
    parameters: Vec<Value>,
}

impl ExecutionContext {
    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }
}

#[derive(Debug)]
pub struct ShardingKernel {
    rule: ShardingRule,
}

impl ShardingKernel {
    pub fn new(rule: ShardingRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &ShardingRule {
        &self.rule
    }

    #[instrument(skip_all, fields(kind = ?statement.kind(), params = params.len()))]
    pub fn prepare(
        &self,
        sql: &str,
        params: &[Value],
        statement: &StatementContext,
        hint: &HintContext,
    ) -> ShardingResult<ExecutionContext> {
        let statement = self.generate_keys(statement)?;
        let route_context = ShardingRouter::new(&self.rule).route(&statement, params, hint)?;
        let execution_units = SqlRewriteEngine::new(&self.rule).rewrite(sql, params, &statement, &route_context)?;

        let props = self.rule.props();
        if props.sql_show {
            info!(target: SQL_LOG_TARGET, sql, "Logic SQL");
            for unit in &execution_units {
                info!(
                    target: SQL_LOG_TARGET,
                    data_source = %unit.data_source,
                    sql = %unit.sql_unit.sql,
                    parameters = ?SensitiveParameters::new(&unit.sql_unit.parameters, props.sql_show_parameters),
                    "Actual SQL"
                );
            }
        }

        Ok(ExecutionContext {
            route_context,
            execution_units,
            statement,
            parameters: params.to_vec(),
        })
    }

    /// Merges the cursors returned for `ctx`'s execution units, in unit order.
    #[instrument(skip_all, fields(cursors = cursors.len()))]
    pub fn merge(
        &self,
        ctx: &ExecutionContext,
        cursors: Vec<Box<dyn QueryResult>>,
    ) -> ShardingResult<ShardingMergedResult> {
        let merge_context = match ctx.statement.as_select() {
            Some(select) => MergeContext::from_select(select, &ctx.parameters),
            None => Ok(MergeContext::default()),
        };
        match merge_context {
            Ok(merge_context) => MergeEngine::merge(cursors, &merge_context),
            Err(e) => {
                for mut cursor in cursors {
                    cursor.close();
                }
                Err(e)
            }
        }
    }

    /// Fills keys for an INSERT that omits the table's generated column.
    fn generate_keys(&self, statement: &StatementContext) -> ShardingResult<StatementContext> {
        let mut statement = statement.clone();
        let StatementContext::Insert(insert) = &mut statement else {
            return Ok(statement);
        };
        if insert.generated_key.is_some() {
            return Ok(statement);
        }
        let Some(key_generate) = self
            .rule
            .find_table_rule(&insert.table.name)
            .and_then(|t| t.key_generate())
        else {
            return Ok(statement);
        };
        if insert.column_index(&key_generate.column).is_some() {
            return Ok(statement);
        }
        let values = insert
            .rows
            .iter()
            .map(|_| key_generate.generator.generate_key())
            .collect::<ShardingResult<Vec<_>>>()?;
        debug!(
            column = %key_generate.column,
            generator = key_generate.generator.type_name(),
            rows = values.len(),
            "Generated keys"
        );
        insert.generated_key = Some(GeneratedKeyContext {
            column: key_generate.column.clone(),
            values,
        });
        Ok(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::fixtures::order_rule;
    use crate::statement::{InsertStatement, InsertValueRow, TableSegment, ValueExpr};
    use shardline_core::MemoryQueryResult;

    fn insert_without_key() -> (String, StatementContext) {
        let sql = "INSERT INTO t_order (user_id, status) VALUES (?, ?)".to_string();
        let statement = StatementContext::Insert(InsertStatement {
            table: TableSegment::new("t_order", 12),
            columns: vec!["user_id".into(), "status".into()],
            columns_stop_index: Some(36),
            values_start_index: 45,
            values_stop_index: 50,
            rows: vec![InsertValueRow::new(vec![ValueExpr::Parameter(0), ValueExpr::Parameter(1)])],
            generated_key: None,
        });
        (sql, statement)
    }

    #[test]
    fn prepare_generates_keys_before_routing() {
        let kernel = ShardingKernel::new(order_rule());
        let (sql, statement) = insert_without_key();
        let params = vec![Value::Int(1), Value::from("a")];
        let ctx = kernel.prepare(&sql, &params, &statement, &HintContext::default()).unwrap();
        let generated = ctx.statement.as_insert().unwrap().generated_key.clone().unwrap();
        assert_eq!(generated.column, "order_id");
        assert_eq!(generated.values, vec![Value::Int(100)]);
        assert_eq!(ctx.execution_units.len(), 1);
        let unit = &ctx.execution_units[0];
        assert_eq!(unit.data_source, "ds_1");
        assert_eq!(
            unit.sql_unit.sql,
            "INSERT INTO t_order_0 (user_id, status, order_id) VALUES (?, ?, ?)"
        );
        assert_eq!(
            unit.sql_unit.parameters,
            vec![Value::Int(1), Value::from("a"), Value::Int(100)]
        );
    }

    #[test]
    fn explicit_key_column_is_left_alone() {
        let kernel = ShardingKernel::new(order_rule());
        let statement = StatementContext::Insert(InsertStatement {
            table: TableSegment::new("t_order", 12),
            columns: vec!["order_id".into(), "user_id".into()],
            columns_stop_index: Some(38),
            values_start_index: 47,
            values_stop_index: 52,
            rows: vec![InsertValueRow::new(vec![ValueExpr::Parameter(0), ValueExpr::Parameter(1)])],
            generated_key: None,
        });
        let generated = kernel.generate_keys(&statement).unwrap();
        assert_eq!(generated, statement);
    }

    #[test]
    fn merge_of_non_select_iterates() {
        let kernel = ShardingKernel::new(order_rule());
        let (sql, statement) = insert_without_key();
        let params = vec![Value::Int(1), Value::from("a")];
        let ctx = kernel.prepare(&sql, &params, &statement, &HintContext::default()).unwrap();
        let cursor: Box<dyn QueryResult> =
            Box::new(MemoryQueryResult::from_rows(&["affected"], vec![vec![Value::Int(1)]]));
        let mut merged = kernel.merge(&ctx, vec![cursor]).unwrap();
        assert!(merged.next().unwrap());
        assert_eq!(merged.value(1).unwrap(), Value::Int(1));
    }
}

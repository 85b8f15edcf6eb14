// SPDX-License-Identifier: Apache-2.0

//! Merge Engine
//!
//! Combines the per-shard cursors of one logical query into a single
//! logical cursor. The merge strategy follows the query shape:
//!
//! - one shard: rows pass through unchanged
//! - GROUP BY sorted like ORDER BY: streaming group merge
//! - any other GROUP BY or aggregation: in-memory group merge
//! - ORDER BY: streaming k-way merge
//! - otherwise: shards are drained one after another
//!
//! The client's original OFFSET and row count are re-applied on top.

pub mod aggregation;
pub mod group_by_memory;
pub mod group_by_stream;
pub mod iterator;
pub mod merged;
pub mod order_by;
pub mod order_by_stream;
pub mod pagination;

use serde::{Deserialize, Serialize};
use shardline_core::{QueryResult, ShardingError, ShardingResult, Value};
use tracing::{debug, instrument};

use crate::statement::{
    select::{avg_count_alias, avg_sum_alias},
    AggregationType, ColumnRef, NullsOrder, OrderByItem, Projection, SelectStatement, SortDirection,
};

pub use aggregation::AggregationColumn;
pub use merged::ShardingMergedResult;
pub use order_by::SortColumn;

use group_by_memory::GroupByMemoryMergedResult;
use group_by_stream::GroupByStreamMergedResult;
use iterator::IteratorMergedResult;
use order_by_stream::OrderByStreamMergedResult;
use pagination::LimitDecoratorMergedResult;

/// Row stream produced by one merge strategy. Columns are 1-based.
pub trait MergedResult: Send {
    fn next(&mut self) -> ShardingResult<bool>;

    fn value(&self, column_index: usize) -> ShardingResult<Value>;

    fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBySpec {
    pub column: ColumnRef,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default)]
    pub nulls: Option<NullsOrder>,
}

impl OrderBySpec {
    pub fn asc(column: ColumnRef) -> Self {
        Self {
            column,
            direction: SortDirection::Asc,
            nulls: None,
        }
    }

    pub fn desc(column: ColumnRef) -> Self {
        Self {
            column,
            direction: SortDirection::Desc,
            nulls: None,
        }
    }

    fn effective_nulls(&self) -> NullsOrder {
        self.nulls.unwrap_or(match self.direction {
            SortDirection::Asc => NullsOrder::First,
            SortDirection::Desc => NullsOrder::Last,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub aggregation: AggregationType,
    pub column: ColumnRef,
    #[serde(default)]
    pub avg_count: Option<ColumnRef>,
    #[serde(default)]
    pub avg_sum: Option<ColumnRef>,
}

impl AggregationSpec {
    pub fn new(aggregation: AggregationType, column: ColumnRef) -> Self {
        Self {
            aggregation,
            column,
            avg_count: None,
            avg_sum: None,
        }
    }
}

/// What the merge layer needs to know about the logical query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeContext {
    pub order_by: Vec<OrderBySpec>,
    pub group_by: Vec<OrderBySpec>,
    pub aggregations: Vec<AggregationSpec>,
    pub offset: i64,
    pub row_count: Option<i64>,
    /// Trailing columns added by rewrite and hidden from the client
    pub derived_columns: usize,
}

impl MergeContext {
    pub fn from_select(select: &SelectStatement, params: &[Value]) -> ShardingResult<Self> {
        let sort_spec = |item: &OrderByItem| OrderBySpec {
            column: select.sort_key_column(&item.expr),
            direction: item.direction,
            nulls: item.nulls,
        };

        let mut aggregations = Vec::new();
        let mut avg_ordinal = 0;
        for projection in &select.projections.items {
            if let Projection::Aggregation { aggregation, .. } = projection {
                let mut agg = AggregationSpec::new(*aggregation, select.projection_column(projection));
                if *aggregation == AggregationType::Avg {
                    agg.avg_count = Some(ColumnRef::Label(avg_count_alias(avg_ordinal)));
                    agg.avg_sum = Some(ColumnRef::Label(avg_sum_alias(avg_ordinal)));
                    avg_ordinal += 1;
                }
                aggregations.push(agg);
            }
        }

        let (offset, row_count) = match &select.pagination {
            Some(p) => (p.actual_offset(params)?, p.actual_row_count(params)?),
            None => (0, None),
        };

        Ok(Self {
            order_by: select.effective_order_by().iter().map(sort_spec).collect(),
            group_by: select.group_by_items().iter().map(sort_spec).collect(),
            aggregations,
            offset,
            row_count,
            derived_columns: select.derived_projections().len(),
        })
    }

    fn is_paginated(&self) -> bool {
        self.offset > 0 || self.row_count.is_some()
    }

    fn streams_groups(&self) -> bool {
        !self.group_by.is_empty()
            && self.group_by.len() == self.order_by.len()
            && self
                .group_by
                .iter()
                .zip(&self.order_by)
                .all(|(g, o)| g.column == o.column && g.direction == o.direction)
    }
}

fn resolve_index(first: &dyn QueryResult, column: &ColumnRef) -> ShardingResult<(usize, String)> {
    match column {
        ColumnRef::Index(i) if (1..=first.column_count()).contains(i) => {
            Ok((*i, first.column_label(*i)?.to_string()))
        }
        ColumnRef::Index(i) => Err(ShardingError::merge_column(
            i.to_string(),
            format!("column position {i} is outside the {} result columns", first.column_count()),
        )),
        ColumnRef::Label(label) => first
            .find_column(label)
            .map(|i| (i, label.clone()))
            .ok_or_else(|| ShardingError::merge_column(label.clone(), "column not found in shard results")),
    }
}

fn resolve_sort(first: &dyn QueryResult, specs: &[OrderBySpec]) -> ShardingResult<Vec<SortColumn>> {
    specs
        .iter()
        .map(|s| {
            let (index, label) = resolve_index(first, &s.column)?;
            Ok(SortColumn {
                index,
                label,
                direction: s.direction,
                nulls: s.effective_nulls(),
            })
        })
        .collect()
}

fn resolve_aggregations(
    first: &dyn QueryResult,
    specs: &[AggregationSpec],
) -> ShardingResult<Vec<AggregationColumn>> {
    specs
        .iter()
        .map(|s| {
            let (index, label) = resolve_index(first, &s.column)?;
            let avg_indexes = match (&s.avg_count, &s.avg_sum) {
                (Some(count), Some(sum)) => Some((resolve_index(first, count)?.0, resolve_index(first, sum)?.0)),
                _ => None,
            };
            if s.aggregation == AggregationType::Avg && avg_indexes.is_none() {
                return Err(ShardingError::merge_column(label, "AVG is missing its derived COUNT and SUM columns"));
            }
            Ok(AggregationColumn {
                aggregation: s.aggregation,
                index,
                label,
                avg_indexes,
            })
        })
        .collect()
}

struct Resolved {
    order_by: Vec<SortColumn>,
    group_by: Vec<SortColumn>,
    aggregations: Vec<AggregationColumn>,
}

fn resolve(first: &dyn QueryResult, ctx: &MergeContext) -> ShardingResult<Resolved> {
    Ok(Resolved {
        order_by: resolve_sort(first, &ctx.order_by)?,
        group_by: resolve_sort(first, &ctx.group_by)?,
        aggregations: resolve_aggregations(first, &ctx.aggregations)?,
    })
}

fn column_labels(first: &dyn QueryResult) -> ShardingResult<Vec<String>> {
    (1..=first.column_count())
        .map(|i| first.column_label(i).map(str::to_string))
        .collect()
}

fn close_all(cursors: &mut [Box<dyn QueryResult>]) {
    for cursor in cursors {
        cursor.close();
    }
}

/// Picks and assembles the merge strategy for a set of shard cursors.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine;

impl MergeEngine {
    #[instrument(skip_all, fields(cursors = cursors.len()))]
    pub fn merge(
        mut cursors: Vec<Box<dyn QueryResult>>,
        ctx: &MergeContext,
    ) -> ShardingResult<ShardingMergedResult> {
        let Some(first) = cursors.first() else {
            return Ok(ShardingMergedResult::empty());
        };
        let labels = match column_labels(first.as_ref()) {
            Ok(labels) => labels,
            Err(e) => {
                close_all(&mut cursors);
                return Err(e);
            }
        };
        let total_columns = labels.len();

        if cursors.len() == 1 {
            debug!(strategy = "pass_through", "merging shard results");
            return Ok(ShardingMergedResult::new(
                Box::new(IteratorMergedResult::new(cursors)),
                labels,
                total_columns,
            ));
        }

        let resolved = match resolve(first.as_ref(), ctx) {
            Ok(r) => r,
            Err(e) => {
                close_all(&mut cursors);
                return Err(e);
            }
        };

        let visible = total_columns.saturating_sub(ctx.derived_columns);
        let (strategy, merged): (&str, Box<dyn MergedResult>) =
            if ctx.streams_groups() {
                (
                    "group_by_stream",
                    Box::new(GroupByStreamMergedResult::new(
                        cursors,
                        resolved.group_by,
                        resolved.aggregations,
                        total_columns,
                    )),
                )
            } else if !resolved.group_by.is_empty() || !resolved.aggregations.is_empty() {
                (
                    "group_by_memory",
                    Box::new(GroupByMemoryMergedResult::new(
                        cursors,
                        &resolved.group_by,
                        &resolved.order_by,
                        &resolved.aggregations,
                        total_columns,
                    )?),
                )
            } else if !resolved.order_by.is_empty() {
                (
                    "order_by_stream",
                    Box::new(OrderByStreamMergedResult::new(cursors, resolved.order_by)),
                )
            } else {
                ("iterator", Box::new(IteratorMergedResult::new(cursors)))
            };
        debug!(strategy, visible, paginated = ctx.is_paginated(), "merging shard results");

        let merged: Box<dyn MergedResult> = if ctx.is_paginated() {
            Box::new(LimitDecoratorMergedResult::new(merged, ctx.offset, ctx.row_count))
        } else {
            merged
        };
        Ok(ShardingMergedResult::new(merged, labels, visible))
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Aggregation reducers for group merges.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use shardline_core::{ShardingError, ShardingResult, Value, ValueFamily};

use crate::statement::AggregationType;

/// An aggregation column resolved against the result columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationColumn {
    pub aggregation: AggregationType,
    pub index: usize,
    pub label: String,
    /// Derived COUNT and SUM columns of an AVG
    pub avg_indexes: Option<(usize, usize)>,
}

/// Running state of one aggregation within one group.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Count(Value),
    Sum(Value),
    Min(Value),
    Max(Value),
    Avg { count: Value, sum: Value },
}

impl Accumulator {
    pub fn new(aggregation: AggregationType) -> Self {
        match aggregation {
            AggregationType::Count => Self::Count(Value::Int(0)),
            AggregationType::Sum => Self::Sum(Value::Null),
            AggregationType::Min => Self::Min(Value::Null),
            AggregationType::Max => Self::Max(Value::Null),
            AggregationType::Avg => Self::Avg {
                count: Value::Null,
                sum: Value::Null,
            },
        }
    }

    /// Folds in one shard row's partial aggregates.
    pub fn merge(&mut self, column: &AggregationColumn, row: impl Fn(usize) -> ShardingResult<Value>) -> ShardingResult<()> {
        let label = column.label.as_str();
        match self {
            Self::Count(total) | Self::Sum(total) => {
                let value = row(column.index)?;
                *total = add(label, total, &value)?;
            }
            Self::Min(current) => keep(label, current, row(column.index)?, Ordering::Less)?,
            Self::Max(current) => keep(label, current, row(column.index)?, Ordering::Greater)?,
            Self::Avg { count, sum } => {
                let (count_index, sum_index) = column.avg_indexes.ok_or_else(|| {
                    ShardingError::merge_column(label, "AVG is missing its derived COUNT and SUM columns")
                })?;
                *count = add(label, count, &row(count_index)?)?;
                *sum = add(label, sum, &row(sum_index)?)?;
            }
        }
        Ok(())
    }

    /// Final value of the aggregation.
    pub fn result(&self, label: &str) -> ShardingResult<Value> {
        match self {
            Self::Count(v) | Self::Sum(v) | Self::Min(v) | Self::Max(v) => Ok(v.clone()),
            Self::Avg { count, sum } => average(label, count, sum),
        }
    }
}

fn incompatible(label: &str, value: &Value) -> ShardingError {
    ShardingError::merge_column(label, format!("cannot aggregate non-numeric value '{value}'"))
}

/// Numeric addition that treats NULL as absent. Integers widen to decimals
/// on overflow; floats stay floats.
fn add(label: &str, left: &Value, right: &Value) -> ShardingResult<Value> {
    match (left, right) {
        (l, Value::Null) => Ok(l.clone()),
        (Value::Null, r) if r.family() == ValueFamily::Numeric => Ok(r.clone()),
        (Value::Int(a), Value::Int(b)) => Ok(a
            .checked_add(*b)
            .map(Value::Int)
            .unwrap_or_else(|| Value::Decimal(Decimal::from(*a) + Decimal::from(*b)))),
        (l, r) if l.family() == ValueFamily::Numeric && r.family() == ValueFamily::Numeric => {
            if matches!(l, Value::Float(_)) || matches!(r, Value::Float(_)) {
                let sum = l.to_f64().unwrap_or_default() + r.to_f64().unwrap_or_default();
                return Ok(Value::Float(sum));
            }
            match (l.to_decimal(), r.to_decimal()) {
                (Some(a), Some(b)) => a
                    .checked_add(b)
                    .map(Value::Decimal)
                    .ok_or_else(|| ShardingError::merge_column(label, "aggregate overflow")),
                _ => Err(incompatible(label, r)),
            }
        }
        (l, _) if l.family() != ValueFamily::Numeric && !l.is_null() => Err(incompatible(label, l)),
        (_, r) => Err(incompatible(label, r)),
    }
}

fn keep(label: &str, current: &mut Value, candidate: Value, wanted: Ordering) -> ShardingResult<()> {
    if candidate.is_null() {
        return Ok(());
    }
    if current.is_null() {
        *current = candidate;
        return Ok(());
    }
    match candidate.compare(current) {
        Some(ordering) if ordering == wanted => *current = candidate,
        Some(_) => {}
        None => {
            return Err(ShardingError::merge_column(
                label,
                format!("cannot compare '{candidate}' with '{current}'"),
            ))
        }
    }
    Ok(())
}

fn average(label: &str, count: &Value, sum: &Value) -> ShardingResult<Value> {
    if count.is_null() || sum.is_null() {
        return Ok(Value::Null);
    }
    if let Value::Float(total) = sum {
        let n = count.to_f64().ok_or_else(|| incompatible(label, count))?;
        return Ok(if n == 0.0 { Value::Null } else { Value::Float(total / n) });
    }
    let n = count.to_decimal().ok_or_else(|| incompatible(label, count))?;
    let total = sum.to_decimal().ok_or_else(|| incompatible(label, sum))?;
    if n.is_zero() {
        return Ok(Value::Null);
    }
    total
        .checked_div(n)
        .map(|avg| Value::Decimal(avg.normalize()))
        .ok_or_else(|| ShardingError::merge_column(label, "AVG division overflow"))
}

// SPDX-License-Identifier: Apache-2.0

//! Streaming group merge for shard results already sorted by the group key.

use shardline_core::{QueryResult, ShardingError, ShardingResult, Value, ValueKey};

use super::aggregation::{Accumulator, AggregationColumn};
use super::order_by::SortColumn;
use super::order_by_stream::{OrderByStreamMergedResult, StreamState};
use super::MergedResult;

pub struct GroupByStreamMergedResult {
    stream: OrderByStreamMergedResult,
    group_by: Vec<SortColumn>,
    aggregations: Vec<AggregationColumn>,
    column_count: usize,
    /// Whether the inner stream sits on a row not yet folded into a group
    has_pending: bool,
    current: Option<Vec<Value>>,
}

impl GroupByStreamMergedResult {
    pub fn new(
        cursors: Vec<Box<dyn QueryResult>>,
        group_by: Vec<SortColumn>,
        aggregations: Vec<AggregationColumn>,
        column_count: usize,
    ) -> Self {
        Self {
            stream: OrderByStreamMergedResult::new(cursors, group_by.clone()),
            group_by,
            aggregations,
            column_count,
            has_pending: false,
            current: None,
        }
    }

    fn group_key(&self) -> ShardingResult<Vec<ValueKey>> {
        self.group_by
            .iter()
            .map(|c| self.stream.value(c.index).map(|v| v.key()))
            .collect()
    }

    fn snapshot(&self) -> ShardingResult<Vec<Value>> {
        (1..=self.column_count).map(|i| self.stream.value(i)).collect()
    }
}

impl MergedResult for GroupByStreamMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        if self.stream.state() == StreamState::Initializing {
            self.has_pending = self.stream.next()?;
        }
        if !self.has_pending {
            self.current = None;
            return Ok(false);
        }

        let key = self.group_key()?;
        let mut row = self.snapshot()?;
        let mut accumulators: Vec<Accumulator> = self
            .aggregations
            .iter()
            .map(|a| Accumulator::new(a.aggregation))
            .collect();
        loop {
            for (acc, column) in accumulators.iter_mut().zip(&self.aggregations) {
                acc.merge(column, |i| self.stream.value(i))?;
            }
            self.has_pending = self.stream.next()?;
            if !self.has_pending || self.group_key()? != key {
                break;
            }
        }

        for (acc, column) in accumulators.iter().zip(&self.aggregations) {
            if let Some(slot) = column.index.checked_sub(1).and_then(|i| row.get_mut(i)) {
                *slot = acc.result(&column.label)?;
            }
        }
        self.current = Some(row);
        Ok(true)
    }

    fn value(&self, column_index: usize) -> ShardingResult<Value> {
        self.current
            .as_ref()
            .and_then(|row| row.get(column_index.checked_sub(1)?))
            .cloned()
            .ok_or_else(|| ShardingError::merge(format!("no value at column {column_index}")))
    }

    fn close(&mut self) {
        self.stream.close();
        self.current = None;
        self.has_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{AggregationType, NullsOrder, SortDirection};
    use shardline_core::MemoryQueryResult;

    fn shard(rows: &[(&str, i64)]) -> Box<dyn QueryResult> {
        Box::new(MemoryQueryResult::from_rows(
            &["status", "cnt"],
            rows.iter()
                .map(|(s, c)| vec![Value::from(*s), Value::Int(*c)])
                .collect(),
        ))
    }

    #[test]
    fn folds_adjacent_groups_across_shards() {
        let group_by = vec![SortColumn {
            index: 1,
            label: "status".into(),
            direction: SortDirection::Asc,
            nulls: NullsOrder::First,
        }];
        let aggregations = vec![AggregationColumn {
            aggregation: AggregationType::Count,
            index: 2,
            label: "cnt".into(),
            avg_indexes: None,
        }];
        let mut merged = GroupByStreamMergedResult::new(
            vec![shard(&[("a", 1), ("c", 2)]), shard(&[("a", 3), ("b", 4)])],
            group_by,
            aggregations,
            2,
        );
        let mut out = Vec::new();
        while merged.next().unwrap() {
            out.push((merged.value(1).unwrap(), merged.value(2).unwrap()));
        }
        assert_eq!(
            out,
            vec![
                (Value::from("a"), Value::Int(4)),
                (Value::from("b"), Value::Int(4)),
                (Value::from("c"), Value::Int(2)),
            ]
        );
        assert!(merged.value(1).is_err());
    }
}

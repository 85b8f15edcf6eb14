// SPDX-License-Identifier: Apache-2.0

//! In-memory group merge
//!
//! Used when shard rows are not sorted by the group key: every shard row is
//! read, folded per group in first-seen order, then sorted by the requested
//! ORDER BY (or the GROUP BY keys when none is given).

use std::collections::HashMap;

use shardline_core::{QueryResult, ShardingError, ShardingResult, Value, ValueKey};
use tracing::trace;

use super::aggregation::{Accumulator, AggregationColumn};
use super::order_by::{compare_keys, FamilyGuard, SortColumn};
use super::MergedResult;

struct Group {
    row: Vec<Value>,
    accumulators: Vec<Accumulator>,
}

pub struct GroupByMemoryMergedResult {
    rows: std::vec::IntoIter<Vec<Value>>,
    current: Option<Vec<Value>>,
}

impl GroupByMemoryMergedResult {
    pub fn new(
        mut cursors: Vec<Box<dyn QueryResult>>,
        group_by: &[SortColumn],
        order_by: &[SortColumn],
        aggregations: &[AggregationColumn],
        column_count: usize,
    ) -> ShardingResult<Self> {
        let collected = collect_groups(&mut cursors, group_by, aggregations, column_count);
        for cursor in &mut cursors {
            cursor.close();
        }
        let mut groups = collected?;

        if groups.is_empty() && group_by.is_empty() && !aggregations.is_empty() {
            groups.push(Group {
                row: vec![Value::Null; column_count],
                accumulators: aggregations.iter().map(|a| Accumulator::new(a.aggregation)).collect(),
            });
        }

        let mut rows = Vec::with_capacity(groups.len());
        for group in groups {
            let mut row = group.row;
            for (acc, column) in group.accumulators.iter().zip(aggregations) {
                if let Some(slot) = column.index.checked_sub(1).and_then(|i| row.get_mut(i)) {
                    *slot = acc.result(&column.label)?;
                }
            }
            rows.push(row);
        }

        let sort = if order_by.is_empty() { group_by } else { order_by };
        if !sort.is_empty() {
            let keyed = rows
                .into_iter()
                .map(|row| {
                    let keys = sort_keys(sort, &row)?;
                    Ok((keys, row))
                })
                .collect::<ShardingResult<Vec<_>>>()?;
            let mut guard = FamilyGuard::new(sort.len());
            for (keys, _) in &keyed {
                guard.check(sort, keys)?;
            }
            let mut keyed = keyed;
            keyed.sort_by(|(a, _), (b, _)| compare_keys(sort, a, b));
            rows = keyed.into_iter().map(|(_, row)| row).collect();
        }
        trace!(groups = rows.len(), "grouped shard rows in memory");

        Ok(Self {
            rows: rows.into_iter(),
            current: None,
        })
    }
}

fn sort_keys(columns: &[SortColumn], row: &[Value]) -> ShardingResult<Vec<Value>> {
    columns
        .iter()
        .map(|c| {
            c.index
                .checked_sub(1)
                .and_then(|i| row.get(i))
                .cloned()
                .ok_or_else(|| ShardingError::merge_column(c.label.clone(), "sort column is out of range"))
        })
        .collect()
}

fn collect_groups(
    cursors: &mut [Box<dyn QueryResult>],
    group_by: &[SortColumn],
    aggregations: &[AggregationColumn],
    column_count: usize,
) -> ShardingResult<Vec<Group>> {
    let mut positions: HashMap<Vec<ValueKey>, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    let mut guard = FamilyGuard::new(group_by.len());
    for cursor in cursors.iter_mut() {
        while cursor.next()? {
            let keys = group_by
                .iter()
                .map(|c| cursor.value(c.index))
                .collect::<ShardingResult<Vec<_>>>()?;
            guard.check(group_by, &keys)?;
            let key: Vec<ValueKey> = keys.iter().map(Value::key).collect();
            let position = match positions.get(&key) {
                Some(p) => *p,
                None => {
                    let row = (1..=column_count)
                        .map(|i| cursor.value(i))
                        .collect::<ShardingResult<Vec<_>>>()?;
                    groups.push(Group {
                        row,
                        accumulators: aggregations.iter().map(|a| Accumulator::new(a.aggregation)).collect(),
                    });
                    positions.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            };
            let group = &mut groups[position];
            for (acc, column) in group.accumulators.iter_mut().zip(aggregations) {
                acc.merge(column, |i| cursor.value(i))?;
            }
        }
        cursor.close();
    }
    Ok(groups)
}

impl MergedResult for GroupByMemoryMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn value(&self, column_index: usize) -> ShardingResult<Value> {
        self.current
            .as_ref()
            .and_then(|row| row.get(column_index.checked_sub(1)?))
            .cloned()
            .ok_or_else(|| ShardingError::merge(format!("no value at column {column_index}")))
    }

    fn close(&mut self) {
        self.rows = Vec::new().into_iter();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{AggregationType, NullsOrder, SortDirection};
    use shardline_core::MemoryQueryResult;

    fn sort(index: usize, label: &str, direction: SortDirection) -> SortColumn {
        SortColumn {
            index,
            label: label.into(),
            direction,
            nulls: NullsOrder::First,
        }
    }

    fn sum(index: usize, label: &str) -> AggregationColumn {
        AggregationColumn {
            aggregation: AggregationType::Sum,
            index,
            label: label.into(),
            avg_indexes: None,
        }
    }

    fn drain(mut merged: GroupByMemoryMergedResult, width: usize) -> Vec<Vec<Value>> {
        let mut out = Vec::new();
        while merged.next().unwrap() {
            out.push((1..=width).map(|i| merged.value(i).unwrap()).collect());
        }
        out
    }

    #[test]
    fn groups_then_sorts_by_aggregate() {
        let shard = |rows: Vec<(i64, i64)>| -> Box<dyn QueryResult> {
            Box::new(MemoryQueryResult::from_rows(
                &["user_id", "total"],
                rows.into_iter().map(|(u, t)| vec![Value::Int(u), Value::Int(t)]).collect(),
            ))
        };
        let merged = GroupByMemoryMergedResult::new(
            vec![shard(vec![(1, 10), (2, 5)]), shard(vec![(2, 30), (3, 1)])],
            &[sort(1, "user_id", SortDirection::Asc)],
            &[sort(2, "total", SortDirection::Desc)],
            &[sum(2, "total")],
            2,
        )
        .unwrap();
        assert_eq!(
            drain(merged, 2),
            vec![
                vec![Value::Int(2), Value::Int(35)],
                vec![Value::Int(1), Value::Int(10)],
                vec![Value::Int(3), Value::Int(1)],
            ]
        );
    }

    #[test]
    fn aggregation_over_no_rows_yields_one_row() {
        let empty: Box<dyn QueryResult> =
            Box::new(MemoryQueryResult::from_rows(&["cnt", "total"], Vec::new()));
        let count = AggregationColumn {
            aggregation: AggregationType::Count,
            index: 1,
            label: "cnt".into(),
            avg_indexes: None,
        };
        let merged =
            GroupByMemoryMergedResult::new(vec![empty], &[], &[], &[count, sum(2, "total")], 2).unwrap();
        assert_eq!(drain(merged, 2), vec![vec![Value::Int(0), Value::Null]]);
    }

    #[test]
    fn mixed_group_key_families_fail() {
        let a: Box<dyn QueryResult> =
            Box::new(MemoryQueryResult::from_rows(&["k"], vec![vec![Value::Int(1)]]));
        let b: Box<dyn QueryResult> =
            Box::new(MemoryQueryResult::from_rows(&["k"], vec![vec![Value::from("x")]]));
        let err = GroupByMemoryMergedResult::new(vec![a, b], &[sort(1, "k", SortDirection::Asc)], &[], &[], 1)
            .err()
            .unwrap();
        assert!(matches!(err, ShardingError::MergeFailure { column: Some(ref c), .. } if c == "k"));
    }
}

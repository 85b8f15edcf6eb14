// SPDX-License-Identifier: Apache-2.0

//! Sort keys and the cursor-with-current-key wrapper used by ordered merges.

use std::cmp::Ordering;

use shardline_core::{QueryResult, ShardingError, ShardingResult, Value, ValueFamily};

use crate::statement::{NullsOrder, SortDirection};

/// A sort column resolved to a 1-based result index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortColumn {
    pub index: usize,
    pub label: String,
    pub direction: SortDirection,
    pub nulls: NullsOrder,
}

/// Compares two key tuples column by column, stopping at the first
/// difference. NULL placement does not depend on direction.
pub fn compare_keys(columns: &[SortColumn], left: &[Value], right: &[Value]) -> Ordering {
    for (column, (a, b)) in columns.iter().zip(left.iter().zip(right)) {
        let ordering = match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match column.nulls {
                NullsOrder::First => Ordering::Less,
                NullsOrder::Last => Ordering::Greater,
            },
            (false, true) => match column.nulls {
                NullsOrder::First => Ordering::Greater,
                NullsOrder::Last => Ordering::Less,
            },
            (false, false) => {
                let natural = a.compare(b).unwrap_or(Ordering::Equal);
                match column.direction {
                    SortDirection::Asc => natural,
                    SortDirection::Desc => natural.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Remembers the value family seen for each sort column and rejects keys
/// that cannot be compared with it.
#[derive(Debug, Clone, Default)]
pub struct FamilyGuard {
    families: Vec<Option<ValueFamily>>,
}

impl FamilyGuard {
    pub fn new(width: usize) -> Self {
        Self {
            families: vec![None; width],
        }
    }

    pub fn check(&mut self, columns: &[SortColumn], keys: &[Value]) -> ShardingResult<()> {
        for ((column, key), seen) in columns.iter().zip(keys).zip(self.families.iter_mut()) {
            if key.is_null() {
                continue;
            }
            let family = key.family();
            match seen {
                None => *seen = Some(family),
                Some(expected) if *expected == family => {}
                Some(expected) => {
                    return Err(ShardingError::merge_column(
                        column.label.clone(),
                        format!("cannot compare {family:?} value '{key}' with {expected:?} values"),
                    ))
                }
            }
        }
        Ok(())
    }
}

/// One shard cursor and the sort key of its current row.
pub struct OrderByValue {
    cursor: Box<dyn QueryResult>,
    ordinal: usize,
    keys: Vec<Value>,
}

impl std::fmt::Debug for OrderByValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderByValue")
            .field("ordinal", &self.ordinal)
            .field("keys", &self.keys)
            .finish()
    }
}

impl OrderByValue {
    pub fn new(cursor: Box<dyn QueryResult>, ordinal: usize) -> Self {
        Self {
            cursor,
            ordinal,
            keys: Vec::new(),
        }
    }

    /// Advances the cursor and loads the new key. Closes the cursor once
    /// it is exhausted.
    pub fn next(&mut self, columns: &[SortColumn], guard: &mut FamilyGuard) -> ShardingResult<bool> {
        if !self.cursor.next()? {
            self.cursor.close();
            self.keys.clear();
            return Ok(false);
        }
        self.keys = columns
            .iter()
            .map(|c| self.cursor.value(c.index))
            .collect::<ShardingResult<_>>()?;
        guard.check(columns, &self.keys)?;
        Ok(true)
    }

    pub fn cursor(&self) -> &dyn QueryResult {
        self.cursor.as_ref()
    }

    pub fn close(&mut self) {
        self.cursor.close();
    }

    /// Sort order of the current rows; ties go to the lower ordinal.
    pub fn compare(&self, other: &OrderByValue, columns: &[SortColumn]) -> Ordering {
        compare_keys(columns, &self.keys, &other.keys).then(self.ordinal.cmp(&other.ordinal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(direction: SortDirection, nulls: NullsOrder) -> SortColumn {
        SortColumn {
            index: 1,
            label: "k".into(),
            direction,
            nulls,
        }
    }

    #[test]
    fn applies_direction_and_null_placement() {
        let asc = [column(SortDirection::Asc, NullsOrder::First)];
        let desc = [column(SortDirection::Desc, NullsOrder::Last)];
        assert_eq!(compare_keys(&asc, &[Value::Int(1)], &[Value::Int(2)]), Ordering::Less);
        assert_eq!(compare_keys(&desc, &[Value::Int(1)], &[Value::Int(2)]), Ordering::Greater);
        assert_eq!(compare_keys(&asc, &[Value::Null], &[Value::Int(2)]), Ordering::Less);
        assert_eq!(compare_keys(&desc, &[Value::Null], &[Value::Int(2)]), Ordering::Greater);
    }

    #[test]
    fn short_circuits_on_first_difference() {
        let columns = [
            column(SortDirection::Asc, NullsOrder::First),
            SortColumn {
                index: 2,
                ..column(SortDirection::Desc, NullsOrder::Last)
            },
        ];
        let a = [Value::Int(1), Value::Int(1)];
        let b = [Value::Int(1), Value::Int(9)];
        assert_eq!(compare_keys(&columns, &a, &b), Ordering::Greater);
        assert_eq!(
            compare_keys(&columns, &[Value::Int(0), Value::Int(1)], &b),
            Ordering::Less
        );
    }

    #[test]
    fn guard_rejects_mixed_families() {
        let columns = [column(SortDirection::Asc, NullsOrder::First)];
        let mut guard = FamilyGuard::new(1);
        guard.check(&columns, &[Value::Int(1)]).unwrap();
        guard.check(&columns, &[Value::Null]).unwrap();
        guard.check(&columns, &[Value::Float(2.5)]).unwrap();
        let err = guard.check(&columns, &[Value::from("x")]).unwrap_err();
        assert!(matches!(err, ShardingError::MergeFailure { column: Some(ref c), .. } if c == "k"));
    }
}

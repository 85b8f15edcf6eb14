// SPDX-License-Identifier: Apache-2.0

//! Forward-only result cursors
//!
//! Every physical query result handed to the merge layer implements
//! [`QueryResult`]. Columns are addressed by 1-based index.

use crate::error::{ShardingError, ShardingResult};
use crate::value::Value;

/// A forward-only cursor over the rows of one physical query.
pub trait QueryResult: Send {
    /// Advances to the next row. Returns `false` once the cursor is exhausted
    /// or closed.
    fn next(&mut self) -> ShardingResult<bool>;

    /// Value of the 1-based column on the current row.
    fn value(&self, column_index: usize) -> ShardingResult<Value>;

    fn column_count(&self) -> usize;

    /// Label (alias or column name) of the 1-based column.
    fn column_label(&self, column_index: usize) -> ShardingResult<&str>;

    /// Releases the cursor. Idempotent.
    fn close(&mut self);

    fn is_closed(&self) -> bool;

    /// Resolves a label to its 1-based index, case-insensitively.
    fn find_column(&self, label: &str) -> Option<usize> {
        (1..=self.column_count()).find(|&i| {
            self.column_label(i)
                .map(|l| l.eq_ignore_ascii_case(label))
                .unwrap_or(false)
        })
    }
}

/// In-memory cursor over pre-fetched rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueryResult {
    labels: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
    closed: bool,
}

impl MemoryQueryResult {
    pub fn new(labels: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            labels,
            rows,
            position: None,
            closed: false,
        }
    }

    /// Convenience constructor from string labels.
    pub fn from_rows(labels: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self::new(labels.iter().map(|l| l.to_string()).collect(), rows)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn current_row(&self) -> ShardingResult<&Vec<Value>> {
        if self.closed {
            return Err(ShardingError::cursor("cursor is closed"));
        }
        self.position
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| ShardingError::cursor("cursor is not positioned on a row"))
    }
}

impl QueryResult for MemoryQueryResult {
    fn next(&mut self) -> ShardingResult<bool> {
        if self.closed {
            return Ok(false);
        }
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.rows.len() {
            self.position = Some(next);
            Ok(true)
        } else {
            self.position = Some(self.rows.len());
            Ok(false)
        }
    }

    fn value(&self, column_index: usize) -> ShardingResult<Value> {
        let row = self.current_row()?;
        column_index
            .checked_sub(1)
            .and_then(|i| row.get(i))
            .cloned()
            .ok_or_else(|| {
                ShardingError::cursor(format!("column index {column_index} out of range"))
            })
    }

    fn column_count(&self) -> usize {
        self.labels.len()
    }

    fn column_label(&self, column_index: usize) -> ShardingResult<&str> {
        column_index
            .checked_sub(1)
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
            .ok_or_else(|| {
                ShardingError::cursor(format!("column index {column_index} out of range"))
            })
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryQueryResult {
        MemoryQueryResult::from_rows(
            &["id", "name"],
            vec![
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(2), Value::from("b")],
            ],
        )
    }

    #[test]
    fn iterates_rows_in_order() {
        let mut rs = sample();
        assert!(rs.next().unwrap());
        assert_eq!(rs.value(1).unwrap(), Value::Int(1));
        assert!(rs.next().unwrap());
        assert_eq!(rs.value(2).unwrap(), Value::from("b"));
        assert!(!rs.next().unwrap());
        assert!(!rs.next().unwrap());
    }

    #[test]
    fn value_before_next_is_an_error() {
        let rs = sample();
        assert!(rs.value(1).is_err());
    }

    #[test]
    fn closed_cursor_reports_exhausted() {
        let mut rs = sample();
        rs.close();
        rs.close();
        assert!(rs.is_closed());
        assert!(!rs.next().unwrap());
    }

    #[test]
    fn finds_columns_by_label() {
        let rs = sample();
        assert_eq!(rs.find_column("NAME"), Some(2));
        assert_eq!(rs.find_column("missing"), None);
        assert!(rs.column_label(0).is_err());
    }
}

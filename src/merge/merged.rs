// SPDX-License-Identifier: Apache-2.0

//! The logical cursor handed back to the client.

use shardline_core::{QueryResult, ShardingError, ShardingResult, Value, ValueType};
use tracing::debug;

use super::MergedResult;

/// Merged rows behind the same cursor contract as a single shard result.
///
/// Derived columns appended during rewrite are hidden from
/// [`column_count`](QueryResult::column_count). Dropping the result closes
/// every underlying shard cursor.
pub struct ShardingMergedResult {
    inner: Box<dyn MergedResult>,
    labels: Vec<String>,
    column_count: usize,
    positioned: bool,
    closed: bool,
}

impl ShardingMergedResult {
    pub(crate) fn new(inner: Box<dyn MergedResult>, labels: Vec<String>, column_count: usize) -> Self {
        Self {
            inner,
            labels,
            column_count,
            positioned: false,
            closed: false,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Box::new(EmptyMergedResult), Vec::new(), 0)
    }

    /// Value of the 1-based column converted to `value_type`.
    pub fn get(&self, column_index: usize, value_type: ValueType) -> ShardingResult<Value> {
        QueryResult::value(self, column_index)?.cast(value_type)
    }

    /// Abandons the stream and releases all shard cursors.
    pub fn cancel(&mut self) {
        debug!("merged result cancelled");
        QueryResult::close(self);
    }
}

impl QueryResult for ShardingMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        if self.closed {
            return Ok(false);
        }
        match self.inner.next() {
            Ok(true) => {
                self.positioned = true;
                Ok(true)
            }
            Ok(false) => {
                self.positioned = false;
                self.close();
                Ok(false)
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn value(&self, column_index: usize) -> ShardingResult<Value> {
        if self.closed {
            return Err(ShardingError::cursor("merged result is closed"));
        }
        if !self.positioned {
            return Err(ShardingError::cursor("merged result is not positioned on a row"));
        }
        if column_index == 0 || column_index > self.column_count {
            return Err(ShardingError::cursor(format!("column index {column_index} out of range")));
        }
        self.inner.value(column_index)
    }

    fn column_count(&self) -> usize {
        self.column_count
    }

    fn column_label(&self, column_index: usize) -> ShardingResult<&str> {
        if column_index == 0 || column_index > self.column_count {
            return Err(ShardingError::cursor(format!("column index {column_index} out of range")));
        }
        self.labels
            .get(column_index - 1)
            .map(String::as_str)
            .ok_or_else(|| ShardingError::cursor(format!("column index {column_index} out of range")))
    }

    fn close(&mut self) {
        if !self.closed {
            self.inner.close();
            self.closed = true;
            self.positioned = false;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ShardingMergedResult {
    fn drop(&mut self) {
        QueryResult::close(self);
    }
}

struct EmptyMergedResult;

impl MergedResult for EmptyMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        Ok(false)
    }

    fn value(&self, _column_index: usize) -> ShardingResult<Value> {
        Err(ShardingError::merge("empty result has no rows"))
    }

    fn close(&mut self) {}
}

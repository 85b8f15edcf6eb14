// SPDX-License-Identifier: Apache-2.0

//! Sequential iteration over shard cursors, one after another.

use shardline_core::{QueryResult, ShardingError, ShardingResult, Value};

use super::MergedResult;

pub struct IteratorMergedResult {
    cursors: Vec<Box<dyn QueryResult>>,
    current: usize,
}

impl IteratorMergedResult {
    pub fn new(cursors: Vec<Box<dyn QueryResult>>) -> Self {
        Self { cursors, current: 0 }
    }
}

impl MergedResult for IteratorMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        while let Some(cursor) = self.cursors.get_mut(self.current) {
            if cursor.next()? {
                return Ok(true);
            }
            cursor.close();
            self.current += 1;
        }
        Ok(false)
    }

    fn value(&self, column_index: usize) -> ShardingResult<Value> {
        self.cursors
            .get(self.current)
            .ok_or_else(|| ShardingError::merge("merged result has no current row"))?
            .value(column_index)
    }

    fn close(&mut self) {
        for cursor in &mut self.cursors {
            cursor.close();
        }
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Applies the client's original OFFSET and row count to a merged stream.

use shardline_core::{ShardingResult, Value};

use super::MergedResult;

pub struct LimitDecoratorMergedResult {
    inner: Box<dyn MergedResult>,
    offset: i64,
    row_count: Option<i64>,
    skipped: bool,
    emitted: i64,
}

impl LimitDecoratorMergedResult {
    pub fn new(inner: Box<dyn MergedResult>, offset: i64, row_count: Option<i64>) -> Self {
        Self {
            inner,
            offset: offset.max(0),
            row_count,
            skipped: false,
            emitted: 0,
        }
    }

    fn skip_offset(&mut self) -> ShardingResult<bool> {
        self.skipped = true;
        for _ in 0..self.offset {
            if !self.inner.next()? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl MergedResult for LimitDecoratorMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        if !self.skipped && !self.skip_offset()? {
            return Ok(false);
        }
        if self.row_count.is_some_and(|limit| self.emitted >= limit) {
            return Ok(false);
        }
        if self.inner.next()? {
            self.emitted += 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn value(&self, column_index: usize) -> ShardingResult<Value> {
        self.inner.value(column_index)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

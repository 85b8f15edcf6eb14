// SPDX-License-Identifier: Apache-2.0

//! Streaming k-way merge of individually sorted shard cursors.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use shardline_core::{QueryResult, ShardingError, ShardingResult, Value};

use super::order_by::{FamilyGuard, OrderByValue, SortColumn};
use super::MergedResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Initializing,
    Streaming,
    Exhausted,
}

/// Heap entry ordered so the smallest row sits on top.
struct HeapEntry {
    value: OrderByValue,
    columns: Arc<[SortColumn]>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.value.compare(&self.value, &self.columns)
    }
}

pub struct OrderByStreamMergedResult {
    columns: Arc<[SortColumn]>,
    guard: FamilyGuard,
    pending: Vec<Box<dyn QueryResult>>,
    heap: BinaryHeap<HeapEntry>,
    state: StreamState,
    /// The first `next` only exposes the already-primed top row
    is_first_next: bool,
}

impl OrderByStreamMergedResult {
    pub fn new(cursors: Vec<Box<dyn QueryResult>>, columns: Vec<SortColumn>) -> Self {
        let width = columns.len();
        Self {
            columns: columns.into(),
            guard: FamilyGuard::new(width),
            pending: cursors,
            heap: BinaryHeap::new(),
            state: StreamState::Initializing,
            is_first_next: true,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Advances every cursor once and queues those that have a row.
    fn prime(&mut self) -> ShardingResult<()> {
        let mut cursors = std::mem::take(&mut self.pending).into_iter().enumerate();
        while let Some((ordinal, cursor)) = cursors.next() {
            let mut value = OrderByValue::new(cursor, ordinal);
            let has_row = value.next(&self.columns, &mut self.guard);
            let entry = HeapEntry {
                value,
                columns: self.columns.clone(),
            };
            match has_row {
                Ok(true) => self.heap.push(entry),
                Ok(false) => {}
                Err(e) => {
                    // Keep it and the unreached cursors reachable for close().
                    self.heap.push(entry);
                    self.pending.extend(cursors.map(|(_, c)| c));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn advance(&mut self) -> ShardingResult<bool> {
        if self.state == StreamState::Initializing {
            self.prime()?;
            self.state = StreamState::Streaming;
        }
        if self.state == StreamState::Exhausted || self.heap.is_empty() {
            self.state = StreamState::Exhausted;
            return Ok(false);
        }
        if self.is_first_next {
            self.is_first_next = false;
            return Ok(true);
        }
        if let Some(mut top) = self.heap.pop() {
            let advanced = top.value.next(&self.columns, &mut self.guard);
            match advanced {
                Ok(true) => self.heap.push(top),
                Ok(false) => {}
                Err(e) => {
                    self.heap.push(top);
                    return Err(e);
                }
            }
        }
        if self.heap.is_empty() {
            self.state = StreamState::Exhausted;
            return Ok(false);
        }
        Ok(true)
    }
}

impl MergedResult for OrderByStreamMergedResult {
    fn next(&mut self) -> ShardingResult<bool> {
        self.advance()
    }

    fn value(&self, column_index: usize) -> ShardingResult<Value> {
        match (self.state, self.heap.peek()) {
            (StreamState::Streaming, Some(top)) => top.value.cursor().value(column_index),
            _ => Err(ShardingError::merge("merged result has no current row")),
        }
    }

    fn close(&mut self) {
        for cursor in &mut self.pending {
            cursor.close();
        }
        for mut entry in std::mem::take(&mut self.heap).into_vec() {
            entry.value.close();
        }
        self.state = StreamState::Exhausted;
    }
}

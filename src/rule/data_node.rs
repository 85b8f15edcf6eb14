// SPDX-License-Identifier: Apache-2.0

//! Physical data node: one actual table on one data source.

use std::fmt;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use shardline_core::{ShardingError, ShardingResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataNode {
    pub data_source: CompactString,
    pub table: CompactString,
}

impl DataNode {
    pub fn new(data_source: impl Into<CompactString>, table: impl Into<CompactString>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    /// Parses `ds.table`. The first dot separates the data source.
    pub fn parse(text: &str) -> ShardingResult<Self> {
        let text = text.trim();
        match text.split_once('.') {
            Some((ds, table)) if !ds.is_empty() && !table.is_empty() && !table.contains('.') => {
                Ok(Self::new(ds, table))
            }
            _ => Err(ShardingError::config(format!(
                "invalid data node '{text}', expected 'data_source.table'"
            ))),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Parameter rewriters: per unit, derive the parameter list that matches the
//! rewritten SQL.

use std::fmt::Debug;

use shardline_core::{ShardingError, ShardingResult, Value};

use super::token::InsertRowToken;
use crate::route::RouteUnit;

pub trait ParameterRewriter: Send + Sync + Debug {
    fn rewrite(&self, params: Vec<Value>, unit: &RouteUnit) -> ShardingResult<Vec<Value>>;
}

/// Sets parameterised OFFSET / LIMIT markers to their revised values.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationParameterRewriter {
    /// `(parameter index, revised value)`
    pub offset: Option<(usize, i64)>,
    pub row_count: Option<(usize, i64)>,
}

impl ParameterRewriter for PaginationParameterRewriter {
    fn rewrite(&self, mut params: Vec<Value>, _unit: &RouteUnit) -> ShardingResult<Vec<Value>> {
        let supplied = params.len();
        for (index, revised) in [self.offset, self.row_count].into_iter().flatten() {
            let slot = params.get_mut(index).ok_or_else(|| missing(index, supplied))?;
            *slot = Value::Int(revised);
        }
        Ok(params)
    }
}

/// Row parameters of a parameterised INSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRowParameters {
    pub indexes: Vec<usize>,
    /// Generated key value appended after the row's own parameters
    pub generated_key: Option<Value>,
}

/// Keeps the parameters of the rows routed to the unit, in row order,
/// followed by any trailing non-row parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertParameterRewriter {
    pub logic_table: String,
    pub rows: Vec<(InsertRowParameters, InsertRowToken)>,
    pub trailing_start: usize,
}

impl ParameterRewriter for InsertParameterRewriter {
    fn rewrite(&self, params: Vec<Value>, unit: &RouteUnit) -> ShardingResult<Vec<Value>> {
        let mut result = Vec::with_capacity(params.len());
        for (row, token) in &self.rows {
            if !token.belongs_to(&self.logic_table, unit) {
                continue;
            }
            for &index in &row.indexes {
                let value = params.get(index).ok_or_else(|| missing(index, params.len()))?;
                result.push(value.clone());
            }
            if let Some(key) = &row.generated_key {
                result.push(key.clone());
            }
        }
        if self.trailing_start < params.len() {
            result.extend_from_slice(&params[self.trailing_start..]);
        }
        Ok(result)
    }
}

fn missing(index: usize, supplied: usize) -> ShardingError {
    ShardingError::rewrite(format!(
        "parameter marker {} has no bound parameter ({supplied} supplied)",
        index + 1
    ))
}

// SPDX-License-Identifier: Apache-2.0

//! INSERT statement context

use serde::{Deserialize, Serialize};
use shardline_core::Value;

use super::segment::{TableSegment, ValueExpr};

/// One parenthesised row of a VALUES clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertValueRow {
    pub values: Vec<ValueExpr>,
}

impl InsertValueRow {
    pub fn new(values: Vec<ValueExpr>) -> Self {
        Self { values }
    }

    /// Parameter indexes used by this row, in textual order.
    pub fn parameter_indexes(&self) -> Vec<usize> {
        self.values
            .iter()
            .filter_map(|v| match v {
                ValueExpr::Parameter(i) => Some(*i),
                _ => None,
            })
            .collect()
    }
}

/// Keys generated for a column that the INSERT does not list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedKeyContext {
    pub column: String,
    /// One value per row
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertStatement {
    pub table: TableSegment,
    #[serde(default)]
    pub columns: Vec<String>,
    /// Position of the `)` closing the column list
    #[serde(default)]
    pub columns_stop_index: Option<usize>,
    /// First byte of the first row's `(`
    pub values_start_index: usize,
    /// Last byte of the last row's `)`
    pub values_stop_index: usize,
    pub rows: Vec<InsertValueRow>,
    #[serde(default)]
    pub generated_key: Option<GeneratedKeyContext>,
}

impl InsertStatement {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(column))
    }

    /// Value of `column` in every row, generated keys included.
    /// `None` entries mark values that are expressions.
    pub fn column_values(&self, column: &str) -> Option<Vec<ValueExpr>> {
        if let Some(index) = self.column_index(column) {
            return Some(
                self.rows
                    .iter()
                    .map(|row| {
                        row.values
                            .get(index)
                            .cloned()
                            .unwrap_or_else(|| ValueExpr::Expression(String::new()))
                    })
                    .collect(),
            );
        }
        self.generated_key
            .as_ref()
            .filter(|g| g.column.eq_ignore_ascii_case(column))
            .map(|g| g.values.iter().cloned().map(ValueExpr::Literal).collect())
    }

    pub fn is_parameterized(&self) -> bool {
        self.rows.iter().any(|row| !row.parameter_indexes().is_empty())
    }

    /// First parameter index after every row parameter; parameters from
    /// here on belong to trailing clauses such as ON DUPLICATE KEY UPDATE.
    pub fn trailing_parameter_start(&self) -> usize {
        self.rows
            .iter()
            .flat_map(InsertValueRow::parameter_indexes)
            .max()
            .map_or(0, |max| max + 1)
    }
}

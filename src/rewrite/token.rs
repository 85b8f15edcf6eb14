// SPDX-License-Identifier: Apache-2.0

//! SQL tokens
//!
//! A token replaces an inclusive `[start_index, stop_index]` span of the
//! logical SQL, or inserts text at `start_index` without consuming any of
//! it. Tokens are rendered per route unit.

use std::ops::Range;

use shardline_core::{ShardingError, ShardingResult};

use crate::route::RouteUnit;
use crate::rule::DataNode;
use crate::statement::QuoteCharacter;

/// One VALUES row as rendered SQL, with the data nodes it routed to.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRowToken {
    pub values: Vec<String>,
    /// Generated key rendered for this row (`?` or a literal)
    pub generated_key: Option<String>,
    /// Empty when the row goes to every unit
    pub data_nodes: Vec<DataNode>,
}

impl InsertRowToken {
    fn render(&self) -> String {
        let mut values = self.values.join(", ");
        if let Some(key) = &self.generated_key {
            if !values.is_empty() {
                values.push_str(", ");
            }
            values.push_str(key);
        }
        format!("({values})")
    }

    pub(crate) fn belongs_to(&self, logic_table: &str, unit: &RouteUnit) -> bool {
        if self.data_nodes.is_empty() {
            return true;
        }
        let Some(actual) = unit.actual_table(logic_table) else {
            return false;
        };
        self.data_nodes
            .iter()
            .any(|n| n.data_source == unit.data_source && n.table == actual)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlToken {
    /// Logic table name, replaced by the unit's actual table
    Table {
        start_index: usize,
        stop_index: usize,
        logic_table: String,
        quote: QuoteCharacter,
    },
    /// Schema qualifier (with its dot) in front of a rewritten table
    Remove { start_index: usize, stop_index: usize },
    /// DDL index name, suffixed with the actual table
    Index {
        start_index: usize,
        stop_index: usize,
        name: String,
        quote: QuoteCharacter,
        logic_table: String,
    },
    /// Derived columns appended to the select list
    Projections { start_index: usize, items: Vec<String> },
    /// ORDER BY generated from GROUP BY
    OrderBy { start_index: usize, items: Vec<String> },
    Offset {
        start_index: usize,
        stop_index: usize,
        revised: i64,
    },
    RowCount {
        start_index: usize,
        stop_index: usize,
        revised: i64,
    },
    /// `, column` inserted before the `)` of the column list
    GeneratedKeyInsertColumn { start_index: usize, column: String },
    /// Whole VALUES region, re-rendered with the unit's rows
    InsertValues {
        start_index: usize,
        stop_index: usize,
        logic_table: String,
        rows: Vec<InsertRowToken>,
    },
}

impl SqlToken {
    pub fn start_index(&self) -> usize {
        match self {
            Self::Table { start_index, .. }
            | Self::Remove { start_index, .. }
            | Self::Index { start_index, .. }
            | Self::Projections { start_index, .. }
            | Self::OrderBy { start_index, .. }
            | Self::Offset { start_index, .. }
            | Self::RowCount { start_index, .. }
            | Self::GeneratedKeyInsertColumn { start_index, .. }
            | Self::InsertValues { start_index, .. } => *start_index,
        }
    }

    /// Half-open byte range of original text the token consumes.
    pub fn span(&self) -> Range<usize> {
        match self {
            Self::Projections { start_index, .. }
            | Self::OrderBy { start_index, .. }
            | Self::GeneratedKeyInsertColumn { start_index, .. } => *start_index..*start_index,
            Self::Table { start_index, stop_index, .. }
            | Self::Remove { start_index, stop_index }
            | Self::Index { start_index, stop_index, .. }
            | Self::Offset { start_index, stop_index, .. }
            | Self::RowCount { start_index, stop_index, .. }
            | Self::InsertValues { start_index, stop_index, .. } => *start_index..*stop_index + 1,
        }
    }

    pub fn is_insertion(&self) -> bool {
        self.span().is_empty()
    }

    /// Replacement text for one route unit. `original` is the consumed text.
    pub fn render(&self, unit: &RouteUnit, original: &str) -> String {
        match self {
            Self::Table {
                logic_table, quote, ..
            } => match unit.actual_table(logic_table) {
                Some(actual) => quote.wrap(actual),
                None => original.to_string(),
            },
            Self::Remove { .. } => String::new(),
            Self::Index {
                name,
                quote,
                logic_table,
                ..
            } => match unit.actual_table(logic_table) {
                Some(actual) => quote.wrap(&format!("{name}_{actual}")),
                None => original.to_string(),
            },
            Self::Projections { items, .. } => items.iter().map(|i| format!(", {i}")).collect(),
            Self::OrderBy { items, .. } => format!(" ORDER BY {} ", items.join(", ")),
            Self::Offset { revised, .. } | Self::RowCount { revised, .. } => revised.to_string(),
            Self::GeneratedKeyInsertColumn { column, .. } => format!(", {column}"),
            Self::InsertValues {
                logic_table, rows, ..
            } => rows
                .iter()
                .filter(|row| row.belongs_to(logic_table, unit))
                .map(InsertRowToken::render)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Sorts tokens by position and checks they fit the SQL text without
/// overlapping.
pub fn sort_and_validate<'t>(sql: &str, tokens: &'t [SqlToken]) -> ShardingResult<Vec<&'t SqlToken>> {
    let mut sorted: Vec<&SqlToken> = tokens.iter().collect();
    sorted.sort_by_key(|t| (t.span().start, t.span().end));
    for token in &sorted {
        let span = token.span();
        if span.end > sql.len() {
            return Err(ShardingError::rewrite(format!(
                "token {token:?} ends at byte {} beyond SQL length {}",
                span.end,
                sql.len()
            )));
        }
        if !sql.is_char_boundary(span.start) || !sql.is_char_boundary(span.end) {
            return Err(ShardingError::rewrite(format!(
                "token {token:?} does not lie on character boundaries"
            )));
        }
    }
    for pair in sorted.windows(2) {
        if pair[0].span().end > pair[1].span().start {
            return Err(ShardingError::rewrite(format!(
                "tokens overlap: {:?} and {:?}",
                pair[0], pair[1]
            )));
        }
    }
    Ok(sorted)
}

/// Applies sorted, validated tokens left to right.
pub fn apply_tokens(sql: &str, sorted: &[&SqlToken], unit: &RouteUnit) -> String {
    let mut result = String::with_capacity(sql.len() + 32);
    let mut cursor = 0;
    for token in sorted {
        let span = token.span();
        result.push_str(&sql[cursor..span.start]);
        result.push_str(&token.render(unit, &sql[span.clone()]));
        cursor = span.end;
    }
    result.push_str(&sql[cursor..]);
    result
}

// SPDX-License-Identifier: Apache-2.0

//! Explicit per-call routing hints.

use shardline_core::Value;

/// Caller supplied sharding values.
///
/// Column values replace whatever the statement's predicates say about that
/// `(logic table, column)`. Database and table values feed hint strategies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HintContext {
    column_values: Vec<(String, String, Vec<Value>)>,
    database_values: Vec<(String, Vec<Value>)>,
    table_values: Vec<(String, Vec<Value>)>,
}

impl HintContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column_value(
        self,
        logic_table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.with_column_values(logic_table, column, vec![value.into()])
    }

    pub fn with_column_values(
        mut self,
        logic_table: impl Into<String>,
        column: impl Into<String>,
        values: Vec<Value>,
    ) -> Self {
        let (table, column) = (logic_table.into(), column.into());
        match self
            .column_values
            .iter_mut()
            .find(|(t, c, _)| t.eq_ignore_ascii_case(&table) && c.eq_ignore_ascii_case(&column))
        {
            Some((_, _, existing)) => existing.extend(values),
            None => self.column_values.push((table, column, values)),
        }
        self
    }

    pub fn with_database_value(mut self, logic_table: impl Into<String>, value: impl Into<Value>) -> Self {
        push_value(&mut self.database_values, logic_table.into(), value.into());
        self
    }

    pub fn with_table_value(mut self, logic_table: impl Into<String>, value: impl Into<Value>) -> Self {
        push_value(&mut self.table_values, logic_table.into(), value.into());
        self
    }

    /// Column overrides for one table as `(column, values)`.
    pub fn column_values<'a>(&'a self, logic_table: &'a str) -> impl Iterator<Item = (&'a str, &'a [Value])> + 'a {
        self.column_values
            .iter()
            .filter(move |(t, _, _)| t.eq_ignore_ascii_case(logic_table))
            .map(|(_, c, v)| (c.as_str(), v.as_slice()))
    }

    pub fn database_values(&self, logic_table: &str) -> &[Value] {
        lookup(&self.database_values, logic_table)
    }

    pub fn table_values(&self, logic_table: &str) -> &[Value] {
        lookup(&self.table_values, logic_table)
    }

    pub fn is_empty(&self) -> bool {
        self.column_values.is_empty() && self.database_values.is_empty() && self.table_values.is_empty()
    }
}

fn push_value(entries: &mut Vec<(String, Vec<Value>)>, table: String, value: Value) {
    match entries.iter_mut().find(|(t, _)| t.eq_ignore_ascii_case(&table)) {
        Some((_, values)) => values.push(value),
        None => entries.push((table, vec![value])),
    }
}

fn lookup<'a>(entries: &'a [(String, Vec<Value>)], table: &str) -> &'a [Value] {
    entries
        .iter()
        .find(|(t, _)| t.eq_ignore_ascii_case(table))
        .map(|(_, v)| v.as_slice())
        .unwrap_or(&[])
}

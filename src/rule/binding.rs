// SPDX-License-Identifier: Apache-2.0

//! Binding table groups
//!
//! Tables in one group always co-locate: the shard of one member
//! determines the shard of every other member by position.

use shardline_core::{ShardingError, ShardingResult};

use super::table_rule::TableRule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTableGroup {
    tables: Vec<String>,
}

impl BindingTableGroup {
    /// Parses `"t_order, t_order_item"`.
    pub fn parse(text: &str) -> ShardingResult<Self> {
        let tables: Vec<String> = text
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tables.len() < 2 {
            return Err(ShardingError::config(format!(
                "binding group '{text}' needs at least two tables"
            )));
        }
        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t.eq_ignore_ascii_case(table))
    }

    pub fn contains_all<S: AsRef<str>>(&self, tables: &[S]) -> bool {
        tables.iter().all(|t| self.contains(t.as_ref()))
    }

    /// Checks that every member shares one layout.
    pub fn validate(&self, rules: &[&TableRule]) -> ShardingResult<()> {
        let Some((first, rest)) = rules.split_first() else {
            return Ok(());
        };
        let expected = first.shape();
        for rule in rest {
            if rule.shape() != expected {
                return Err(ShardingError::config(format!(
                    "binding tables '{}' and '{}' have different data node layouts",
                    first.logic_table(),
                    rule.logic_table()
                )));
            }
        }
        Ok(())
    }

    /// Actual table of `target` that pairs with `actual_table` of `driver`.
    pub fn binding_actual_table(
        driver: &TableRule,
        target: &TableRule,
        data_source: &str,
        actual_table: &str,
    ) -> ShardingResult<String> {
        driver
            .position(data_source, actual_table)
            .and_then(|(ds_index, table_index)| target.actual_table_at(ds_index, table_index))
            .map(str::to_string)
            .ok_or_else(|| {
                ShardingError::routing(
                    target.logic_table(),
                    format!(
                        "no binding actual table for '{}.{actual_table}' of '{}'",
                        data_source,
                        driver.logic_table()
                    ),
                )
            })
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Rule for one logic table: where its shards live and how to pick them.

use std::sync::Arc;

use shardline_core::{ShardingError, ShardingResult};

use super::data_node::DataNode;
use super::inline;
use super::key_generator::KeyGenerator;
use super::strategy::ShardingStrategy;

/// Key generation settings of a table.
#[derive(Debug, Clone)]
pub struct KeyGenerateRule {
    pub column: String,
    pub generator: Arc<dyn KeyGenerator>,
}

#[derive(Debug, Clone)]
pub struct TableRule {
    logic_table: String,
    actual_data_nodes: Vec<DataNode>,
    /// Data sources in first-appearance order, each with its actual tables.
    layout: Vec<(String, Vec<String>)>,
    database_strategy: Option<ShardingStrategy>,
    table_strategy: Option<ShardingStrategy>,
    key_generate: Option<KeyGenerateRule>,
}

impl TableRule {
    /// Builds the rule from an inline node expression, or places the logic
    /// table on every data source when none is given.
    pub fn new(
        logic_table: &str,
        actual_data_nodes: Option<&str>,
        data_sources: &[String],
    ) -> ShardingResult<Self> {
        let nodes = match actual_data_nodes {
            Some(expression) => inline::expand(expression)?
                .iter()
                .map(|node| DataNode::parse(node))
                .collect::<ShardingResult<Vec<_>>>()?,
            None => data_sources
                .iter()
                .map(|ds| DataNode::new(ds.as_str(), logic_table))
                .collect(),
        };
        if nodes.is_empty() {
            return Err(ShardingError::config(format!(
                "table '{logic_table}' has no actual data nodes"
            )));
        }
        let mut layout: Vec<(String, Vec<String>)> = Vec::new();
        let mut unique = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !data_sources.iter().any(|ds| ds == node.data_source.as_str()) {
                return Err(ShardingError::config(format!(
                    "table '{logic_table}' references unknown data source '{}'",
                    node.data_source
                )));
            }
            if unique.contains(&node) {
                continue;
            }
            match layout.iter_mut().find(|(ds, _)| ds == node.data_source.as_str()) {
                Some((_, tables)) => tables.push(node.table.to_string()),
                None => layout.push((node.data_source.to_string(), vec![node.table.to_string()])),
            }
            unique.push(node);
        }
        Ok(Self {
            logic_table: logic_table.to_string(),
            actual_data_nodes: unique,
            layout,
            database_strategy: None,
            table_strategy: None,
            key_generate: None,
        })
    }

    pub fn with_database_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.database_strategy = Some(strategy);
        self
    }

    pub fn with_table_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.table_strategy = Some(strategy);
        self
    }

    pub fn with_key_generate(mut self, rule: KeyGenerateRule) -> Self {
        self.key_generate = Some(rule);
        self
    }

    pub fn logic_table(&self) -> &str {
        &self.logic_table
    }

    pub fn actual_data_nodes(&self) -> &[DataNode] {
        &self.actual_data_nodes
    }

    pub fn data_source_names(&self) -> Vec<String> {
        self.layout.iter().map(|(ds, _)| ds.clone()).collect()
    }

    /// Actual tables on one data source, in configured order.
    pub fn actual_tables(&self, data_source: &str) -> &[String] {
        self.layout
            .iter()
            .find(|(ds, _)| ds == data_source)
            .map(|(_, tables)| tables.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains_node(&self, data_source: &str, actual_table: &str) -> bool {
        self.actual_tables(data_source).iter().any(|t| t == actual_table)
    }

    /// `(data source index, table index)` of an actual table.
    pub fn position(&self, data_source: &str, actual_table: &str) -> Option<(usize, usize)> {
        let ds_index = self.layout.iter().position(|(ds, _)| ds == data_source)?;
        let table_index = self.layout[ds_index].1.iter().position(|t| t == actual_table)?;
        Some((ds_index, table_index))
    }

    pub fn actual_table_at(&self, ds_index: usize, table_index: usize) -> Option<&str> {
        self.layout
            .get(ds_index)
            .and_then(|(_, tables)| tables.get(table_index))
            .map(String::as_str)
    }

    /// Per data source table counts, used to check binding compatibility.
    pub fn shape(&self) -> Vec<(&str, usize)> {
        self.layout
            .iter()
            .map(|(ds, tables)| (ds.as_str(), tables.len()))
            .collect()
    }

    pub fn database_strategy(&self) -> Option<&ShardingStrategy> {
        self.database_strategy.as_ref()
    }

    pub fn table_strategy(&self) -> Option<&ShardingStrategy> {
        self.table_strategy.as_ref()
    }

    pub fn key_generate(&self) -> Option<&KeyGenerateRule> {
        self.key_generate.as_ref()
    }
}

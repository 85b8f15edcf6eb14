// SPDX-License-Identifier: Apache-2.0

//! Sharding Rule Model
//!
//! Immutable view of the sharding configuration that routing and rewriting
//! consult: table rules, binding groups, broadcast tables and defaults.

pub mod algorithm;
pub mod binding;
pub mod data_node;
pub mod inline;
pub mod key_generator;
pub mod range;
pub mod strategy;
pub mod table_rule;

use std::collections::HashMap;

use shardline_core::{ShardingError, ShardingResult};
use tracing::debug;

use crate::config::{RuleProps, ShardingRuleConfig, StrategyConfig};
use algorithm::AlgorithmRegistry;
use binding::BindingTableGroup;
use key_generator::create_key_generator;
use strategy::ShardingStrategy;
use table_rule::{KeyGenerateRule, TableRule};

pub use data_node::DataNode;

#[derive(Debug, Clone)]
pub struct ShardingRule {
    data_source_names: Vec<String>,
    /// Keyed by lowercase logic table name
    table_rules: HashMap<String, TableRule>,
    binding_groups: Vec<BindingTableGroup>,
    broadcast_tables: Vec<String>,
    default_database_strategy: ShardingStrategy,
    default_table_strategy: ShardingStrategy,
    default_data_source: Option<String>,
    props: RuleProps,
}

impl ShardingRule {
    /// Builds the rule using only the built-in algorithms.
    pub fn from_config(config: &ShardingRuleConfig) -> ShardingResult<Self> {
        Self::new(config, AlgorithmRegistry::new())
    }

    /// Builds the rule. Algorithms already in `registry` take precedence
    /// over configured algorithms of the same name.
    pub fn new(config: &ShardingRuleConfig, registry: AlgorithmRegistry) -> ShardingResult<Self> {
        if config.data_sources.is_empty() {
            return Err(ShardingError::config("at least one data source is required"));
        }
        let registry = registry.with_configured(&config.sharding_algorithms, &config.props)?;
        let strategy = |c: &Option<StrategyConfig>| -> ShardingResult<Option<ShardingStrategy>> {
            c.as_ref()
                .map(|c| ShardingStrategy::from_config(c, &registry))
                .transpose()
        };

        let mut generators = HashMap::new();
        for (name, generator) in &config.key_generators {
            generators.insert(name.as_str(), create_key_generator(generator, &config.props)?);
        }

        let mut table_rules = HashMap::new();
        for table in &config.tables {
            let mut rule = TableRule::new(
                &table.logic_table,
                table.actual_data_nodes.as_deref(),
                &config.data_sources,
            )?;
            if let Some(s) = strategy(&table.database_strategy)? {
                rule = rule.with_database_strategy(s);
            }
            if let Some(s) = strategy(&table.table_strategy)? {
                rule = rule.with_table_strategy(s);
            }
            if let Some(key) = &table.key_generate {
                let generator = generators.get(key.key_generator.as_str()).ok_or_else(|| {
                    ShardingError::config(format!(
                        "key generator '{}' of table '{}' is not defined",
                        key.key_generator, table.logic_table
                    ))
                })?;
                rule = rule.with_key_generate(KeyGenerateRule {
                    column: key.column.clone(),
                    generator: generator.clone(),
                });
            }
            let key = table.logic_table.to_ascii_lowercase();
            if table_rules.insert(key, rule).is_some() {
                return Err(ShardingError::config(format!(
                    "table '{}' is configured twice",
                    table.logic_table
                )));
            }
        }

        let mut binding_groups = Vec::new();
        for text in &config.binding_tables {
            let group = BindingTableGroup::parse(text)?;
            let mut members = Vec::new();
            for table in group.tables() {
                let rule = table_rules.get(&table.to_ascii_lowercase()).ok_or_else(|| {
                    ShardingError::config(format!(
                        "binding table '{table}' has no table rule"
                    ))
                })?;
                members.push(rule);
            }
            group.validate(&members)?;
            binding_groups.push(group);
        }

        for table in &config.broadcast_tables {
            if table_rules.contains_key(&table.to_ascii_lowercase()) {
                return Err(ShardingError::config(format!(
                    "table '{table}' cannot be both sharded and broadcast"
                )));
            }
        }

        if let Some(ds) = &config.default_data_source {
            if !config.data_sources.contains(ds) {
                return Err(ShardingError::config(format!(
                    "default data source '{ds}' is not a configured data source"
                )));
            }
        }

        let rule = Self {
            data_source_names: config.data_sources.clone(),
            table_rules,
            binding_groups,
            broadcast_tables: config.broadcast_tables.clone(),
            default_database_strategy: strategy(&config.default_database_strategy)?
                .unwrap_or(ShardingStrategy::None),
            default_table_strategy: strategy(&config.default_table_strategy)?
                .unwrap_or(ShardingStrategy::None),
            default_data_source: config.default_data_source.clone(),
            props: config.props.clone(),
        };
        debug!(
            data_sources = rule.data_source_names.len(),
            tables = rule.table_rules.len(),
            binding_groups = rule.binding_groups.len(),
            algorithms = registry.len(),
            "Sharding rule built"
        );
        Ok(rule)
    }

    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    pub fn props(&self) -> &RuleProps {
        &self.props
    }

    pub fn find_table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.table_rules.get(&logic_table.to_ascii_lowercase())
    }

    pub fn table_rule(&self, logic_table: &str) -> ShardingResult<&TableRule> {
        self.find_table_rule(logic_table).ok_or_else(|| {
            ShardingError::routing(logic_table, "no table rule is configured for this table")
        })
    }

    pub fn is_sharding_table(&self, logic_table: &str) -> bool {
        self.find_table_rule(logic_table).is_some()
    }

    pub fn is_broadcast_table(&self, logic_table: &str) -> bool {
        self.broadcast_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(logic_table))
    }

    /// True when there is at least one table and all of them are broadcast.
    pub fn all_broadcast<S: AsRef<str>>(&self, tables: &[S]) -> bool {
        !tables.is_empty() && tables.iter().all(|t| self.is_broadcast_table(t.as_ref()))
    }

    pub fn binding_group(&self, logic_table: &str) -> Option<&BindingTableGroup> {
        self.binding_groups.iter().find(|g| g.contains(logic_table))
    }

    /// True when all tables belong to one binding group.
    pub fn all_binding<S: AsRef<str>>(&self, tables: &[S]) -> bool {
        let Some(first) = tables.first() else {
            return false;
        };
        self.binding_group(first.as_ref())
            .is_some_and(|g| g.contains_all(tables))
    }

    pub fn default_data_source(&self) -> Option<&str> {
        self.default_data_source.as_deref()
    }

    pub fn database_strategy<'a>(&'a self, table_rule: &'a TableRule) -> &'a ShardingStrategy {
        table_rule
            .database_strategy()
            .unwrap_or(&self.default_database_strategy)
    }

    pub fn table_strategy<'a>(&'a self, table_rule: &'a TableRule) -> &'a ShardingStrategy {
        table_rule
            .table_strategy()
            .unwrap_or(&self.default_table_strategy)
    }

    /// Whether `column` feeds the database or table strategy of the table.
    pub fn is_sharding_column(&self, logic_table: &str, column: &str) -> bool {
        let Some(rule) = self.find_table_rule(logic_table) else {
            return false;
        };
        self.database_strategy(rule)
            .sharding_columns()
            .into_iter()
            .chain(self.table_strategy(rule).sharding_columns())
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    /// Key generation column of a table, if it has one.
    pub fn generate_key_column(&self, logic_table: &str) -> Option<&str> {
        self.find_table_rule(logic_table)?
            .key_generate()
            .map(|k| k.column.as_str())
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Sharding Rule Configuration
//!
//! Serde model of the JSON rule file. The configuration only names things;
//! [`crate::rule::ShardingRule::new`] resolves and validates the references.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use shardline_core::{ShardingError, ShardingResult};

use crate::rule::algorithm::AlgorithmProps;

/// Top-level sharding rule configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardingRuleConfig {
    /// Every data source name known to the rule, in preference order
    pub data_sources: Vec<String>,
    #[serde(default)]
    pub tables: Vec<TableRuleConfig>,
    /// Binding groups written as `"t_order, t_order_item"`
    #[serde(default)]
    pub binding_tables: Vec<String>,
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    #[serde(default)]
    pub default_database_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub default_table_strategy: Option<StrategyConfig>,
    /// Data source for tables without a rule
    #[serde(default)]
    pub default_data_source: Option<String>,
    #[serde(default)]
    pub sharding_algorithms: BTreeMap<String, AlgorithmConfig>,
    #[serde(default)]
    pub key_generators: BTreeMap<String, AlgorithmConfig>,
    #[serde(default)]
    pub props: RuleProps,
}

impl ShardingRuleConfig {
    pub fn from_json_str(json: &str) -> ShardingResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ShardingError::config(format!("Failed to parse sharding config: {e}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> ShardingResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShardingError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&content)
    }
}

/// Rule for one logic table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRuleConfig {
    pub logic_table: String,
    /// Inline node expression, e.g. `ds_${0..1}.t_order_${0..1}`.
    /// Defaults to the logic table on every data source.
    #[serde(default)]
    pub actual_data_nodes: Option<String>,
    #[serde(default)]
    pub database_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub table_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub key_generate: Option<KeyGenerateConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    Standard {
        sharding_column: String,
        algorithm: String,
    },
    Complex {
        /// Comma-separated column names
        sharding_columns: String,
        algorithm: String,
    },
    Hint {
        algorithm: String,
    },
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGenerateConfig {
    pub column: String,
    pub key_generator: String,
}

/// A named algorithm or key generator: type plus free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub props: AlgorithmProps,
}

/// Global behaviour switches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleProps {
    /// Log every rewritten unit on the `shardline::sql` target
    pub sql_show: bool,
    /// Include parameter values in SQL logs (redacted otherwise)
    pub sql_show_parameters: bool,
    pub allow_range_query_with_inline_sharding: bool,
    /// Snowflake worker id when a generator does not set its own
    pub worker_id: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "data_sources": ["ds_0", "ds_1"],
        "tables": [{
            "logic_table": "t_order",
            "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
            "table_strategy": {
                "type": "standard",
                "sharding_column": "order_id",
                "algorithm": "order_inline"
            },
            "key_generate": { "column": "order_id", "key_generator": "snowflake" }
        }],
        "binding_tables": ["t_order, t_order_item"],
        "default_database_strategy": { "type": "none" },
        "sharding_algorithms": {
            "order_inline": {
                "type": "INLINE",
                "props": { "algorithm-expression": "t_order_${order_id % 2}" }
            }
        },
        "key_generators": { "snowflake": { "type": "SNOWFLAKE" } },
        "props": { "sql_show": true }
    }"#;

    #[test]
    fn parses_full_configuration() {
        let config = ShardingRuleConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.data_sources, vec!["ds_0", "ds_1"]);
        assert_eq!(config.tables.len(), 1);
        assert_eq!(
            config.tables[0].table_strategy,
            Some(StrategyConfig::Standard {
                sharding_column: "order_id".into(),
                algorithm: "order_inline".into(),
            })
        );
        assert_eq!(config.default_database_strategy, Some(StrategyConfig::None));
        assert!(config.props.sql_show);
        assert!(!config.props.sql_show_parameters);
        assert_eq!(config.props.worker_id, 0);
        assert_eq!(config.sharding_algorithms["order_inline"].kind, "INLINE");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = ShardingRuleConfig::from_path(file.path()).unwrap();
        assert_eq!(config.binding_tables, vec!["t_order, t_order_item"]);
    }

    #[test]
    fn reports_malformed_json_as_configuration_error() {
        let err = ShardingRuleConfig::from_json_str("{ \"tables\": 3 }").unwrap_err();
        assert!(matches!(err, ShardingError::InvalidConfiguration { .. }));

        let missing = ShardingRuleConfig::from_path("/nonexistent/shardline.json").unwrap_err();
        assert!(missing.to_string().contains("Failed to read"));
    }
}

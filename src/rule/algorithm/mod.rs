// SPDX-License-Identifier: Apache-2.0

//! Sharding algorithms
//!
//! Algorithms map sharding values onto a subset of the available targets
//! (data source names or actual table names). Three shapes exist:
//! standard (one column, precise or range values), complex (several
//! columns) and hint (values supplied explicitly by the caller).
//!
//! Built-in algorithms are created from configuration by type name;
//! callers may register their own instances in an [`AlgorithmRegistry`].

mod boundary_range;
mod complex_inline;
mod hash_mod;
mod hint_inline;
mod inline;
mod interval;
mod modulo;

pub use boundary_range::BoundaryRangeShardingAlgorithm;
pub use complex_inline::ComplexInlineShardingAlgorithm;
pub use hash_mod::HashModShardingAlgorithm;
pub use hint_inline::HintInlineShardingAlgorithm;
pub use inline::InlineShardingAlgorithm;
pub use interval::IntervalShardingAlgorithm;
pub use modulo::ModShardingAlgorithm;

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use shardline_core::{ShardingError, ShardingResult, Value};

use super::range::ValueRange;
use crate::config::{AlgorithmConfig, RuleProps};

/// Free-form algorithm properties, as written in configuration.
pub type AlgorithmProps = BTreeMap<String, serde_json::Value>;

/// One sharding value for a single column.
#[derive(Debug, Clone, Copy)]
pub struct PreciseShardingValue<'a> {
    pub logic_table: &'a str,
    pub column: &'a str,
    pub value: &'a Value,
}

/// A range of sharding values for a single column.
#[derive(Debug, Clone, Copy)]
pub struct RangeShardingValue<'a> {
    pub logic_table: &'a str,
    pub column: &'a str,
    pub range: &'a ValueRange,
}

/// Values for every column of a complex strategy.
#[derive(Debug, Clone, Default)]
pub struct ComplexShardingValues {
    pub logic_table: String,
    pub column_values: BTreeMap<String, Vec<Value>>,
    pub column_ranges: BTreeMap<String, ValueRange>,
}

pub trait StandardShardingAlgorithm: Send + Sync + Debug {
    fn type_name(&self) -> &'static str;

    /// Target for a single value, or `None` when no target matches.
    fn do_sharding(
        &self,
        targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> ShardingResult<Option<String>>;

    fn do_range_sharding(
        &self,
        targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> ShardingResult<Vec<String>>;
}

pub trait ComplexShardingAlgorithm: Send + Sync + Debug {
    fn type_name(&self) -> &'static str;

    fn do_sharding(
        &self,
        targets: &[String],
        values: &ComplexShardingValues,
    ) -> ShardingResult<Vec<String>>;
}

pub trait HintShardingAlgorithm: Send + Sync + Debug {
    fn type_name(&self) -> &'static str;

    fn do_sharding(
        &self,
        targets: &[String],
        logic_table: &str,
        values: &[Value],
    ) -> ShardingResult<Vec<String>>;
}

/// A configured algorithm instance of any shape.
#[derive(Debug, Clone)]
pub enum ShardingAlgorithm {
    Standard(Arc<dyn StandardShardingAlgorithm>),
    Complex(Arc<dyn ComplexShardingAlgorithm>),
    Hint(Arc<dyn HintShardingAlgorithm>),
}

impl ShardingAlgorithm {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Standard(a) => a.type_name(),
            Self::Complex(a) => a.type_name(),
            Self::Hint(a) => a.type_name(),
        }
    }

    /// Instantiates a built-in algorithm from its configuration.
    pub fn from_config(config: &AlgorithmConfig, props: &RuleProps) -> ShardingResult<Self> {
        let kind = config.kind.to_ascii_uppercase();
        let p = &config.props;
        Ok(match kind.as_str() {
            "MOD" => Self::Standard(Arc::new(ModShardingAlgorithm::from_props(p)?)),
            "HASH_MOD" => Self::Standard(Arc::new(HashModShardingAlgorithm::from_props(p)?)),
            "INLINE" => Self::Standard(Arc::new(InlineShardingAlgorithm::from_props(
                p,
                props.allow_range_query_with_inline_sharding,
            )?)),
            "BOUNDARY_RANGE" => {
                Self::Standard(Arc::new(BoundaryRangeShardingAlgorithm::from_props(p)?))
            }
            "INTERVAL" => Self::Standard(Arc::new(IntervalShardingAlgorithm::from_props(p)?)),
            "COMPLEX_INLINE" => Self::Complex(Arc::new(ComplexInlineShardingAlgorithm::from_props(
                p,
                props.allow_range_query_with_inline_sharding,
            )?)),
            "HINT_INLINE" => Self::Hint(Arc::new(HintInlineShardingAlgorithm::from_props(p)?)),
            other => {
                return Err(ShardingError::config(format!(
                    "unknown sharding algorithm type '{other}'"
                )))
            }
        })
    }
}

/// Registry of named algorithm instances
pub struct AlgorithmRegistry {
    algorithms: HashMap<String, ShardingAlgorithm>,
}

impl AlgorithmRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            algorithms: HashMap::new(),
        }
    }

    /// Builds every configured algorithm. Names already registered are kept,
    /// so caller-provided instances win over configuration.
    pub fn with_configured(
        mut self,
        configs: &BTreeMap<String, AlgorithmConfig>,
        props: &RuleProps,
    ) -> ShardingResult<Self> {
        for (name, config) in configs {
            if self.algorithms.contains_key(name) {
                continue;
            }
            let algorithm = ShardingAlgorithm::from_config(config, props)?;
            self.algorithms.insert(name.clone(), algorithm);
        }
        Ok(self)
    }

    pub fn register(&mut self, name: impl Into<String>, algorithm: ShardingAlgorithm) {
        self.algorithms.insert(name.into(), algorithm);
    }

    pub fn register_standard(
        &mut self,
        name: impl Into<String>,
        algorithm: Arc<dyn StandardShardingAlgorithm>,
    ) {
        self.register(name, ShardingAlgorithm::Standard(algorithm));
    }

    pub fn register_complex(
        &mut self,
        name: impl Into<String>,
        algorithm: Arc<dyn ComplexShardingAlgorithm>,
    ) {
        self.register(name, ShardingAlgorithm::Complex(algorithm));
    }

    pub fn register_hint(&mut self, name: impl Into<String>, algorithm: Arc<dyn HintShardingAlgorithm>) {
        self.register(name, ShardingAlgorithm::Hint(algorithm));
    }

    pub fn get(&self, name: &str) -> Option<&ShardingAlgorithm> {
        self.algorithms.get(name)
    }

    /// Lists all registered algorithm names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.algorithms.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Property helpers ====================

pub(crate) fn prop_string(props: &AlgorithmProps, key: &str) -> Option<String> {
    match props.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn required_string(props: &AlgorithmProps, key: &str) -> ShardingResult<String> {
    prop_string(props, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ShardingError::config(format!("missing algorithm property '{key}'")))
}

pub(crate) fn prop_i64(props: &AlgorithmProps, key: &str) -> ShardingResult<Option<i64>> {
    match prop_string(props, key) {
        None => Ok(None),
        Some(s) => s.trim().parse::<i64>().map(Some).map_err(|_| {
            ShardingError::config(format!("algorithm property '{key}' must be an integer, got '{s}'"))
        }),
    }
}

pub(crate) fn required_positive(props: &AlgorithmProps, key: &str) -> ShardingResult<i64> {
    match prop_i64(props, key)? {
        Some(v) if v > 0 => Ok(v),
        Some(v) => Err(ShardingError::config(format!(
            "algorithm property '{key}' must be positive, got {v}"
        ))),
        None => Err(ShardingError::config(format!("missing algorithm property '{key}'"))),
    }
}

fn numeric_suffix_regex() -> Option<&'static Regex> {
    static SUFFIX: OnceLock<Option<Regex>> = OnceLock::new();
    SUFFIX.get_or_init(|| Regex::new(r"(\d+)$").ok()).as_ref()
}

/// Numeric suffix of a target name (`t_order_12` -> 12).
pub(crate) fn numeric_suffix(target: &str) -> Option<i64> {
    numeric_suffix_regex()?
        .captures(target)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// First target whose numeric suffix equals `index`.
pub(crate) fn target_with_suffix(targets: &[String], index: i64) -> Option<String> {
    targets
        .iter()
        .find(|t| numeric_suffix(t) == Some(index))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(kind: &str, props: serde_json::Value) -> AlgorithmConfig {
        serde_json::from_value(json!({ "type": kind, "props": props })).unwrap()
    }

    #[test]
    fn builds_builtins_from_config() {
        let props = RuleProps::default();
        let cases = [
            ("MOD", json!({ "sharding-count": 2 })),
            ("hash_mod", json!({ "sharding-count": "4" })),
            ("INLINE", json!({ "algorithm-expression": "t_${id % 2}" })),
            ("BOUNDARY_RANGE", json!({ "sharding-ranges": "10,20" })),
            ("COMPLEX_INLINE", json!({ "algorithm-expression": "t_${a + b}" })),
            ("HINT_INLINE", json!({})),
        ];
        for (kind, p) in cases {
            let algorithm = ShardingAlgorithm::from_config(&config(kind, p), &props).unwrap();
            assert_eq!(algorithm.type_name(), kind.to_ascii_uppercase());
        }
    }

    #[test]
    fn unknown_type_is_a_configuration_error() {
        let err = ShardingAlgorithm::from_config(&config("NOPE", json!({})), &RuleProps::default())
            .unwrap_err();
        assert!(matches!(err, ShardingError::InvalidConfiguration { .. }));
    }

    #[test]
    fn registered_instances_take_precedence() {
        let mut registry = AlgorithmRegistry::new();
        registry.register_standard("custom", Arc::new(ModShardingAlgorithm::new(3)));
        let mut configs = BTreeMap::new();
        configs.insert(
            "custom".to_string(),
            config("INLINE", json!({ "algorithm-expression": "t_${id}" })),
        );
        let registry = registry.with_configured(&configs, &RuleProps::default()).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("custom").unwrap().type_name(), "MOD");
        assert_eq!(registry.list(), vec!["custom"]);
    }

    #[test]
    fn suffix_matching_uses_whole_number() {
        let targets = vec!["t_1".to_string(), "t_11".to_string()];
        assert_eq!(target_with_suffix(&targets, 11).as_deref(), Some("t_11"));
        assert_eq!(target_with_suffix(&targets, 1).as_deref(), Some("t_1"));
        assert_eq!(numeric_suffix("ds"), None);
    }
}

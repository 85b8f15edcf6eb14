// SPDX-License-Identifier: Apache-2.0

//! Sharding strategies: which columns feed which algorithm.

use std::sync::Arc;

use shardline_core::{ShardingError, ShardingResult, Value};

use super::algorithm::{
    AlgorithmRegistry, ComplexShardingAlgorithm, ComplexShardingValues, HintShardingAlgorithm,
    PreciseShardingValue, RangeShardingValue, ShardingAlgorithm, StandardShardingAlgorithm,
};
use crate::config::StrategyConfig;
use crate::route::condition::{ConditionOperand, ShardingConditionValue};

#[derive(Debug, Clone)]
pub enum ShardingStrategy {
    Standard {
        column: String,
        algorithm: Arc<dyn StandardShardingAlgorithm>,
    },
    Complex {
        columns: Vec<String>,
        algorithm: Arc<dyn ComplexShardingAlgorithm>,
    },
    Hint {
        algorithm: Arc<dyn HintShardingAlgorithm>,
    },
    None,
}

impl ShardingStrategy {
    /// Resolves a strategy configuration against the algorithm registry.
    pub fn from_config(config: &StrategyConfig, registry: &AlgorithmRegistry) -> ShardingResult<Self> {
        let lookup = |name: &str| {
            registry.get(name).cloned().ok_or_else(|| {
                ShardingError::config(format!("sharding algorithm '{name}' is not defined"))
            })
        };
        match config {
            StrategyConfig::None => Ok(Self::None),
            StrategyConfig::Standard {
                sharding_column,
                algorithm,
            } => match lookup(algorithm)? {
                ShardingAlgorithm::Standard(algorithm) => Ok(Self::Standard {
                    column: sharding_column.clone(),
                    algorithm,
                }),
                other => Err(mismatch("standard", algorithm, &other)),
            },
            StrategyConfig::Complex {
                sharding_columns,
                algorithm,
            } => match lookup(algorithm)? {
                ShardingAlgorithm::Complex(algorithm) => Ok(Self::Complex {
                    columns: sharding_columns
                        .split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect(),
                    algorithm,
                }),
                other => Err(mismatch("complex", algorithm, &other)),
            },
            StrategyConfig::Hint { algorithm } => match lookup(algorithm)? {
                ShardingAlgorithm::Hint(algorithm) => Ok(Self::Hint { algorithm }),
                other => Err(mismatch("hint", algorithm, &other)),
            },
        }
    }

    pub fn sharding_columns(&self) -> Vec<&str> {
        match self {
            Self::Standard { column, .. } => vec![column.as_str()],
            Self::Complex { columns, .. } => columns.iter().map(String::as_str).collect(),
            Self::Hint { .. } | Self::None => Vec::new(),
        }
    }

    /// Picks targets for one logic table.
    ///
    /// `values` are the condition values of that table; `hint_values` feed
    /// hint strategies only. Without usable values every target is returned.
    /// The result keeps the order of `targets`.
    pub fn do_sharding(
        &self,
        targets: &[String],
        logic_table: &str,
        values: &[&ShardingConditionValue],
        hint_values: &[Value],
    ) -> ShardingResult<Vec<String>> {
        let routed = match self {
            Self::None => return Ok(targets.to_vec()),
            Self::Standard { column, algorithm } => {
                let Some(value) = values.iter().find(|v| v.column.eq_ignore_ascii_case(column)) else {
                    return Ok(targets.to_vec());
                };
                standard_sharding(algorithm.as_ref(), targets, logic_table, column, &value.operand)?
            }
            Self::Complex { columns, algorithm } => {
                let mut complex = ComplexShardingValues {
                    logic_table: logic_table.to_string(),
                    ..Default::default()
                };
                for value in values {
                    let Some(column) = columns.iter().find(|c| c.eq_ignore_ascii_case(&value.column))
                    else {
                        continue;
                    };
                    match &value.operand {
                        ConditionOperand::List(list) => {
                            complex.column_values.insert(column.clone(), list.clone());
                        }
                        ConditionOperand::Range(range) => {
                            complex.column_ranges.insert(column.clone(), range.clone());
                        }
                    }
                }
                if complex.column_values.is_empty() && complex.column_ranges.is_empty() {
                    return Ok(targets.to_vec());
                }
                algorithm.do_sharding(targets, &complex)?
            }
            Self::Hint { algorithm } => {
                if hint_values.is_empty() {
                    return Ok(targets.to_vec());
                }
                algorithm.do_sharding(targets, logic_table, hint_values)?
            }
        };
        self.validate(targets, logic_table, routed)
    }

    fn validate(
        &self,
        targets: &[String],
        logic_table: &str,
        routed: Vec<String>,
    ) -> ShardingResult<Vec<String>> {
        if let Some(stray) = routed.iter().find(|r| !targets.contains(r)) {
            return Err(ShardingError::RoutingFailure {
                logic_table: logic_table.to_string(),
                sharding_column: self.sharding_columns().first().map(|c| c.to_string()),
                attempted_value: None,
                message: format!(
                    "sharding algorithm returned '{stray}', which is not among the configured targets [{}]",
                    targets.join(", ")
                ),
            });
        }
        Ok(targets
            .iter()
            .filter(|t| routed.contains(t))
            .cloned()
            .collect())
    }
}

fn standard_sharding(
    algorithm: &dyn StandardShardingAlgorithm,
    targets: &[String],
    logic_table: &str,
    column: &str,
    operand: &ConditionOperand,
) -> ShardingResult<Vec<String>> {
    match operand {
        ConditionOperand::List(list) => {
            let mut result = Vec::with_capacity(list.len());
            for value in list {
                let precise = PreciseShardingValue {
                    logic_table,
                    column,
                    value,
                };
                match algorithm.do_sharding(targets, &precise)? {
                    Some(target) => {
                        if !result.contains(&target) {
                            result.push(target);
                        }
                    }
                    None => {
                        return Err(ShardingError::routing_value(
                            logic_table,
                            column,
                            value,
                            format!("{} sharding matched no configured target", algorithm.type_name()),
                        ))
                    }
                }
            }
            Ok(result)
        }
        ConditionOperand::Range(range) => algorithm.do_range_sharding(
            targets,
            &RangeShardingValue {
                logic_table,
                column,
                range,
            },
        ),
    }
}

fn mismatch(expected: &str, name: &str, found: &ShardingAlgorithm) -> ShardingError {
    ShardingError::config(format!(
        "{expected} strategy references algorithm '{name}' of incompatible type {}",
        found.type_name()
    ))
}

// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the sharding core
//!
//! Routing, rewriting and merging failures are all mapped to this single
//! error type so callers get consistent diagnostics regardless of the stage
//! that failed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all sharding operations
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ShardingError {
    #[error("Routing failed for table '{logic_table}': {message}")]
    RoutingFailure {
        logic_table: String,
        sharding_column: Option<String>,
        attempted_value: Option<String>,
        message: String,
    },

    #[error("Rewrite failed: {message}")]
    RewriteFailure { message: String },

    #[error("Merge failed: {message}")]
    MergeFailure {
        column: Option<String>,
        message: String,
    },

    #[error("Invalid sharding configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Result cursor error: {message}")]
    CursorFailure { message: String },

    #[error("Key generation failed ({generator}): {message}")]
    KeyGenerationFailure { generator: String, message: String },
}

impl ShardingError {
    pub fn routing(logic_table: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::RoutingFailure {
            logic_table: logic_table.into(),
            sharding_column: None,
            attempted_value: None,
            message: msg.into(),
        }
    }

    /// Routing failure that names the sharding column and the value that
    /// could not be routed.
    pub fn routing_value(
        logic_table: impl Into<String>,
        column: impl Into<String>,
        value: impl ToString,
        msg: impl Into<String>,
    ) -> Self {
        Self::RoutingFailure {
            logic_table: logic_table.into(),
            sharding_column: Some(column.into()),
            attempted_value: Some(value.to_string()),
            message: msg.into(),
        }
    }

    pub fn rewrite(msg: impl Into<String>) -> Self {
        Self::RewriteFailure { message: msg.into() }
    }

    pub fn merge(msg: impl Into<String>) -> Self {
        Self::MergeFailure {
            column: None,
            message: msg.into(),
        }
    }

    pub fn merge_column(column: impl Into<String>, msg: impl Into<String>) -> Self {
        let column = column.into();
        Self::MergeFailure {
            message: format!("column '{}': {}", column, msg.into()),
            column: Some(column),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration { message: msg.into() }
    }

    pub fn cursor(msg: impl Into<String>) -> Self {
        Self::CursorFailure { message: msg.into() }
    }

    pub fn key_generation(generator: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::KeyGenerationFailure {
            generator: generator.into(),
            message: msg.into(),
        }
    }

    /// Routing, rewriting and configuration failures are pure functions of
    /// their inputs. Cursor failures and key generation (a clock that has
    /// not caught up yet) may succeed on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CursorFailure { .. } | Self::KeyGenerationFailure { .. })
    }
}

/// Result type alias for sharding operations
pub type ShardingResult<T> = Result<T, ShardingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_failure_carries_diagnostics() {
        let err = ShardingError::routing_value("t_order", "order_id", 7, "no target");
        match &err {
            ShardingError::RoutingFailure {
                logic_table,
                sharding_column,
                attempted_value,
                ..
            } => {
                assert_eq!(logic_table, "t_order");
                assert_eq!(sharding_column.as_deref(), Some("order_id"));
                assert_eq!(attempted_value.as_deref(), Some("7"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("t_order"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn merge_column_names_the_column() {
        let err = ShardingError::merge_column("price", "not comparable");
        assert_eq!(err.to_string(), "Merge failed: column 'price': not comparable");
    }

    #[test]
    fn key_generation_failure_is_retryable() {
        let err = ShardingError::key_generation("SNOWFLAKE", "clock moved backwards by 900ms");
        assert_eq!(
            err.to_string(),
            "Key generation failed (SNOWFLAKE): clock moved backwards by 900ms"
        );
        assert!(err.is_retryable());
        assert!(!ShardingError::config("bad").is_retryable());
    }

    #[test]
    fn errors_serialize_for_transport() {
        let err = ShardingError::rewrite("tokens overlap");
        let json = serde_json::to_string(&err).unwrap();
        let back: ShardingError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}

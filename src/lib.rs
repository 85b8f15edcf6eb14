// SPDX-License-Identifier: Apache-2.0

//! shardline
//!
//! Routes logical SQL statements over sharded physical tables, rewrites them
//! once per target shard, and merges the shard results back into a single
//! logical cursor.
//!
//! Parsing and execution stay outside: callers hand in bound statement
//! contexts and get back execution units, then return one
//! [`QueryResult`] per unit for merging.

pub mod config;
pub mod kernel;
pub mod merge;
pub mod observability;
pub mod rewrite;
pub mod route;
pub mod rule;
pub mod statement;

pub use shardline_core::{
    MemoryQueryResult, QueryResult, ShardingError, ShardingResult, Value, ValueFamily, ValueKey, ValueType,
};

pub use config::ShardingRuleConfig;
pub use kernel::{ExecutionContext, ShardingKernel};
pub use merge::{MergeContext, MergeEngine, ShardingMergedResult};
pub use rewrite::{ExecutionUnit, SqlRewriteEngine, SqlUnit};
pub use route::{HintContext, RouteContext, RouteUnit, ShardingRouter};
pub use rule::ShardingRule;
pub use statement::StatementContext;

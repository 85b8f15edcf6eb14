// SPDX-License-Identifier: Apache-2.0

//! Shared types for the shardline sharding core.
//!
//! Everything the routing, rewriting and merging layers exchange with the
//! outside world lives here: the SQL value model, the forward-only result
//! cursor contract, and the unified error type.

pub mod cursor;
pub mod error;
pub mod value;

pub use cursor::{MemoryQueryResult, QueryResult};
pub use error::{ShardingError, ShardingResult};
pub use value::{Value, ValueFamily, ValueKey, ValueType};

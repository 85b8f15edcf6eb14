// SPDX-License-Identifier: Apache-2.0

//! Rewrite Engine
//!
//! Produces one SQL text and parameter list per route unit by applying
//! position-anchored tokens to the original SQL.

pub mod engine;
pub mod generator;
pub mod parameter;
pub mod token;

pub use engine::{ExecutionUnit, SqlRewriteEngine, SqlUnit};
pub use parameter::ParameterRewriter;
pub use token::SqlToken;

// SPDX-License-Identifier: Apache-2.0

//! Rewrites the logical SQL once per route unit.

use serde::Serialize;
use shardline_core::{ShardingResult, Value};
use tracing::{instrument, trace};

use super::generator::SqlTokenGenerator;
use super::token::{apply_tokens, sort_and_validate};
use crate::route::{RouteContext, RouteUnit};
use crate::rule::ShardingRule;
use crate::statement::StatementContext;

/// SQL text and parameters for one physical execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlUnit {
    pub sql: String,
    pub parameters: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionUnit {
    pub data_source: String,
    pub route_unit: RouteUnit,
    pub sql_unit: SqlUnit,
}

pub struct SqlRewriteEngine<'a> {
    rule: &'a ShardingRule,
}

impl<'a> SqlRewriteEngine<'a> {
    pub fn new(rule: &'a ShardingRule) -> Self {
        Self { rule }
    }

    #[instrument(skip_all, fields(units = route.len()))]
    pub fn rewrite(
        &self,
        sql: &str,
        params: &[Value],
        statement: &StatementContext,
        route: &RouteContext,
    ) -> ShardingResult<Vec<ExecutionUnit>> {
        let plan = SqlTokenGenerator::new(self.rule).generate(statement, route, params)?;
        let sorted = sort_and_validate(sql, &plan.tokens)?;
        trace!(tokens = sorted.len(), "SQL tokens generated");

        let mut units = Vec::with_capacity(route.len());
        for unit in route.units() {
            let mut parameters = params.to_vec();
            for rewriter in &plan.parameter_rewriters {
                parameters = rewriter.rewrite(parameters, unit)?;
            }
            units.push(ExecutionUnit {
                data_source: unit.data_source.to_string(),
                route_unit: unit.clone(),
                sql_unit: SqlUnit {
                    sql: apply_tokens(sql, &sorted, unit),
                    parameters,
                },
            });
        }
        Ok(units)
    }
}

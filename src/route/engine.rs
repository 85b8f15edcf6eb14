// SPDX-License-Identifier: Apache-2.0

//! Route strategy selection and post-route checks.

use shardline_core::{ShardingError, ShardingResult, Value};
use tracing::{debug, instrument};

use super::broadcast::{database_broadcast, table_broadcast};
use super::cartesian::CartesianRoute;
use super::condition::{ConditionOperand, ShardingConditionEngine, ShardingConditionValue, ShardingConditions};
use super::hint::HintContext;
use super::standard::StandardRoute;
use super::unicast::unicast;
use super::{RouteContext, RouteStrategy, RouteUnit, TableUnit};
use crate::rule::ShardingRule;
use crate::statement::{StatementContext, UpdateStatement};

pub struct ShardingRouter<'a> {
    rule: &'a ShardingRule,
}

impl<'a> ShardingRouter<'a> {
    pub fn new(rule: &'a ShardingRule) -> Self {
        Self { rule }
    }

    #[instrument(skip_all, fields(kind = ?statement.kind()))]
    pub fn route(
        &self,
        statement: &StatementContext,
        params: &[Value],
        hint: &HintContext,
    ) -> ShardingResult<RouteContext> {
        let tables = statement.table_names();
        let context = match statement {
            StatementContext::Session => database_broadcast(self.rule, &[]),
            StatementContext::Ddl(_) => self.route_ddl(&tables)?,
            StatementContext::Metadata { .. } => unicast(self.rule, &tables)?,
            _ => self.route_dml(statement, &tables, params, hint)?,
        };
        debug!(
            strategy = %context.strategy(),
            units = context.len(),
            "Statement routed"
        );
        Ok(context)
    }

    fn route_ddl(&self, tables: &[String]) -> ShardingResult<RouteContext> {
        if tables.iter().any(|t| self.rule.is_sharding_table(t)) {
            return Ok(table_broadcast(self.rule, tables));
        }
        if tables.iter().all(|t| self.rule.is_broadcast_table(t)) {
            return Ok(database_broadcast(self.rule, tables));
        }
        self.route_default(tables)
    }

    fn route_dml(
        &self,
        statement: &StatementContext,
        tables: &[String],
        params: &[Value],
        hint: &HintContext,
    ) -> ShardingResult<RouteContext> {
        if self.rule.all_broadcast(tables) {
            return match statement {
                StatementContext::Select(_) => unicast(self.rule, tables),
                _ => Ok(database_broadcast(self.rule, tables)),
            };
        }
        if tables.is_empty() {
            return unicast(self.rule, tables);
        }

        let conditions = ShardingConditionEngine::new(self.rule).create(statement, params, hint)?;
        if conditions.is_always_false() {
            return unicast(self.rule, tables);
        }

        let (sharding, others): (Vec<String>, Vec<String>) =
            tables.iter().cloned().partition(|t| self.rule.is_sharding_table(t));
        if sharding.is_empty() {
            return self.route_default(tables);
        }
        if let Some(single) = others.iter().find(|t| !self.rule.is_broadcast_table(t)) {
            return Err(ShardingError::routing(
                single.as_str(),
                format!(
                    "table is not configured and cannot be joined with sharding tables [{}]",
                    sharding.join(", ")
                ),
            ));
        }

        let context = self.route_sharding(&sharding, &conditions, &others, hint)?;
        match statement {
            StatementContext::Insert(insert) => check_insert_rows(&insert.table.name, &context)?,
            StatementContext::Update(update) => {
                self.check_sharding_value_update(update, &sharding, &conditions, params, hint, &context)?
            }
            _ => {}
        }
        Ok(context)
    }

    fn route_sharding(
        &self,
        sharding: &[String],
        conditions: &ShardingConditions,
        broadcast: &[String],
        hint: &HintContext,
    ) -> ShardingResult<RouteContext> {
        if sharding.len() == 1 || self.rule.all_binding(sharding) {
            StandardRoute::new(self.rule, hint).route(sharding, conditions, broadcast)
        } else {
            CartesianRoute::new(self.rule, hint).route(sharding, conditions, broadcast)
        }
    }

    /// Unconfigured tables go, under their own names, to the default data
    /// source.
    fn route_default(&self, tables: &[String]) -> ShardingResult<RouteContext> {
        let data_source = match (self.rule.default_data_source(), self.rule.data_source_names()) {
            (Some(ds), _) => ds.to_string(),
            (None, [only]) => only.clone(),
            (None, _) => {
                let table = tables
                    .iter()
                    .find(|t| !self.rule.is_broadcast_table(t))
                    .map(String::as_str)
                    .unwrap_or_default();
                return Err(ShardingError::routing(
                    table,
                    "table is not configured and no default data source exists",
                ));
            }
        };
        let mut context = RouteContext::new(RouteStrategy::DefaultDataSource);
        context.add_unit(RouteUnit::new(
            data_source,
            tables.iter().map(|t| TableUnit::same(t)).collect(),
        ));
        Ok(context)
    }

    /// A SET of a sharding column may only keep the row on its data nodes.
    fn check_sharding_value_update(
        &self,
        update: &UpdateStatement,
        sharding: &[String],
        conditions: &ShardingConditions,
        params: &[Value],
        hint: &HintContext,
        routed: &RouteContext,
    ) -> ShardingResult<()> {
        for assignment in &update.assignments {
            let Some(table) = sharding
                .iter()
                .find(|t| self.rule.is_sharding_column(t, &assignment.column))
            else {
                continue;
            };
            let refuse = |message: String, value: Option<&Value>| ShardingError::RoutingFailure {
                logic_table: table.clone(),
                sharding_column: Some(assignment.column.clone()),
                attempted_value: value.map(|v| v.to_string()),
                message,
            };
            let value = match assignment.value.resolve(params) {
                Ok(Some(value)) => value,
                Ok(None) => {
                    return Err(refuse(
                        "sharding column cannot be updated to an expression".to_string(),
                        None,
                    ))
                }
                Err(missing) => {
                    return Err(refuse(
                        format!("parameter marker {} has no bound parameter", missing.0 + 1),
                        None,
                    ))
                }
            };
            let moved = conditions.with_override(ShardingConditionValue {
                table: table.clone(),
                column: assignment.column.clone(),
                operand: ConditionOperand::List(vec![value.clone()]),
            });
            let target = self.route_sharding(sharding, &moved, &[], hint)?;
            if target.data_nodes() != routed.data_nodes() {
                return Err(refuse(
                    "update would move rows to a different data node".to_string(),
                    Some(&value),
                ));
            }
        }
        Ok(())
    }
}

fn check_insert_rows(table: &str, context: &RouteContext) -> ShardingResult<()> {
    for (row, nodes) in context.original_data_nodes().iter().enumerate() {
        if nodes.len() != 1 {
            return Err(ShardingError::routing(
                table,
                format!(
                    "insert row {} routes to {} data nodes instead of exactly one",
                    row + 1,
                    nodes.len()
                ),
            ));
        }
    }
    Ok(())
}

// SPDX-License-Identifier: Apache-2.0

//! Cartesian routing for joins across tables that are not bound together.

use shardline_core::{ShardingError, ShardingResult};

use super::condition::ShardingConditions;
use super::hint::HintContext;
use super::standard::StandardRoute;
use super::{RouteContext, RouteStrategy, RouteUnit, TableUnit};
use crate::rule::ShardingRule;

pub struct CartesianRoute<'a> {
    rule: &'a ShardingRule,
    hint: &'a HintContext,
}

impl<'a> CartesianRoute<'a> {
    pub fn new(rule: &'a ShardingRule, hint: &'a HintContext) -> Self {
        Self { rule, hint }
    }

    pub fn route(
        &self,
        tables: &[String],
        conditions: &ShardingConditions,
        companions: &[String],
    ) -> ShardingResult<RouteContext> {
        let standard = StandardRoute::new(self.rule, self.hint);
        let mut results = Vec::new();
        for group in self.group_tables(tables) {
            let group_conditions = conditions_for(conditions, &group);
            results.push(standard.route(&group, &group_conditions, &[])?);
        }

        let common: Vec<&str> = match results.split_first() {
            Some((first, rest)) => first
                .data_source_names()
                .into_iter()
                .filter(|ds| rest.iter().all(|r| r.data_source_names().contains(ds)))
                .collect(),
            None => Vec::new(),
        };
        if common.is_empty() {
            return Err(ShardingError::routing(
                tables.join(", "),
                "cartesian routing found no data source shared by all tables",
            ));
        }

        let mut context = RouteContext::new(RouteStrategy::Cartesian);
        for data_source in common {
            let mut combinations: Vec<Vec<TableUnit>> = vec![Vec::new()];
            for result in &results {
                let groups: Vec<&[TableUnit]> = result
                    .units()
                    .iter()
                    .filter(|u| u.data_source == data_source)
                    .map(RouteUnit::table_units)
                    .collect();
                combinations = combinations
                    .into_iter()
                    .flat_map(|prefix| {
                        groups.iter().map(move |group| {
                            let mut combined = prefix.clone();
                            combined.extend_from_slice(group);
                            combined
                        })
                    })
                    .collect();
            }
            for mut units in combinations {
                units.extend(companions.iter().map(|t| TableUnit::same(t)));
                context.add_unit(RouteUnit::new(data_source, units));
            }
        }
        Ok(context)
    }

    /// Splits tables into binding groups and single tables, in order.
    fn group_tables(&self, tables: &[String]) -> Vec<Vec<String>> {
        let mut groups: Vec<Vec<String>> = Vec::new();
        for table in tables {
            if groups.iter().flatten().any(|t| t.eq_ignore_ascii_case(table)) {
                continue;
            }
            let group = match self.rule.binding_group(table) {
                Some(binding) => tables.iter().filter(|t| binding.contains(t)).cloned().collect(),
                None => vec![table.clone()],
            };
            groups.push(group);
        }
        groups
    }
}

/// Keeps only the values that concern `tables`.
fn conditions_for(conditions: &ShardingConditions, tables: &[String]) -> ShardingConditions {
    let mut filtered = conditions.clone();
    filtered.retain_tables(tables);
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShardingRuleConfig;
    use crate::route::condition::ShardingConditionEngine;
    use crate::statement::{ColumnPredicate, SelectStatement, StatementContext, TableSegment, WhereSegment};
    use shardline_core::Value;

    fn rule() -> ShardingRule {
        let config = ShardingRuleConfig::from_json_str(
            r#"{
            "data_sources": ["ds_0", "ds_1", "ds_2"],
            "tables": [
                { "logic_table": "t_user", "actual_data_nodes": "ds_${0..1}.t_user" },
                { "logic_table": "t_account", "actual_data_nodes": "ds_0.t_account, ds_2.t_account" },
                { "logic_table": "t_audit", "actual_data_nodes": "ds_1.t_audit, ds_2.t_audit" }
            ]
        }"#,
        )
        .unwrap();
        ShardingRule::from_config(&config).unwrap()
    }

    fn select(tables: &[&str]) -> StatementContext {
        StatementContext::Select(SelectStatement {
            tables: tables.iter().map(|t| TableSegment::new(*t, 0)).collect(),
            ..Default::default()
        })
    }

    #[test]
    fn keeps_only_shared_data_sources() {
        let rule = rule();
        let hint = HintContext::new();
        let stmt = select(&["t_user", "t_account"]);
        let conditions = ShardingConditionEngine::new(&rule).create(&stmt, &[], &hint).unwrap();
        let tables = stmt.table_names();
        let context = CartesianRoute::new(&rule, &hint).route(&tables, &conditions, &[]).unwrap();
        assert_eq!(context.data_source_names(), vec!["ds_0"]);
        assert_eq!(context.len(), 1);
        assert_eq!(context.units()[0].actual_table("t_account"), Some("t_account"));
    }

    #[test]
    fn disjoint_data_sources_fail() {
        let rule = rule();
        let hint = HintContext::new();
        let stmt = select(&["t_user", "t_account", "t_audit"]);
        let conditions = ShardingConditionEngine::new(&rule).create(&stmt, &[], &hint).unwrap();
        let err = CartesianRoute::new(&rule, &hint)
            .route(&stmt.table_names(), &conditions, &[])
            .unwrap_err();
        assert!(matches!(err, ShardingError::RoutingFailure { .. }));
    }

    #[test]
    fn multiplies_table_units_per_data_source() {
        let config = ShardingRuleConfig::from_json_str(
            r#"{
            "data_sources": ["ds_0"],
            "tables": [
                {
                    "logic_table": "t_order",
                    "actual_data_nodes": "ds_0.t_order_${0..1}",
                    "table_strategy": { "type": "standard", "sharding_column": "order_id", "algorithm": "order_mod" }
                },
                {
                    "logic_table": "t_user",
                    "actual_data_nodes": "ds_0.t_user_${0..1}",
                    "table_strategy": { "type": "standard", "sharding_column": "user_id", "algorithm": "user_mod" }
                }
            ],
            "sharding_algorithms": {
                "order_mod": { "type": "MOD", "props": { "sharding-count": 2 } },
                "user_mod": { "type": "MOD", "props": { "sharding-count": 2 } }
            }
        }"#,
        )
        .unwrap();
        let rule = ShardingRule::from_config(&config).unwrap();
        let hint = HintContext::new();
        let stmt = StatementContext::Select(SelectStatement {
            tables: vec![TableSegment::new("t_order", 14), TableSegment::new("t_user", 27)],
            where_segment: Some(WhereSegment::and(vec![
                ColumnPredicate::equal("user_id", Value::Int(3)).with_owner("t_user"),
            ])),
            ..Default::default()
        });
        let conditions = ShardingConditionEngine::new(&rule).create(&stmt, &[], &hint).unwrap();
        let context = CartesianRoute::new(&rule, &hint)
            .route(&stmt.table_names(), &conditions, &[])
            .unwrap();
        assert_eq!(context.len(), 2);
        assert!(context.units().iter().all(|u| u.actual_table("t_user") == Some("t_user_1")));
    }
}

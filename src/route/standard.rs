// SPDX-License-Identifier: Apache-2.0

//! Standard routing of one sharding table or one binding group.

use shardline_core::{ShardingError, ShardingResult};

use super::condition::{ShardingConditionValue, ShardingConditions};
use super::hint::HintContext;
use super::{RouteContext, RouteStrategy, RouteUnit, TableUnit};
use crate::rule::binding::BindingTableGroup;
use crate::rule::table_rule::TableRule;
use crate::rule::{DataNode, ShardingRule};

pub struct StandardRoute<'a> {
    rule: &'a ShardingRule,
    hint: &'a HintContext,
}

impl<'a> StandardRoute<'a> {
    pub fn new(rule: &'a ShardingRule, hint: &'a HintContext) -> Self {
        Self { rule, hint }
    }

    /// Routes `tables`, which are a single sharding table or members of one
    /// binding group. `companions` (broadcast tables) join every unit under
    /// their own name.
    pub fn route(
        &self,
        tables: &[String],
        conditions: &ShardingConditions,
        companions: &[String],
    ) -> ShardingResult<RouteContext> {
        let driving = self.driving_table(tables, conditions)?;
        let driving_rule = self.rule.table_rule(driving)?;

        let mut per_condition: Vec<Vec<DataNode>> = Vec::new();
        if conditions.is_empty() {
            per_condition.push(self.route_nodes(driving_rule, &[])?);
        } else {
            for condition in conditions.conditions() {
                if condition.is_always_false() {
                    per_condition.push(Vec::new());
                    continue;
                }
                per_condition.push(self.route_nodes(driving_rule, &condition.values_for(driving))?);
            }
        }

        let mut context = RouteContext::new(RouteStrategy::Standard);
        for node in per_condition.iter().flatten() {
            let mut units = vec![TableUnit::new(driving_rule.logic_table(), node.table.clone())];
            for table in tables.iter().filter(|t| !t.eq_ignore_ascii_case(driving)) {
                let bound = self.rule.table_rule(table)?;
                let actual = BindingTableGroup::binding_actual_table(
                    driving_rule,
                    bound,
                    &node.data_source,
                    &node.table,
                )?;
                units.push(TableUnit::new(bound.logic_table(), actual));
            }
            units.extend(companions.iter().map(|t| TableUnit::same(t)));
            context.add_unit(RouteUnit::new(node.data_source.clone(), units));
        }
        context.set_original_data_nodes(per_condition);
        Ok(context)
    }

    fn driving_table<'t>(
        &self,
        tables: &'t [String],
        conditions: &ShardingConditions,
    ) -> ShardingResult<&'t str> {
        let first = conditions
            .first_table()
            .and_then(|t| tables.iter().find(|name| name.eq_ignore_ascii_case(t)))
            .or_else(|| tables.first());
        first
            .map(String::as_str)
            .ok_or_else(|| ShardingError::routing("", "standard routing needs at least one table"))
    }

    /// Data nodes of one table for one condition: database strategy first,
    /// then the table strategy on each routed data source.
    pub fn route_nodes(
        &self,
        table_rule: &TableRule,
        values: &[&ShardingConditionValue],
    ) -> ShardingResult<Vec<DataNode>> {
        let logic_table = table_rule.logic_table();
        let data_sources = self.rule.database_strategy(table_rule).do_sharding(
            &table_rule.data_source_names(),
            logic_table,
            values,
            self.hint.database_values(logic_table),
        )?;
        if data_sources.is_empty() {
            return Err(ShardingError::routing(logic_table, "no data source resolves for this table"));
        }

        let table_strategy = self.rule.table_strategy(table_rule);
        let mut nodes = Vec::new();
        for data_source in &data_sources {
            let tables = table_strategy.do_sharding(
                table_rule.actual_tables(data_source),
                logic_table,
                values,
                self.hint.table_values(logic_table),
            )?;
            if tables.is_empty() {
                return Err(ShardingError::routing(
                    logic_table,
                    format!("no actual table resolves on data source '{data_source}'"),
                ));
            }
            for table in tables {
                if !table_rule.contains_node(data_source, &table) {
                    return Err(ShardingError::routing(
                        logic_table,
                        format!("routed data node '{data_source}.{table}' is not configured"),
                    ));
                }
                nodes.push(DataNode::new(data_source.as_str(), table));
            }
        }
        Ok(nodes)
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Broadcast routing: every data source, or every actual data node.

use super::{RouteContext, RouteStrategy, RouteUnit, TableUnit};
use crate::rule::ShardingRule;

/// One unit per data source; tables keep their own names.
pub fn database_broadcast(rule: &ShardingRule, tables: &[String]) -> RouteContext {
    let mut context = RouteContext::new(RouteStrategy::DatabaseBroadcast);
    for data_source in rule.data_source_names() {
        let units = tables.iter().map(|t| TableUnit::same(t)).collect();
        context.add_unit(RouteUnit::new(data_source.as_str(), units));
    }
    context
}

/// One unit per actual data node of each sharding table. Broadcast tables
/// get a unit on every data source.
pub fn table_broadcast(rule: &ShardingRule, tables: &[String]) -> RouteContext {
    let mut context = RouteContext::new(RouteStrategy::TableBroadcast);
    for table in tables {
        match rule.find_table_rule(table) {
            Some(table_rule) => {
                for node in table_rule.actual_data_nodes() {
                    context.add_unit(RouteUnit::new(
                        node.data_source.clone(),
                        vec![TableUnit::new(table_rule.logic_table(), node.table.clone())],
                    ));
                }
            }
            None if rule.is_broadcast_table(table) => {
                for data_source in rule.data_source_names() {
                    context.add_unit(RouteUnit::new(data_source.as_str(), vec![TableUnit::same(table)]));
                }
            }
            None => {}
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::fixtures::order_rule;

    #[test]
    fn database_broadcast_covers_every_data_source() {
        let context = database_broadcast(&order_rule(), &["t_config".to_string()]);
        assert_eq!(context.len(), 2);
        assert_eq!(context.units()[1].actual_table("t_config"), Some("t_config"));
    }

    #[test]
    fn table_broadcast_covers_every_data_node() {
        let context = table_broadcast(&order_rule(), &["t_order".to_string()]);
        assert_eq!(context.len(), 4);
        assert_eq!(context.strategy(), RouteStrategy::TableBroadcast);
        assert_eq!(context.data_nodes().len(), 4);
    }
}

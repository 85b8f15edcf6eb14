// SPDX-License-Identifier: Apache-2.0

//! Unicast routing: a single unit that can serve every referenced table.

use shardline_core::{ShardingError, ShardingResult};

use super::{RouteContext, RouteStrategy, RouteUnit, TableUnit};
use crate::rule::ShardingRule;

/// Picks the lowest-sorted data source holding every table.
pub fn unicast(rule: &ShardingRule, tables: &[String]) -> ShardingResult<RouteContext> {
    let mut candidates: Vec<String> = rule.data_source_names().to_vec();
    candidates.sort();
    for table in tables {
        let available = available_data_sources(rule, table)?;
        candidates.retain(|ds| available.contains(ds));
    }
    let Some(data_source) = candidates.into_iter().next() else {
        return Err(ShardingError::routing(
            tables.join(", "),
            "no single data source holds every referenced table",
        ));
    };

    let mut units = Vec::with_capacity(tables.len());
    for table in tables {
        let actual = match rule.find_table_rule(table) {
            Some(table_rule) => table_rule
                .actual_tables(&data_source)
                .first()
                .cloned()
                .ok_or_else(|| {
                    ShardingError::routing(
                        table.as_str(),
                        format!("no actual table on data source '{data_source}'"),
                    )
                })?,
            None => table.clone(),
        };
        units.push(TableUnit::new(table.as_str(), actual));
    }

    let mut context = RouteContext::new(RouteStrategy::Unicast);
    context.add_unit(RouteUnit::new(data_source, units));
    Ok(context)
}

fn available_data_sources(rule: &ShardingRule, table: &str) -> ShardingResult<Vec<String>> {
    if let Some(table_rule) = rule.find_table_rule(table) {
        return Ok(table_rule.data_source_names());
    }
    if rule.is_broadcast_table(table) {
        return Ok(rule.data_source_names().to_vec());
    }
    match (rule.default_data_source(), rule.data_source_names()) {
        (Some(ds), _) => Ok(vec![ds.to_string()]),
        (None, [only]) => Ok(vec![only.clone()]),
        (None, _) => Err(ShardingError::routing(
            table,
            "table is not configured and no default data source exists",
        )),
    }
}

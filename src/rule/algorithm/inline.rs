// SPDX-License-Identifier: Apache-2.0

use shardline_core::{ShardingError, ShardingResult};

use super::{
    required_string, AlgorithmProps, PreciseShardingValue, RangeShardingValue,
    StandardShardingAlgorithm,
};
use crate::rule::inline::InlineTemplate;

/// Target name computed from an inline template such as
/// `t_order_${order_id % 2}`.
#[derive(Debug, Clone)]
pub struct InlineShardingAlgorithm {
    template: InlineTemplate,
    allow_range_query: bool,
}

impl InlineShardingAlgorithm {
    pub fn new(template: InlineTemplate, allow_range_query: bool) -> Self {
        Self {
            template,
            allow_range_query,
        }
    }

    pub fn from_props(props: &AlgorithmProps, allow_range_query: bool) -> ShardingResult<Self> {
        let expression = required_string(props, "algorithm-expression")?;
        let allow = super::prop_string(props, "allow-range-query-with-inline-sharding")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(allow_range_query);
        Ok(Self::new(InlineTemplate::parse(&expression)?, allow))
    }
}

impl StandardShardingAlgorithm for InlineShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "INLINE"
    }

    fn do_sharding(
        &self,
        _targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> ShardingResult<Option<String>> {
        let column = value.column;
        let target = self
            .template
            .evaluate(&|var| var.eq_ignore_ascii_case(column).then(|| value.value.clone()))
            .map_err(|e| {
                ShardingError::routing_value(value.logic_table, column, value.value, e.to_string())
            })?;
        Ok(Some(target))
    }

    fn do_range_sharding(
        &self,
        targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> ShardingResult<Vec<String>> {
        if self.allow_range_query {
            return Ok(targets.to_vec());
        }
        Err(ShardingError::RoutingFailure {
            logic_table: value.logic_table.to_string(),
            sharding_column: Some(value.column.to_string()),
            attempted_value: None,
            message: format!(
                "range query on inline sharding expression '{}' requires allow_range_query_with_inline_sharding",
                self.template.source()
            ),
        })
    }
}

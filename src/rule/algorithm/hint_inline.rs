// SPDX-License-Identifier: Apache-2.0

use shardline_core::{ShardingResult, Value};

use super::{prop_string, AlgorithmProps, HintShardingAlgorithm};
use crate::rule::inline::InlineTemplate;

const DEFAULT_EXPRESSION: &str = "${value}";

/// Renders each hint value through a template bound to `value`.
#[derive(Debug, Clone)]
pub struct HintInlineShardingAlgorithm {
    template: InlineTemplate,
}

impl HintInlineShardingAlgorithm {
    pub fn new(template: InlineTemplate) -> Self {
        Self { template }
    }

    pub fn from_props(props: &AlgorithmProps) -> ShardingResult<Self> {
        let expression = prop_string(props, "algorithm-expression")
            .unwrap_or_else(|| DEFAULT_EXPRESSION.to_string());
        Ok(Self::new(InlineTemplate::parse(&expression)?))
    }
}

impl HintShardingAlgorithm for HintInlineShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "HINT_INLINE"
    }

    fn do_sharding(
        &self,
        _targets: &[String],
        _logic_table: &str,
        values: &[Value],
    ) -> ShardingResult<Vec<String>> {
        let mut result = Vec::new();
        for value in values {
            let target = self
                .template
                .evaluate(&|var| (var == "value").then(|| value.clone()))?;
            if !result.contains(&target) {
                result.push(target);
            }
        }
        Ok(result)
    }
}

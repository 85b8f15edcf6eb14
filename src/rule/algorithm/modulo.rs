// SPDX-License-Identifier: Apache-2.0

use shardline_core::{ShardingError, ShardingResult};

use super::{
    required_positive, target_with_suffix, AlgorithmProps, PreciseShardingValue,
    RangeShardingValue, StandardShardingAlgorithm,
};

/// `value mod sharding-count`, matched against target name suffixes.
#[derive(Debug, Clone)]
pub struct ModShardingAlgorithm {
    sharding_count: i64,
}

impl ModShardingAlgorithm {
    pub fn new(sharding_count: i64) -> Self {
        Self {
            sharding_count: sharding_count.max(1),
        }
    }

    pub fn from_props(props: &AlgorithmProps) -> ShardingResult<Self> {
        Ok(Self::new(required_positive(props, "sharding-count")?))
    }

    fn shard_index(&self, value: &PreciseShardingValue<'_>) -> ShardingResult<i64> {
        let v = value.value.as_i64().ok_or_else(|| {
            ShardingError::routing_value(
                value.logic_table,
                value.column,
                value.value,
                "MOD sharding needs an integer value",
            )
        })?;
        Ok(v.rem_euclid(self.sharding_count))
    }
}

impl StandardShardingAlgorithm for ModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "MOD"
    }

    fn do_sharding(
        &self,
        targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> ShardingResult<Option<String>> {
        Ok(target_with_suffix(targets, self.shard_index(value)?))
    }

    fn do_range_sharding(
        &self,
        targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> ShardingResult<Vec<String>> {
        let lower = value.range.lower_value().and_then(|v| v.as_i64());
        let upper = value.range.upper_value().and_then(|v| v.as_i64());
        let (Some(lower), Some(upper)) = (lower, upper) else {
            return Ok(targets.to_vec());
        };
        if upper.saturating_sub(lower) >= self.sharding_count - 1 {
            return Ok(targets.to_vec());
        }
        let mut result = Vec::new();
        for v in lower..=upper {
            if !value.range.contains(&v.into()) {
                continue;
            }
            if let Some(target) = target_with_suffix(targets, v.rem_euclid(self.sharding_count)) {
                if !result.contains(&target) {
                    result.push(target);
                }
            }
        }
        Ok(result)
    }
}

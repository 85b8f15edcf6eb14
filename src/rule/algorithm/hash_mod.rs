// SPDX-License-Identifier: Apache-2.0

use shardline_core::{ShardingResult, Value};

use super::{
    required_positive, target_with_suffix, AlgorithmProps, PreciseShardingValue,
    RangeShardingValue, StandardShardingAlgorithm,
};

/// CRC32 of the value's canonical text, `mod sharding-count`.
///
/// Integral numbers hash identically whatever their representation, so
/// `1`, `1.0` and `'1'` land on the same shard.
#[derive(Debug, Clone)]
pub struct HashModShardingAlgorithm {
    sharding_count: i64,
}

impl HashModShardingAlgorithm {
    pub fn new(sharding_count: i64) -> Self {
        Self {
            sharding_count: sharding_count.max(1),
        }
    }

    pub fn from_props(props: &AlgorithmProps) -> ShardingResult<Self> {
        Ok(Self::new(required_positive(props, "sharding-count")?))
    }

    pub fn shard_index(&self, value: &Value) -> i64 {
        let canonical = match value.as_i64() {
            Some(v) if !matches!(value, Value::Bool(_)) => v.to_string(),
            _ => value.to_string(),
        };
        i64::from(crc32fast::hash(canonical.as_bytes())) % self.sharding_count
    }
}

impl StandardShardingAlgorithm for HashModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "HASH_MOD"
    }

    fn do_sharding(
        &self,
        targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> ShardingResult<Option<String>> {
        Ok(target_with_suffix(targets, self.shard_index(value.value)))
    }

    fn do_range_sharding(
        &self,
        targets: &[String],
        _value: &RangeShardingValue<'_>,
    ) -> ShardingResult<Vec<String>> {
        Ok(targets.to_vec())
    }
}

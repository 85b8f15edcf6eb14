// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use rust_decimal::Decimal;
use shardline_core::{ShardingError, ShardingResult, Value};

use super::{
    required_string, target_with_suffix, AlgorithmProps, PreciseShardingValue,
    RangeShardingValue, StandardShardingAlgorithm,
};

/// Partitions values by ascending boundaries.
///
/// With boundaries `[10, 20]`, values below 10 go to partition 0, values in
/// `[10, 20)` to partition 1, and values from 20 upward to partition 2.
#[derive(Debug, Clone)]
pub struct BoundaryRangeShardingAlgorithm {
    boundaries: Vec<Decimal>,
}

impl BoundaryRangeShardingAlgorithm {
    pub fn new(mut boundaries: Vec<Decimal>) -> Self {
        boundaries.sort();
        boundaries.dedup();
        Self { boundaries }
    }

    pub fn from_props(props: &AlgorithmProps) -> ShardingResult<Self> {
        let text = required_string(props, "sharding-ranges")?;
        let boundaries = text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Decimal::from_str(s).map_err(|_| {
                    ShardingError::config(format!("invalid sharding range boundary '{s}'"))
                })
            })
            .collect::<ShardingResult<Vec<_>>>()?;
        Ok(Self::new(boundaries))
    }

    pub fn partition(&self, value: Decimal) -> i64 {
        self.boundaries.iter().take_while(|b| **b <= value).count() as i64
    }

    fn decimal(value: &Value, logic_table: &str, column: &str) -> ShardingResult<Decimal> {
        value.to_decimal().ok_or_else(|| {
            ShardingError::routing_value(
                logic_table,
                column,
                value,
                "BOUNDARY_RANGE sharding needs a numeric value",
            )
        })
    }
}

impl StandardShardingAlgorithm for BoundaryRangeShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "BOUNDARY_RANGE"
    }

    fn do_sharding(
        &self,
        targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> ShardingResult<Option<String>> {
        let v = Self::decimal(value.value, value.logic_table, value.column)?;
        Ok(target_with_suffix(targets, self.partition(v)))
    }

    fn do_range_sharding(
        &self,
        targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> ShardingResult<Vec<String>> {
        let first = match value.range.lower_value() {
            Some(v) => self.partition(Self::decimal(v, value.logic_table, value.column)?),
            None => 0,
        };
        let last = match value.range.upper_value() {
            Some(v) => self.partition(Self::decimal(v, value.logic_table, value.column)?),
            None => self.boundaries.len() as i64,
        };
        Ok((first..=last)
            .filter_map(|p| target_with_suffix(targets, p))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::range::ValueRange;

    fn algorithm() -> BoundaryRangeShardingAlgorithm {
        BoundaryRangeShardingAlgorithm::new(vec![Decimal::from(10), Decimal::from(20)])
    }

    #[test]
    fn partitions_by_boundaries() {
        let a = algorithm();
        assert_eq!(a.partition(Decimal::from(3)), 0);
        assert_eq!(a.partition(Decimal::from(10)), 1);
        assert_eq!(a.partition(Decimal::from(19)), 1);
        assert_eq!(a.partition(Decimal::from(25)), 2);
    }

    #[test]
    fn ranges_cover_touched_partitions() {
        let targets: Vec<String> = (0..3).map(|i| format!("t_log_{i}")).collect();
        let range = ValueRange::closed(Value::Int(5), Value::Int(15));
        let routed = algorithm()
            .do_range_sharding(
                &targets,
                &RangeShardingValue {
                    logic_table: "t_log",
                    column: "id",
                    range: &range,
                },
            )
            .unwrap();
        assert_eq!(routed, vec!["t_log_0", "t_log_1"]);
    }
}

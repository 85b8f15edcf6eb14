// SPDX-License-Identifier: Apache-2.0

use std::ops::Bound;

use chrono::format::{Item, StrftimeItems};
use chrono::{Duration, Months, NaiveDate, NaiveDateTime};
use shardline_core::{ShardingError, ShardingResult, Value};

use super::{
    prop_i64, prop_string, required_string, AlgorithmProps, PreciseShardingValue,
    RangeShardingValue, StandardShardingAlgorithm,
};
use crate::rule::range::ValueRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntervalUnit {
    Days,
    Months,
    Years,
}

/// Time-based sharding: each interval of `datetime-interval-amount` units
/// starting at `datetime-lower` maps to the target whose name ends with the
/// interval start formatted by `sharding-suffix-pattern`.
///
/// Patterns use chrono's `strftime` syntax (`%Y-%m-%d %H:%M:%S`).
#[derive(Debug, Clone)]
pub struct IntervalShardingAlgorithm {
    datetime_pattern: String,
    lower: NaiveDateTime,
    upper: NaiveDateTime,
    suffix_pattern: String,
    amount: u32,
    unit: IntervalUnit,
}

impl IntervalShardingAlgorithm {
    pub fn from_props(props: &AlgorithmProps) -> ShardingResult<Self> {
        let datetime_pattern = required_string(props, "datetime-pattern")?;
        validate_pattern(&datetime_pattern, "datetime-pattern")?;
        let suffix_pattern = required_string(props, "sharding-suffix-pattern")?;
        validate_pattern(&suffix_pattern, "sharding-suffix-pattern")?;
        let lower = parse_datetime(&required_string(props, "datetime-lower")?, &datetime_pattern)
            .ok_or_else(|| ShardingError::config("datetime-lower does not match datetime-pattern"))?;
        let upper = parse_datetime(&required_string(props, "datetime-upper")?, &datetime_pattern)
            .ok_or_else(|| ShardingError::config("datetime-upper does not match datetime-pattern"))?;
        if upper < lower {
            return Err(ShardingError::config("datetime-upper is before datetime-lower"));
        }
        let amount = prop_i64(props, "datetime-interval-amount")?.unwrap_or(1);
        let amount = u32::try_from(amount)
            .ok()
            .filter(|a| *a > 0)
            .ok_or_else(|| ShardingError::config("datetime-interval-amount must be positive"))?;
        let unit = match prop_string(props, "datetime-interval-unit")
            .unwrap_or_else(|| "days".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "days" | "day" => IntervalUnit::Days,
            "months" | "month" => IntervalUnit::Months,
            "years" | "year" => IntervalUnit::Years,
            other => {
                return Err(ShardingError::config(format!(
                    "unsupported datetime-interval-unit '{other}'"
                )))
            }
        };
        Ok(Self {
            datetime_pattern,
            lower,
            upper,
            suffix_pattern,
            amount,
            unit,
        })
    }

    fn step(&self, start: NaiveDateTime) -> Option<NaiveDateTime> {
        match self.unit {
            IntervalUnit::Days => start.checked_add_signed(Duration::days(i64::from(self.amount))),
            IntervalUnit::Months => start.checked_add_months(Months::new(self.amount)),
            IntervalUnit::Years => start.checked_add_months(Months::new(self.amount.saturating_mul(12))),
        }
    }

    fn to_datetime(&self, value: &Value, table: &str, column: &str) -> ShardingResult<NaiveDateTime> {
        let parsed = match value {
            Value::Text(text) => parse_datetime(text, &self.datetime_pattern),
            other => other.as_datetime(),
        };
        parsed.ok_or_else(|| {
            ShardingError::routing_value(
                table,
                column,
                value,
                format!("value does not match datetime pattern '{}'", self.datetime_pattern),
            )
        })
    }

    /// Suffixes of every interval in `[lower, upper]` that intersects the
    /// given bounds.
    fn matching_suffixes(
        &self,
        from: Bound<NaiveDateTime>,
        to: Bound<NaiveDateTime>,
    ) -> Vec<String> {
        let mut suffixes = Vec::new();
        let mut start = self.lower;
        while start <= self.upper {
            let Some(end) = self.step(start) else {
                break;
            };
            let after_from = match from {
                Bound::Included(f) | Bound::Excluded(f) => end > f,
                Bound::Unbounded => true,
            };
            let before_to = match to {
                Bound::Included(t) => start <= t,
                Bound::Excluded(t) => start < t,
                Bound::Unbounded => true,
            };
            if after_from && before_to {
                let suffix = start.format(&self.suffix_pattern).to_string();
                if !suffixes.contains(&suffix) {
                    suffixes.push(suffix);
                }
            }
            start = end;
        }
        suffixes
    }

    fn targets_for(targets: &[String], suffixes: &[String]) -> Vec<String> {
        targets
            .iter()
            .filter(|t| suffixes.iter().any(|s| t.ends_with(s.as_str())))
            .cloned()
            .collect()
    }
}

fn validate_pattern(pattern: &str, key: &str) -> ShardingResult<()> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(ShardingError::config(format!("invalid {key} '{pattern}'")));
    }
    Ok(())
}

fn parse_datetime(text: &str, pattern: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, pattern)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, pattern)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl StandardShardingAlgorithm for IntervalShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "INTERVAL"
    }

    fn do_sharding(
        &self,
        targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> ShardingResult<Option<String>> {
        let at = self.to_datetime(value.value, value.logic_table, value.column)?;
        let suffixes = self.matching_suffixes(Bound::Included(at), Bound::Included(at));
        Ok(Self::targets_for(targets, &suffixes).into_iter().next())
    }

    fn do_range_sharding(
        &self,
        targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> ShardingResult<Vec<String>> {
        let ValueRange { lower, upper } = value.range;
        let convert = |bound: &Bound<Value>| -> ShardingResult<Bound<NaiveDateTime>> {
            Ok(match bound {
                Bound::Included(v) => {
                    Bound::Included(self.to_datetime(v, value.logic_table, value.column)?)
                }
                Bound::Excluded(v) => {
                    Bound::Excluded(self.to_datetime(v, value.logic_table, value.column)?)
                }
                Bound::Unbounded => Bound::Unbounded,
            })
        };
        let suffixes = self.matching_suffixes(convert(lower)?, convert(upper)?);
        Ok(Self::targets_for(targets, &suffixes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn monthly() -> IntervalShardingAlgorithm {
        let props: AlgorithmProps = serde_json::from_value(json!({
            "datetime-pattern": "%Y-%m-%d %H:%M:%S",
            "datetime-lower": "2024-01-01 00:00:00",
            "datetime-upper": "2024-06-30 23:59:59",
            "sharding-suffix-pattern": "%Y%m",
            "datetime-interval-unit": "months",
        }))
        .unwrap();
        IntervalShardingAlgorithm::from_props(&props).unwrap()
    }

    fn targets() -> Vec<String> {
        (1..=6).map(|m| format!("t_log_2024{m:02}")).collect()
    }

    #[test]
    fn routes_value_to_its_month() {
        let value = Value::from("2024-03-15 08:30:00");
        let target = monthly()
            .do_sharding(
                &targets(),
                &PreciseShardingValue {
                    logic_table: "t_log",
                    column: "created_at",
                    value: &value,
                },
            )
            .unwrap();
        assert_eq!(target.as_deref(), Some("t_log_202403"));
    }

    #[test]
    fn values_outside_bounds_match_nothing() {
        let value = Value::from("2023-12-31 23:00:00");
        let target = monthly()
            .do_sharding(
                &targets(),
                &PreciseShardingValue {
                    logic_table: "t_log",
                    column: "created_at",
                    value: &value,
                },
            )
            .unwrap();
        assert!(target.is_none());
    }

    #[test]
    fn rejects_invalid_suffix_pattern() {
        let props: AlgorithmProps = serde_json::from_value(json!({
            "datetime-pattern": "%Y-%m-%d",
            "datetime-lower": "2024-01-01",
            "datetime-upper": "2024-12-31",
            "sharding-suffix-pattern": "%Q",
        }))
        .unwrap();
        assert!(IntervalShardingAlgorithm::from_props(&props).is_err());
    }

    #[test]
    fn ranges_enumerate_months() {
        let range = ValueRange::new(
            Bound::Included(Value::from("2024-02-10 00:00:00")),
            Bound::Excluded(Value::from("2024-04-01 00:00:00")),
        );
        let routed = monthly()
            .do_range_sharding(
                &targets(),
                &RangeShardingValue {
                    logic_table: "t_log",
                    column: "created_at",
                    range: &range,
                },
            )
            .unwrap();
        assert_eq!(routed, vec!["t_log_202402", "t_log_202403"]);
    }

    #[test]
    fn malformed_values_fail_routing() {
        let value = Value::from("yesterday");
        let err = monthly()
            .do_sharding(
                &targets(),
                &PreciseShardingValue {
                    logic_table: "t_log",
                    column: "created_at",
                    value: &value,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ShardingError::RoutingFailure { .. }));
    }
}

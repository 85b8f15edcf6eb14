// SPDX-License-Identifier: Apache-2.0

use shardline_core::{ShardingError, ShardingResult, Value};

use super::{
    prop_string, required_string, AlgorithmProps, ComplexShardingAlgorithm, ComplexShardingValues,
};
use crate::rule::inline::InlineTemplate;

/// Inline template over several columns, e.g. `t_order_${(user_id + order_id) % 4}`.
///
/// Every combination of column values is evaluated.
#[derive(Debug, Clone)]
pub struct ComplexInlineShardingAlgorithm {
    template: InlineTemplate,
    columns: Vec<String>,
    allow_range_query: bool,
}

impl ComplexInlineShardingAlgorithm {
    pub fn new(template: InlineTemplate, allow_range_query: bool) -> Self {
        let columns = template.variables().into_iter().map(str::to_string).collect();
        Self {
            template,
            columns,
            allow_range_query,
        }
    }

    pub fn from_props(props: &AlgorithmProps, allow_range_query: bool) -> ShardingResult<Self> {
        let template = InlineTemplate::parse(&required_string(props, "algorithm-expression")?)?;
        let mut algorithm = Self::new(template, allow_range_query);
        if let Some(columns) = prop_string(props, "sharding-columns") {
            algorithm.columns = columns
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        Ok(algorithm)
    }

    fn combinations(&self, values: &ComplexShardingValues) -> ShardingResult<Vec<Vec<(String, Value)>>> {
        let mut combos: Vec<Vec<(String, Value)>> = vec![Vec::new()];
        for column in &self.columns {
            let column_values = values
                .column_values
                .iter()
                .find(|(c, _)| c.eq_ignore_ascii_case(column))
                .map(|(_, v)| v)
                .ok_or_else(|| ShardingError::RoutingFailure {
                    logic_table: values.logic_table.clone(),
                    sharding_column: Some(column.clone()),
                    attempted_value: None,
                    message: format!(
                        "complex inline expression '{}' needs a value for every sharding column",
                        self.template.source()
                    ),
                })?;
            let mut next = Vec::with_capacity(combos.len() * column_values.len());
            for combo in &combos {
                for value in column_values {
                    let mut extended = combo.clone();
                    extended.push((column.clone(), value.clone()));
                    next.push(extended);
                }
            }
            combos = next;
        }
        Ok(combos)
    }
}

impl ComplexShardingAlgorithm for ComplexInlineShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "COMPLEX_INLINE"
    }

    fn do_sharding(
        &self,
        targets: &[String],
        values: &ComplexShardingValues,
    ) -> ShardingResult<Vec<String>> {
        if !values.column_ranges.is_empty() {
            if self.allow_range_query {
                return Ok(targets.to_vec());
            }
            return Err(ShardingError::routing(
                values.logic_table.clone(),
                format!(
                    "range query on complex inline expression '{}' requires allow_range_query_with_inline_sharding",
                    self.template.source()
                ),
            ));
        }
        let mut result = Vec::new();
        for combo in self.combinations(values)? {
            let target = self.template.evaluate(&|var| {
                combo
                    .iter()
                    .find(|(c, _)| c.eq_ignore_ascii_case(var))
                    .map(|(_, v)| v.clone())
            })?;
            if !result.contains(&target) {
                result.push(target);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_every_combination() {
        let algorithm = ComplexInlineShardingAlgorithm::new(
            InlineTemplate::parse("t_${(a + b) % 4}").unwrap(),
            false,
        );
        let mut values = ComplexShardingValues {
            logic_table: "t".into(),
            ..Default::default()
        };
        values.column_values.insert("a".into(), vec![Value::Int(1), Value::Int(2)]);
        values.column_values.insert("B".into(), vec![Value::Int(1)]);
        let targets: Vec<String> = (0..4).map(|i| format!("t_{i}")).collect();
        assert_eq!(algorithm.do_sharding(&targets, &values).unwrap(), vec!["t_2", "t_3"]);
    }

    #[test]
    fn missing_column_value_fails() {
        let algorithm = ComplexInlineShardingAlgorithm::new(
            InlineTemplate::parse("t_${a + b}").unwrap(),
            false,
        );
        let mut values = ComplexShardingValues::default();
        values.column_values.insert("a".into(), vec![Value::Int(1)]);
        assert!(algorithm.do_sharding(&[], &values).is_err());
    }
}

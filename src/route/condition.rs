// SPDX-License-Identifier: Apache-2.0

//! Sharding conditions
//!
//! Extracts sharding values from WHERE predicates, INSERT rows and hints.
//! A statement yields a disjunction of conditions; each condition is the
//! conjunction of per-column values of its OR branch.

use shardline_core::{ShardingError, ShardingResult, Value};
use tracing::trace;

use super::hint::HintContext;
use crate::rule::range::ValueRange;
use crate::rule::ShardingRule;
use crate::statement::{
    ColumnPredicate, InsertStatement, PredicateOperator, StatementContext, ValueExpr, WhereSegment,
};

/// Values one column may take.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionOperand {
    List(Vec<Value>),
    Range(ValueRange),
}

impl ConditionOperand {
    /// Values satisfying both operands, `None` when no value can.
    pub fn intersect(&self, other: &ConditionOperand) -> Option<ConditionOperand> {
        match (self, other) {
            (Self::List(a), Self::List(b)) => {
                let kept: Vec<Value> = a
                    .iter()
                    .filter(|v| b.iter().any(|w| w.key() == v.key()))
                    .cloned()
                    .collect();
                (!kept.is_empty()).then_some(Self::List(kept))
            }
            (Self::List(list), Self::Range(range)) | (Self::Range(range), Self::List(list)) => {
                let kept: Vec<Value> = list.iter().filter(|v| range.contains(v)).cloned().collect();
                (!kept.is_empty()).then_some(Self::List(kept))
            }
            (Self::Range(a), Self::Range(b)) => {
                let range = a.intersect(b);
                (!range.is_empty()).then_some(Self::Range(range))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShardingConditionValue {
    pub table: String,
    pub column: String,
    pub operand: ConditionOperand,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingCondition {
    pub values: Vec<ShardingConditionValue>,
    always_false: bool,
}

impl ShardingCondition {
    fn always_false() -> Self {
        Self {
            values: Vec::new(),
            always_false: true,
        }
    }

    pub fn is_always_false(&self) -> bool {
        self.always_false
    }

    pub fn values_for(&self, logic_table: &str) -> Vec<&ShardingConditionValue> {
        self.values
            .iter()
            .filter(|v| v.table.eq_ignore_ascii_case(logic_table))
            .collect()
    }

    /// Adds a value, intersecting with an existing one on the same column.
    fn and(&mut self, value: ShardingConditionValue) {
        if self.always_false {
            return;
        }
        let existing = self.values.iter_mut().find(|v| {
            v.table.eq_ignore_ascii_case(&value.table) && v.column.eq_ignore_ascii_case(&value.column)
        });
        match existing {
            None => self.values.push(value),
            Some(current) => match current.operand.intersect(&value.operand) {
                Some(operand) => current.operand = operand,
                None => *self = Self::always_false(),
            },
        }
    }

    /// Replaces whatever is known about a column.
    pub(crate) fn override_with(&mut self, value: ShardingConditionValue) {
        self.values.retain(|v| {
            !(v.table.eq_ignore_ascii_case(&value.table) && v.column.eq_ignore_ascii_case(&value.column))
        });
        self.values.push(value);
        self.always_false = false;
    }
}

/// Disjunction of sharding conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingConditions {
    conditions: Vec<ShardingCondition>,
    /// One condition per INSERT row
    per_row: bool,
}

impl ShardingConditions {
    pub fn conditions(&self) -> &[ShardingCondition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn is_per_row(&self) -> bool {
        self.per_row
    }

    /// True when the statement can match no row at all.
    pub fn is_always_false(&self) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(ShardingCondition::is_always_false)
    }

    /// Conditions that can still match rows.
    pub fn satisfiable(&self) -> impl Iterator<Item = &ShardingCondition> {
        self.conditions.iter().filter(|c| !c.is_always_false())
    }

    /// Copy with `value` forced into every condition.
    pub(crate) fn with_override(&self, value: ShardingConditionValue) -> Self {
        let mut copy = self.clone();
        if copy.conditions.is_empty() {
            copy.conditions.push(ShardingCondition::default());
        }
        for condition in &mut copy.conditions {
            condition.override_with(value.clone());
        }
        copy
    }

    /// Drops values of other tables. A satisfiable condition left without
    /// values means a full route, so the whole set becomes empty.
    pub(crate) fn retain_tables(&mut self, tables: &[String]) {
        for condition in &mut self.conditions {
            condition
                .values
                .retain(|v| tables.iter().any(|t| t.eq_ignore_ascii_case(&v.table)));
        }
        if self
            .conditions
            .iter()
            .any(|c| !c.always_false && c.values.is_empty())
        {
            self.conditions.clear();
        }
    }

    /// Table of the first extracted value.
    pub fn first_table(&self) -> Option<&str> {
        self.satisfiable()
            .flat_map(|c| c.values.first())
            .map(|v| v.table.as_str())
            .next()
    }
}

pub struct ShardingConditionEngine<'a> {
    rule: &'a ShardingRule,
}

impl<'a> ShardingConditionEngine<'a> {
    pub fn new(rule: &'a ShardingRule) -> Self {
        Self { rule }
    }

    pub fn create(
        &self,
        statement: &StatementContext,
        params: &[Value],
        hint: &HintContext,
    ) -> ShardingResult<ShardingConditions> {
        let conditions = match statement {
            StatementContext::Insert(insert) => ShardingConditions {
                conditions: self.insert_conditions(insert, params, hint)?,
                per_row: true,
            },
            _ => ShardingConditions {
                conditions: self.where_conditions(statement, params, hint)?,
                per_row: false,
            },
        };
        trace!(conditions = conditions.conditions.len(), "Sharding conditions extracted");
        Ok(conditions)
    }

    fn where_conditions(
        &self,
        statement: &StatementContext,
        params: &[Value],
        hint: &HintContext,
    ) -> ShardingResult<Vec<ShardingCondition>> {
        let tables = statement.table_names();
        let mut conditions = Vec::new();
        let groups = statement
            .where_segment()
            .map(|w: &WhereSegment| w.or_groups.as_slice())
            .unwrap_or(&[]);
        for group in groups {
            let mut condition = ShardingCondition::default();
            for predicate in group {
                for value in self.predicate_values(statement, &tables, predicate, params)? {
                    condition.and(value);
                }
            }
            if condition.values.is_empty() && !condition.always_false {
                // A branch with nothing to shard on matches rows everywhere.
                conditions.clear();
                break;
            }
            conditions.push(condition);
        }

        let overrides = self.hint_values(&tables, hint);
        if overrides.is_empty() {
            return Ok(conditions);
        }
        if conditions.is_empty() {
            conditions.push(ShardingCondition::default());
        }
        for condition in &mut conditions {
            for value in &overrides {
                condition.override_with(value.clone());
            }
        }
        Ok(conditions)
    }

    fn insert_conditions(
        &self,
        insert: &InsertStatement,
        params: &[Value],
        hint: &HintContext,
    ) -> ShardingResult<Vec<ShardingCondition>> {
        let table = insert.table.name.as_str();
        let mut columns: Vec<&str> = insert
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| self.rule.is_sharding_column(table, c))
            .collect();
        if let Some(generated) = &insert.generated_key {
            if self.rule.is_sharding_column(table, &generated.column) {
                columns.push(generated.column.as_str());
            }
        }
        let overrides = self.hint_values(&[table.to_string()], hint);

        let mut conditions: Vec<ShardingCondition> =
            insert.rows.iter().map(|_| ShardingCondition::default()).collect();
        for column in columns {
            let Some(values) = insert.column_values(column) else {
                continue;
            };
            for (condition, expr) in conditions.iter_mut().zip(values) {
                if let Some(value) = resolve(&expr, table, column, params)? {
                    condition.and(ShardingConditionValue {
                        table: table.to_string(),
                        column: column.to_string(),
                        operand: ConditionOperand::List(vec![value]),
                    });
                }
            }
        }
        for condition in &mut conditions {
            for value in &overrides {
                condition.override_with(value.clone());
            }
        }
        Ok(conditions)
    }

    fn predicate_values(
        &self,
        statement: &StatementContext,
        tables: &[String],
        predicate: &ColumnPredicate,
        params: &[Value],
    ) -> ShardingResult<Vec<ShardingConditionValue>> {
        let candidates: Vec<&str> = match &predicate.owner {
            Some(owner) => vec![statement.resolve_owner(owner).unwrap_or(owner.as_str())],
            None => tables.iter().map(String::as_str).collect(),
        };
        let mut values = Vec::new();
        for table in candidates {
            if !self.rule.is_sharding_column(table, &predicate.column) {
                continue;
            }
            let Some(operand) = operand(predicate, table, params)? else {
                continue;
            };
            values.push(ShardingConditionValue {
                table: table.to_string(),
                column: predicate.column.clone(),
                operand,
            });
        }
        Ok(values)
    }

    fn hint_values(&self, tables: &[String], hint: &HintContext) -> Vec<ShardingConditionValue> {
        tables
            .iter()
            .flat_map(|table| {
                hint.column_values(table).map(move |(column, values)| ShardingConditionValue {
                    table: table.clone(),
                    column: column.to_string(),
                    operand: ConditionOperand::List(values.to_vec()),
                })
            })
            .collect()
    }
}

fn resolve(expr: &ValueExpr, table: &str, column: &str, params: &[Value]) -> ShardingResult<Option<Value>> {
    expr.resolve(params).map_err(|missing| ShardingError::RoutingFailure {
        logic_table: table.to_string(),
        sharding_column: Some(column.to_string()),
        attempted_value: None,
        message: format!(
            "parameter marker {} has no bound parameter ({} supplied)",
            missing.0 + 1,
            params.len()
        ),
    })
}

/// Operand of a predicate, `None` when any of its values is an expression.
fn operand(
    predicate: &ColumnPredicate,
    table: &str,
    params: &[Value],
) -> ShardingResult<Option<ConditionOperand>> {
    let mut values = Vec::with_capacity(predicate.operands.len());
    for expr in &predicate.operands {
        match resolve(expr, table, &predicate.column, params)? {
            Some(value) => values.push(value),
            None => return Ok(None),
        }
    }
    let single = |values: Vec<Value>| values.into_iter().next();
    let operand = match predicate.operator {
        PredicateOperator::Equal | PredicateOperator::In => {
            (!values.is_empty()).then_some(ConditionOperand::List(values))
        }
        PredicateOperator::Between => {
            let mut it = values.into_iter();
            match (it.next(), it.next()) {
                (Some(lower), Some(upper)) => Some(ConditionOperand::Range(ValueRange::closed(lower, upper))),
                _ => None,
            }
        }
        PredicateOperator::GreaterThan => single(values).map(|v| ConditionOperand::Range(ValueRange::greater_than(v))),
        PredicateOperator::GreaterThanOrEqual => {
            single(values).map(|v| ConditionOperand::Range(ValueRange::at_least(v)))
        }
        PredicateOperator::LessThan => single(values).map(|v| ConditionOperand::Range(ValueRange::less_than(v))),
        PredicateOperator::LessThanOrEqual => {
            single(values).map(|v| ConditionOperand::Range(ValueRange::at_most(v)))
        }
    };
    Ok(operand)
}

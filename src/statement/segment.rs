// SPDX-License-Identifier: Apache-2.0

//! Positioned fragments of the original SQL text.
//!
//! All `start_index` / `stop_index` pairs are inclusive byte offsets into
//! the logical SQL.

use serde::{Deserialize, Serialize};
use shardline_core::Value;

/// Identifier quoting style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteCharacter {
    #[default]
    None,
    Backquote,
    DoubleQuote,
    SquareBracket,
}

impl QuoteCharacter {
    pub fn wrap(&self, name: &str) -> String {
        match self {
            Self::None => name.to_string(),
            Self::Backquote => format!("`{name}`"),
            Self::DoubleQuote => format!("\"{name}\""),
            Self::SquareBracket => format!("[{name}]"),
        }
    }

    fn width(&self) -> usize {
        match self {
            Self::None => 0,
            _ => 2,
        }
    }
}

/// Schema qualifier in front of a table name (`db` in `db.t_order`).
/// The span covers the name only, not the dot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSegment {
    pub name: String,
    pub start_index: usize,
    pub stop_index: usize,
}

/// One occurrence of a table name: in FROM/JOIN/INTO, or as a column owner.
/// The span includes the quote characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSegment {
    pub name: String,
    #[serde(default)]
    pub quote: QuoteCharacter,
    #[serde(default)]
    pub owner: Option<OwnerSegment>,
    #[serde(default)]
    pub alias: Option<String>,
    pub start_index: usize,
    pub stop_index: usize,
}

impl TableSegment {
    /// Unquoted table name starting at `start_index`.
    pub fn new(name: impl Into<String>, start_index: usize) -> Self {
        Self::quoted(name, start_index, QuoteCharacter::None)
    }

    pub fn quoted(name: impl Into<String>, start_index: usize, quote: QuoteCharacter) -> Self {
        let name = name.into();
        let stop_index = start_index + name.len() + quote.width() - 1;
        Self {
            name,
            quote,
            owner: None,
            alias: None,
            start_index,
            stop_index,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds a schema qualifier. `start_index` is where the owner name begins.
    pub fn with_owner(mut self, owner: impl Into<String>, start_index: usize) -> Self {
        let name = owner.into();
        self.owner = Some(OwnerSegment {
            stop_index: start_index + name.len() - 1,
            name,
            start_index,
        });
        self
    }

    /// Whether `reference` names this table by alias or by name.
    pub fn is_referenced_by(&self, reference: &str) -> bool {
        self.alias
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(reference))
            || self.name.eq_ignore_ascii_case(reference)
    }
}

/// A value position in the SQL: literal, `?` marker, or an expression the
/// core cannot evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueExpr {
    Literal(Value),
    /// 0-based index into the statement parameters
    Parameter(usize),
    Expression(String),
}

/// A parameter marker with no bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingParameter(pub usize);

impl ValueExpr {
    /// Resolves the expression against the bound parameters. Expressions
    /// yield `None`.
    pub fn resolve(&self, params: &[Value]) -> Result<Option<Value>, MissingParameter> {
        match self {
            Self::Literal(v) => Ok(Some(v.clone())),
            Self::Parameter(i) => params.get(*i).cloned().map(Some).ok_or(MissingParameter(*i)),
            Self::Expression(_) => Ok(None),
        }
    }

    /// SQL text for re-rendering.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Literal(v) => v.to_sql_literal(),
            Self::Parameter(_) => "?".to_string(),
            Self::Expression(text) => text.clone(),
        }
    }
}

impl From<Value> for ValueExpr {
    fn from(v: Value) -> Self {
        Self::Literal(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateOperator {
    Equal,
    In,
    Between,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

/// `owner.column <op> operands` as found in a WHERE clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnPredicate {
    #[serde(default)]
    pub owner: Option<String>,
    pub column: String,
    pub operator: PredicateOperator,
    pub operands: Vec<ValueExpr>,
}

impl ColumnPredicate {
    pub fn new(column: impl Into<String>, operator: PredicateOperator, operands: Vec<ValueExpr>) -> Self {
        Self {
            owner: None,
            column: column.into(),
            operator,
            operands,
        }
    }

    pub fn equal(column: impl Into<String>, operand: impl Into<ValueExpr>) -> Self {
        Self::new(column, PredicateOperator::Equal, vec![operand.into()])
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// WHERE clause in disjunctive normal form: OR of AND-groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhereSegment {
    pub or_groups: Vec<Vec<ColumnPredicate>>,
}

impl WhereSegment {
    /// A single AND-group.
    pub fn and(predicates: Vec<ColumnPredicate>) -> Self {
        Self {
            or_groups: vec![predicates],
        }
    }

    pub fn or(groups: Vec<Vec<ColumnPredicate>>) -> Self {
        Self { or_groups: groups }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_segment_spans_quotes() {
        let sql = "SELECT * FROM `t_order`";
        let segment = TableSegment::quoted("t_order", 14, QuoteCharacter::Backquote);
        assert_eq!(&sql[segment.start_index..=segment.stop_index], "`t_order`");
    }

    #[test]
    fn owner_span_covers_name_only() {
        let sql = "SELECT * FROM db.t_order o";
        let segment = TableSegment::new("t_order", 17).with_owner("db", 14).with_alias("o");
        let owner = segment.owner.as_ref().unwrap();
        assert_eq!(&sql[owner.start_index..=owner.stop_index], "db");
        assert!(segment.is_referenced_by("O"));
        assert!(segment.is_referenced_by("t_order"));
    }

    #[test]
    fn resolves_parameters() {
        let params = vec![Value::Int(7)];
        assert_eq!(ValueExpr::Parameter(0).resolve(&params), Ok(Some(Value::Int(7))));
        assert_eq!(ValueExpr::Parameter(1).resolve(&params), Err(MissingParameter(1)));
        assert_eq!(ValueExpr::Expression("now()".into()).resolve(&params), Ok(None));
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Bound Statement Contexts
//!
//! The parser and binder live outside this crate. They hand over one of the
//! shapes below, with every table occurrence, predicate and clause position
//! located in the original SQL text.

pub mod insert;
pub mod segment;
pub mod select;

use serde::{Deserialize, Serialize};

pub use insert::{GeneratedKeyContext, InsertStatement, InsertValueRow};
pub use segment::{
    ColumnPredicate, OwnerSegment, PredicateOperator, QuoteCharacter, TableSegment, ValueExpr,
    WhereSegment,
};
pub use select::{
    AggregationType, ColumnRef, GroupByContext, NullsOrder, OrderByItem, OrderExpr,
    PaginationContext, PaginationSegment, Projection, ProjectionsContext, SelectStatement,
    SortDirection,
};

/// `column = value` in an UPDATE SET clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: ValueExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStatement {
    pub tables: Vec<TableSegment>,
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub where_segment: Option<WhereSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteStatement {
    pub tables: Vec<TableSegment>,
    #[serde(default)]
    pub where_segment: Option<WhereSegment>,
}

/// An index name in a DDL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSegment {
    pub name: String,
    #[serde(default)]
    pub quote: QuoteCharacter,
    pub start_index: usize,
    pub stop_index: usize,
}

impl IndexSegment {
    pub fn new(name: impl Into<String>, start_index: usize) -> Self {
        let name = name.into();
        Self {
            stop_index: start_index + name.len() - 1,
            name,
            quote: QuoteCharacter::None,
            start_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdlStatement {
    pub tables: Vec<TableSegment>,
    #[serde(default)]
    pub indexes: Vec<IndexSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Metadata,
    Session,
}

/// The closed set of statement shapes the router understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementContext {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Ddl(DdlStatement),
    /// SHOW / DESCRIBE / EXPLAIN style statements
    Metadata { tables: Vec<TableSegment> },
    /// SET / BEGIN / COMMIT / USE ...
    Session,
}

impl StatementContext {
    pub fn kind(&self) -> StatementKind {
        match self {
            Self::Select(_) => StatementKind::Select,
            Self::Insert(_) => StatementKind::Insert,
            Self::Update(_) => StatementKind::Update,
            Self::Delete(_) => StatementKind::Delete,
            Self::Ddl(_) => StatementKind::Ddl,
            Self::Metadata { .. } => StatementKind::Metadata,
            Self::Session => StatementKind::Session,
        }
    }

    pub fn is_dml(&self) -> bool {
        matches!(
            self,
            Self::Select(_) | Self::Insert(_) | Self::Update(_) | Self::Delete(_)
        )
    }

    /// Every table occurrence, in textual order as supplied.
    pub fn table_segments(&self) -> &[TableSegment] {
        match self {
            Self::Select(s) => &s.tables,
            Self::Insert(s) => std::slice::from_ref(&s.table),
            Self::Update(s) => &s.tables,
            Self::Delete(s) => &s.tables,
            Self::Ddl(s) => &s.tables,
            Self::Metadata { tables } => tables,
            Self::Session => &[],
        }
    }

    /// Distinct table names (case-insensitive) in first-occurrence order.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for segment in self.table_segments() {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&segment.name)) {
                names.push(segment.name.clone());
            }
        }
        names
    }

    pub fn where_segment(&self) -> Option<&WhereSegment> {
        match self {
            Self::Select(s) => s.where_segment.as_ref(),
            Self::Update(s) => s.where_segment.as_ref(),
            Self::Delete(s) => s.where_segment.as_ref(),
            _ => None,
        }
    }

    /// Table name behind a column owner, which may be an alias.
    pub fn resolve_owner(&self, owner: &str) -> Option<&str> {
        self.table_segments()
            .iter()
            .find(|t| t.is_referenced_by(owner))
            .map(|t| t.name.as_str())
    }

    pub fn as_select(&self) -> Option<&SelectStatement> {
        match self {
            Self::Select(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_insert(&self) -> Option<&InsertStatement> {
        match self {
            Self::Insert(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_distinct_tables_and_resolves_aliases() {
        // SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE t_order.x = 1
        let stmt = StatementContext::Select(SelectStatement {
            tables: vec![
                TableSegment::new("t_order", 14).with_alias("o"),
                TableSegment::new("t_order_item", 29).with_alias("i"),
                TableSegment::new("T_ORDER", 77),
            ],
            ..Default::default()
        });
        assert_eq!(stmt.table_names(), vec!["t_order", "t_order_item"]);
        assert_eq!(stmt.resolve_owner("i"), Some("t_order_item"));
        assert_eq!(stmt.resolve_owner("x"), None);
        assert!(stmt.is_dml());
        assert_eq!(stmt.kind(), StatementKind::Select);
    }

    #[test]
    fn session_statements_have_no_tables() {
        assert!(StatementContext::Session.table_names().is_empty());
        assert!(!StatementContext::Session.is_dml());
    }

    #[test]
    fn deserializes_from_json() {
        let stmt: StatementContext = serde_json::from_str(
            r#"{
                "kind": "delete",
                "tables": [{ "name": "t_order", "start_index": 12, "stop_index": 18 }],
                "where_segment": { "or_groups": [[{ "column": "order_id", "operator": "equal", "operands": [{ "parameter": 0 }] }]] }
            }"#,
        )
        .unwrap();
        assert_eq!(stmt.kind(), StatementKind::Delete);
        assert_eq!(stmt.where_segment().unwrap().or_groups[0][0].column, "order_id");
    }
}

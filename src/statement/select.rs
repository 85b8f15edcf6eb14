// SPDX-License-Identifier: Apache-2.0

//! SELECT statement context
//!
//! Besides the bound clauses, this module decides which columns a
//! multi-shard SELECT must additionally fetch so that results can be merged
//! (AVG components and sort keys missing from the select list).

use std::fmt;

use serde::{Deserialize, Serialize};
use shardline_core::{ShardingError, ShardingResult, Value};

use super::segment::{TableSegment, WhereSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Avg => "AVG",
        };
        f.write_str(name)
    }
}

/// One item of the select list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    Column {
        #[serde(default)]
        owner: Option<String>,
        name: String,
        #[serde(default)]
        alias: Option<String>,
    },
    Aggregation {
        aggregation: AggregationType,
        /// Argument text, e.g. `price` or `*`
        argument: String,
        #[serde(default)]
        distinct: bool,
        #[serde(default)]
        alias: Option<String>,
    },
    Expression {
        text: String,
        #[serde(default)]
        alias: Option<String>,
    },
    /// `*` or `owner.*`
    Shorthand {
        #[serde(default)]
        owner: Option<String>,
    },
}

impl Projection {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column {
            owner: None,
            name: name.into(),
            alias: None,
        }
    }

    pub fn aggregation(aggregation: AggregationType, argument: impl Into<String>) -> Self {
        Self::Aggregation {
            aggregation,
            argument: argument.into(),
            distinct: false,
            alias: None,
        }
    }

    /// Sets the alias. Shorthand projections ignore it.
    pub fn alias(mut self, new_alias: impl Into<String>) -> Self {
        match &mut self {
            Self::Column { alias, .. }
            | Self::Aggregation { alias, .. }
            | Self::Expression { alias, .. } => *alias = Some(new_alias.into()),
            Self::Shorthand { .. } => {}
        }
        self
    }

    pub fn alias_name(&self) -> Option<&str> {
        match self {
            Self::Column { alias, .. }
            | Self::Aggregation { alias, .. }
            | Self::Expression { alias, .. } => alias.as_deref(),
            Self::Shorthand { .. } => None,
        }
    }

    /// Result column label the database reports for this projection.
    pub fn label(&self) -> Option<String> {
        if let Some(alias) = self.alias_name() {
            return Some(alias.to_string());
        }
        match self {
            Self::Column { name, .. } => Some(name.clone()),
            Self::Aggregation { .. } => Some(self.expression_text()),
            Self::Expression { text, .. } => Some(text.clone()),
            Self::Shorthand { .. } => None,
        }
    }

    /// The projection written without alias.
    pub fn expression_text(&self) -> String {
        match self {
            Self::Column { owner, name, .. } => match owner {
                Some(o) => format!("{o}.{name}"),
                None => name.clone(),
            },
            Self::Aggregation {
                aggregation,
                argument,
                distinct,
                ..
            } => {
                let distinct = if *distinct { "DISTINCT " } else { "" };
                format!("{aggregation}({distinct}{argument})")
            }
            Self::Expression { text, .. } => text.clone(),
            Self::Shorthand { owner } => match owner {
                Some(o) => format!("{o}.*"),
                None => "*".to_string(),
            },
        }
    }

    fn matches(&self, expr: &OrderExpr) -> bool {
        match (self, expr) {
            (Self::Shorthand { .. }, OrderExpr::Column { .. }) => true,
            (
                Self::Column { owner, name, alias },
                OrderExpr::Column {
                    owner: expr_owner,
                    name: expr_name,
                },
            ) => {
                let owner_ok = match (owner, expr_owner) {
                    (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                    _ => true,
                };
                (owner_ok && name.eq_ignore_ascii_case(expr_name))
                    || (expr_owner.is_none()
                        && alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(expr_name)))
            }
            (_, OrderExpr::Column { owner: None, name }) => self
                .alias_name()
                .is_some_and(|a| a.eq_ignore_ascii_case(name)),
            (Self::Aggregation { .. } | Self::Expression { .. }, OrderExpr::Expression(text)) => {
                normalize(&self.expression_text()) == normalize(text)
            }
            _ => false,
        }
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// The select list and where it sits in the SQL text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionsContext {
    pub start_index: usize,
    /// Last byte of the select list; derived columns are appended after it
    pub stop_index: usize,
    #[serde(default)]
    pub distinct_row: bool,
    pub items: Vec<Projection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderExpr {
    Column {
        owner: Option<String>,
        name: String,
    },
    /// 1-based position in the select list
    Index(usize),
    Expression(String),
}

impl OrderExpr {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column {
            owner: None,
            name: name.into(),
        }
    }

    pub fn sql(&self) -> String {
        match self {
            Self::Column { owner: Some(o), name } => format!("{o}.{name}"),
            Self::Column { owner: None, name } => name.clone(),
            Self::Index(i) => i.to_string(),
            Self::Expression(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub expr: OrderExpr,
    #[serde(default)]
    pub direction: SortDirection,
    /// Explicit NULLS FIRST / NULLS LAST
    #[serde(default)]
    pub nulls: Option<NullsOrder>,
}

impl OrderByItem {
    pub fn asc(expr: OrderExpr) -> Self {
        Self {
            expr,
            direction: SortDirection::Asc,
            nulls: None,
        }
    }

    pub fn desc(expr: OrderExpr) -> Self {
        Self {
            expr,
            direction: SortDirection::Desc,
            nulls: None,
        }
    }

    /// NULL placement: explicit, else NULLs sort as the smallest value.
    pub fn effective_nulls(&self) -> NullsOrder {
        self.nulls.unwrap_or(match self.direction {
            SortDirection::Asc => NullsOrder::First,
            SortDirection::Desc => NullsOrder::Last,
        })
    }

    fn same_sort(&self, other: &OrderByItem) -> bool {
        let expr_eq = match (&self.expr, &other.expr) {
            (
                OrderExpr::Column { owner: a_owner, name: a },
                OrderExpr::Column { owner: b_owner, name: b },
            ) => {
                a.eq_ignore_ascii_case(b)
                    && match (a_owner, b_owner) {
                        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
                        _ => true,
                    }
            }
            (OrderExpr::Expression(a), OrderExpr::Expression(b)) => normalize(a) == normalize(b),
            (a, b) => a == b,
        };
        expr_eq && self.direction == other.direction
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupByContext {
    pub items: Vec<OrderByItem>,
    /// Last byte of the GROUP BY (and HAVING) clause; a generated ORDER BY
    /// is inserted after it
    pub stop_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationValue {
    Literal(i64),
    /// 0-based parameter index
    Parameter(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSegment {
    pub value: PaginationValue,
    pub start_index: usize,
    pub stop_index: usize,
}

impl PaginationSegment {
    pub fn literal(value: i64, start_index: usize) -> Self {
        Self {
            value: PaginationValue::Literal(value),
            start_index,
            stop_index: start_index + value.to_string().len() - 1,
        }
    }

    /// A `?` marker at `start_index`.
    pub fn parameter(index: usize, start_index: usize) -> Self {
        Self {
            value: PaginationValue::Parameter(index),
            start_index,
            stop_index: start_index,
        }
    }

    pub fn resolve(&self, params: &[Value]) -> ShardingResult<i64> {
        match self.value {
            PaginationValue::Literal(v) => Ok(v),
            PaginationValue::Parameter(i) => {
                let value = params.get(i).ok_or_else(|| {
                    ShardingError::rewrite(format!(
                        "pagination parameter {i} has no bound parameter"
                    ))
                })?;
                value.as_i64().filter(|v| *v >= 0).ok_or_else(|| {
                    ShardingError::rewrite(format!(
                        "pagination parameter {i} must be a non-negative integer, got '{value}'"
                    ))
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationContext {
    #[serde(default)]
    pub offset: Option<PaginationSegment>,
    #[serde(default)]
    pub row_count: Option<PaginationSegment>,
}

impl PaginationContext {
    pub fn actual_offset(&self, params: &[Value]) -> ShardingResult<i64> {
        self.offset.map_or(Ok(0), |s| s.resolve(params))
    }

    pub fn actual_row_count(&self, params: &[Value]) -> ShardingResult<Option<i64>> {
        self.row_count.map(|s| s.resolve(params)).transpose()
    }
}

/// Why a derived column exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedKind {
    AvgCount,
    AvgSum,
    OrderBy,
    GroupBy,
}

/// A column appended to the select list of every shard query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedProjection {
    pub expression: String,
    pub alias: String,
    pub kind: DerivedKind,
}

impl DerivedProjection {
    pub fn sql(&self) -> String {
        format!("{} AS {}", self.expression, self.alias)
    }
}

pub fn avg_count_alias(n: usize) -> String {
    format!("AVG_DERIVED_COUNT_{n}")
}

pub fn avg_sum_alias(n: usize) -> String {
    format!("AVG_DERIVED_SUM_{n}")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    pub tables: Vec<TableSegment>,
    pub projections: ProjectionsContext,
    #[serde(default)]
    pub where_segment: Option<WhereSegment>,
    #[serde(default)]
    pub group_by: Option<GroupByContext>,
    #[serde(default)]
    pub order_by: Option<Vec<OrderByItem>>,
    #[serde(default)]
    pub pagination: Option<PaginationContext>,
}

impl SelectStatement {
    pub fn has_aggregation(&self) -> bool {
        self.projections
            .items
            .iter()
            .any(|p| matches!(p, Projection::Aggregation { .. }))
    }

    pub fn group_by_items(&self) -> &[OrderByItem] {
        self.group_by.as_ref().map_or(&[], |g| g.items.as_slice())
    }

    pub fn has_group_by(&self) -> bool {
        !self.group_by_items().is_empty()
    }

    /// ORDER BY items; GROUP BY items stand in when no ORDER BY is written.
    pub fn effective_order_by(&self) -> Vec<OrderByItem> {
        match &self.order_by {
            Some(items) if !items.is_empty() => items.clone(),
            _ => self.group_by_items().to_vec(),
        }
    }

    /// Whether ORDER BY is generated from GROUP BY on shard queries.
    pub fn needs_generated_order_by(&self) -> bool {
        self.has_group_by() && self.order_by.as_ref().map_or(true, |o| o.is_empty())
    }

    pub fn is_same_group_by_and_order_by(&self) -> bool {
        let group = self.group_by_items();
        let order = self.effective_order_by();
        !group.is_empty()
            && group.len() == order.len()
            && group.iter().zip(&order).all(|(g, o)| g.same_sort(o))
    }

    /// Merging needs every shard row when grouping cannot stream.
    pub fn needs_unbounded_row_count(&self) -> bool {
        (self.has_group_by() || self.has_aggregation()) && !self.is_same_group_by_and_order_by()
    }

    fn has_shorthand(&self) -> bool {
        self.projections
            .items
            .iter()
            .any(|p| matches!(p, Projection::Shorthand { .. }))
    }

    /// Columns every shard must additionally return, in append order:
    /// AVG components, then missing ORDER BY keys, then missing GROUP BY keys.
    pub fn derived_projections(&self) -> Vec<DerivedProjection> {
        let mut derived = Vec::new();
        let mut avg_ordinal = 0;
        for projection in &self.projections.items {
            if let Projection::Aggregation {
                aggregation: AggregationType::Avg,
                argument,
                distinct,
                ..
            } = projection
            {
                let distinct = if *distinct { "DISTINCT " } else { "" };
                derived.push(DerivedProjection {
                    expression: format!("COUNT({distinct}{argument})"),
                    alias: avg_count_alias(avg_ordinal),
                    kind: DerivedKind::AvgCount,
                });
                derived.push(DerivedProjection {
                    expression: format!("SUM({distinct}{argument})"),
                    alias: avg_sum_alias(avg_ordinal),
                    kind: DerivedKind::AvgSum,
                });
                avg_ordinal += 1;
            }
        }

        let mut derived_sort: Vec<&OrderByItem> = Vec::new();
        let order_items = self.order_by.as_deref().unwrap_or(&[]);
        for (items, kind, prefix) in [
            (order_items, DerivedKind::OrderBy, "ORDER_BY_DERIVED"),
            (self.group_by_items(), DerivedKind::GroupBy, "GROUP_BY_DERIVED"),
        ] {
            let mut ordinal = 0;
            for item in items {
                if matches!(item.expr, OrderExpr::Index(_)) || self.find_projection(&item.expr).is_some() {
                    continue;
                }
                if derived_sort.iter().any(|d| d.expr == item.expr) {
                    continue;
                }
                derived.push(DerivedProjection {
                    expression: item.expr.sql(),
                    alias: format!("{prefix}_{ordinal}"),
                    kind,
                });
                derived_sort.push(item);
                ordinal += 1;
            }
        }
        derived
    }

    fn find_projection(&self, expr: &OrderExpr) -> Option<&Projection> {
        let items = &self.projections.items;
        items
            .iter()
            .find(|p| !matches!(p, Projection::Shorthand { .. }) && p.matches(expr))
            .or_else(|| items.iter().find(|p| p.matches(expr)))
    }

    /// Label or position under which a sort key appears in shard results.
    pub fn sort_key_column(&self, expr: &OrderExpr) -> ColumnRef {
        if let OrderExpr::Index(i) = expr {
            return ColumnRef::Index(*i);
        }
        match self.find_projection(expr) {
            Some(Projection::Shorthand { .. }) => match expr {
                OrderExpr::Column { name, .. } => ColumnRef::Label(name.clone()),
                other => ColumnRef::Label(other.sql()),
            },
            Some(projection) => self.projection_column(projection),
            None => self
                .derived_projections()
                .into_iter()
                .find(|d| {
                    matches!(d.kind, DerivedKind::OrderBy | DerivedKind::GroupBy)
                        && d.expression == expr.sql()
                })
                .map(|d| ColumnRef::Label(d.alias))
                .unwrap_or_else(|| ColumnRef::Label(expr.sql())),
        }
    }

    /// Position when it is statically known, else the reported label.
    pub fn projection_column(&self, projection: &Projection) -> ColumnRef {
        if projection.alias_name().is_none() && !self.has_shorthand() {
            if let Some(pos) = self.projections.items.iter().position(|p| p == projection) {
                return ColumnRef::Index(pos + 1);
            }
        }
        ColumnRef::Label(projection.label().unwrap_or_else(|| projection.expression_text()))
    }
}

/// A result column, by 1-based index or by label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRef {
    Index(usize),
    Label(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(items: Vec<Projection>) -> SelectStatement {
        SelectStatement {
            projections: ProjectionsContext {
                start_index: 7,
                stop_index: 20,
                distinct_row: false,
                items,
            },
            ..Default::default()
        }
    }

    #[test]
    fn derives_avg_components() {
        let stmt = select(vec![
            Projection::column("user_id"),
            Projection::aggregation(AggregationType::Avg, "price").alias("avg_price"),
        ]);
        let derived = stmt.derived_projections();
        assert_eq!(derived.len(), 2);
        assert_eq!(derived[0].sql(), "COUNT(price) AS AVG_DERIVED_COUNT_0");
        assert_eq!(derived[1].sql(), "SUM(price) AS AVG_DERIVED_SUM_0");
    }

    #[test]
    fn derives_missing_sort_keys_once() {
        let mut stmt = select(vec![Projection::column("user_id")]);
        stmt.order_by = Some(vec![
            OrderByItem::asc(OrderExpr::column("user_id")),
            OrderByItem::desc(OrderExpr::column("created_at")),
        ]);
        stmt.group_by = Some(GroupByContext {
            items: vec![
                OrderByItem::asc(OrderExpr::column("created_at")),
                OrderByItem::asc(OrderExpr::column("status")),
            ],
            stop_index: 40,
        });
        let aliases: Vec<String> = stmt.derived_projections().into_iter().map(|d| d.alias).collect();
        assert_eq!(aliases, vec!["ORDER_BY_DERIVED_0", "GROUP_BY_DERIVED_0"]);
        assert_eq!(
            stmt.sort_key_column(&OrderExpr::column("created_at")),
            ColumnRef::Label("ORDER_BY_DERIVED_0".into())
        );
        assert_eq!(
            stmt.sort_key_column(&OrderExpr::column("status")),
            ColumnRef::Label("GROUP_BY_DERIVED_0".into())
        );
        assert_eq!(stmt.sort_key_column(&OrderExpr::column("user_id")), ColumnRef::Index(1));
    }

    #[test]
    fn shorthand_covers_column_sort_keys() {
        let mut stmt = select(vec![Projection::Shorthand { owner: None }]);
        stmt.order_by = Some(vec![OrderByItem::asc(OrderExpr::column("order_id"))]);
        assert!(stmt.derived_projections().is_empty());
        assert_eq!(
            stmt.sort_key_column(&OrderExpr::column("order_id")),
            ColumnRef::Label("order_id".into())
        );
    }

    #[test]
    fn order_by_alias_matches_projection() {
        let mut stmt = select(vec![
            Projection::column("user_id"),
            Projection::aggregation(AggregationType::Count, "*").alias("cnt"),
        ]);
        stmt.order_by = Some(vec![OrderByItem::desc(OrderExpr::column("cnt"))]);
        assert!(stmt.derived_projections().is_empty());
        assert_eq!(
            stmt.sort_key_column(&OrderExpr::column("cnt")),
            ColumnRef::Label("cnt".into())
        );
    }

    #[test]
    fn group_by_and_order_by_comparison() {
        let mut stmt = select(vec![Projection::column("user_id")]);
        stmt.group_by = Some(GroupByContext {
            items: vec![OrderByItem::asc(OrderExpr::column("user_id"))],
            stop_index: 30,
        });
        assert!(stmt.is_same_group_by_and_order_by());
        assert!(stmt.needs_generated_order_by());
        assert!(!stmt.needs_unbounded_row_count());

        stmt.order_by = Some(vec![OrderByItem::desc(OrderExpr::column("user_id"))]);
        assert!(!stmt.is_same_group_by_and_order_by());
        assert!(stmt.needs_unbounded_row_count());
    }

    #[test]
    fn aggregation_without_group_by_needs_all_rows() {
        let stmt = select(vec![Projection::aggregation(AggregationType::Count, "*")]);
        assert!(stmt.needs_unbounded_row_count());
    }

    #[test]
    fn pagination_resolves_parameters() {
        let pagination = PaginationContext {
            offset: Some(PaginationSegment::parameter(0, 40)),
            row_count: Some(PaginationSegment::literal(10, 43)),
        };
        assert_eq!(pagination.actual_offset(&[Value::Int(5)]).unwrap(), 5);
        assert_eq!(pagination.actual_row_count(&[]).unwrap(), Some(10));
        assert!(pagination.actual_offset(&[]).is_err());
        assert!(pagination.actual_offset(&[Value::Int(-1)]).is_err());
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Builds the tokens and parameter rewriters for one routed statement.

use shardline_core::{ShardingError, ShardingResult, Value};

use super::parameter::{
    InsertParameterRewriter, InsertRowParameters, PaginationParameterRewriter, ParameterRewriter,
};
use super::token::{InsertRowToken, SqlToken};
use crate::route::{RouteContext, RouteStrategy};
use crate::rule::ShardingRule;
use crate::statement::select::PaginationValue;
use crate::statement::{InsertStatement, SelectStatement, SortDirection, StatementContext};

/// Tokens plus parameter rewriters shared by every unit of a route.
#[derive(Debug, Default)]
pub struct RewritePlan {
    pub tokens: Vec<SqlToken>,
    pub parameter_rewriters: Vec<Box<dyn ParameterRewriter>>,
}

pub struct SqlTokenGenerator<'a> {
    rule: &'a ShardingRule,
}

impl<'a> SqlTokenGenerator<'a> {
    pub fn new(rule: &'a ShardingRule) -> Self {
        Self { rule }
    }

    pub fn generate(
        &self,
        statement: &StatementContext,
        route: &RouteContext,
        params: &[Value],
    ) -> ShardingResult<RewritePlan> {
        let mut plan = RewritePlan::default();
        self.table_tokens(statement, &mut plan.tokens);
        match statement {
            StatementContext::Ddl(ddl) => {
                let logic_table = ddl
                    .tables
                    .iter()
                    .find(|t| self.rule.is_sharding_table(&t.name))
                    .map(|t| t.name.clone());
                if let Some(logic_table) = logic_table {
                    plan.tokens.extend(ddl.indexes.iter().map(|index| SqlToken::Index {
                        start_index: index.start_index,
                        stop_index: index.stop_index,
                        name: index.name.clone(),
                        quote: index.quote,
                        logic_table: logic_table.clone(),
                    }));
                }
            }
            StatementContext::Select(select) if route.len() > 1 => {
                select_tokens(select, params, &mut plan)?;
            }
            StatementContext::Insert(insert) => insert_tokens(insert, route, &mut plan)?,
            _ => {}
        }
        Ok(plan)
    }

    fn table_tokens(&self, statement: &StatementContext, tokens: &mut Vec<SqlToken>) {
        for segment in statement.table_segments() {
            if !self.rule.is_sharding_table(&segment.name) {
                continue;
            }
            tokens.push(SqlToken::Table {
                start_index: segment.start_index,
                stop_index: segment.stop_index,
                logic_table: segment.name.clone(),
                quote: segment.quote,
            });
            if let Some(owner) = &segment.owner {
                tokens.push(SqlToken::Remove {
                    start_index: owner.start_index,
                    stop_index: segment.start_index.saturating_sub(1),
                });
            }
        }
    }
}

fn select_tokens(select: &SelectStatement, params: &[Value], plan: &mut RewritePlan) -> ShardingResult<()> {
    let derived = select.derived_projections();
    if !derived.is_empty() {
        plan.tokens.push(SqlToken::Projections {
            start_index: select.projections.stop_index + 1,
            items: derived.iter().map(|d| d.sql()).collect(),
        });
    }

    if let (true, Some(group_by)) = (select.needs_generated_order_by(), &select.group_by) {
        plan.tokens.push(SqlToken::OrderBy {
            start_index: group_by.stop_index + 1,
            items: group_by
                .items
                .iter()
                .map(|item| {
                    let direction = match item.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{} {direction}", item.expr.sql())
                })
                .collect(),
        });
    }

    let Some(pagination) = &select.pagination else {
        return Ok(());
    };
    let offset = pagination.actual_offset(params)?;
    let row_count = pagination.actual_row_count(params)?;
    let mut rewriter = PaginationParameterRewriter {
        offset: None,
        row_count: None,
    };
    if let Some(segment) = pagination.offset {
        match segment.value {
            PaginationValue::Literal(_) => plan.tokens.push(SqlToken::Offset {
                start_index: segment.start_index,
                stop_index: segment.stop_index,
                revised: 0,
            }),
            PaginationValue::Parameter(index) => rewriter.offset = Some((index, 0)),
        }
    }
    if let (Some(segment), Some(row_count)) = (pagination.row_count, row_count) {
        let revised = if select.needs_unbounded_row_count() {
            i64::MAX
        } else {
            offset.saturating_add(row_count)
        };
        match segment.value {
            PaginationValue::Literal(_) => plan.tokens.push(SqlToken::RowCount {
                start_index: segment.start_index,
                stop_index: segment.stop_index,
                revised,
            }),
            PaginationValue::Parameter(index) => rewriter.row_count = Some((index, revised)),
        }
    }
    if rewriter.offset.is_some() || rewriter.row_count.is_some() {
        plan.parameter_rewriters.push(Box::new(rewriter));
    }
    Ok(())
}

fn insert_tokens(insert: &InsertStatement, route: &RouteContext, plan: &mut RewritePlan) -> ShardingResult<()> {
    let generated = insert
        .generated_key
        .as_ref()
        .filter(|g| insert.column_index(&g.column).is_none());
    if let Some(generated) = generated {
        if generated.values.len() != insert.rows.len() {
            return Err(ShardingError::rewrite(format!(
                "{} generated keys for {} insert rows",
                generated.values.len(),
                insert.rows.len()
            )));
        }
        let start_index = insert.columns_stop_index.ok_or_else(|| {
            ShardingError::rewrite(format!(
                "generated key column '{}' needs an explicit insert column list",
                generated.column
            ))
        })?;
        plan.tokens.push(SqlToken::GeneratedKeyInsertColumn {
            start_index,
            column: generated.column.clone(),
        });
    } else if route.len() <= 1 {
        return Ok(());
    }

    let per_row = route.strategy() == RouteStrategy::Standard
        && route.original_data_nodes().len() == insert.rows.len();
    let parameterized = insert.is_parameterized();
    let mut rows = Vec::with_capacity(insert.rows.len());
    let mut row_parameters = Vec::with_capacity(insert.rows.len());
    for (i, row) in insert.rows.iter().enumerate() {
        let key = generated.and_then(|g| g.values.get(i));
        let token = InsertRowToken {
            values: row.values.iter().map(|v| v.to_sql()).collect(),
            generated_key: key.map(|k| if parameterized { "?".to_string() } else { k.to_sql_literal() }),
            data_nodes: if per_row {
                route.original_data_nodes()[i].clone()
            } else {
                Vec::new()
            },
        };
        row_parameters.push((
            InsertRowParameters {
                indexes: row.parameter_indexes(),
                generated_key: key.filter(|_| parameterized).cloned(),
            },
            token.clone(),
        ));
        rows.push(token);
    }
    plan.tokens.push(SqlToken::InsertValues {
        start_index: insert.values_start_index,
        stop_index: insert.values_stop_index,
        logic_table: insert.table.name.clone(),
        rows,
    });
    if parameterized {
        plan.parameter_rewriters.push(Box::new(InsertParameterRewriter {
            logic_table: insert.table.name.clone(),
            rows: row_parameters,
            trailing_start: insert.trailing_parameter_start(),
        }));
    }
    Ok(())
}

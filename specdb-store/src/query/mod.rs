//! Filter-to-SQL translation
//!
//! A validated [`Filter`] is first turned into a [`QueryPlan`] (join list,
//! predicate list, ordering, limit) and then rendered with a [`Dialect`].
//!
//! Every metadata field the filter references gets exactly one aliased join
//! of the `metadata` table on `owner = r.external_id AND field = '<name>'`,
//! so constraints on different fields never share a join.

pub mod ast;

use crate::dialect::Dialect;
use crate::filter::{Filter, SortKey};
use crate::metadata::{FIELD_DUMMY, FIELD_INSERT_TIMESTAMP, FIELD_INSTRUMENT, TIMESTAMP_FORMAT};
use crate::Result;
use ast::{CmpOp, JoinKind, Literal, OrderBy, Predicate, QueryPlan, READINGS_ALIAS};

/// Columns selected for full reading rows
pub const READING_COLUMNS: &str = "r.id, r.external_id, r.tag, r.format, r.points";

/// What the query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Surrogate keys only
    Ids,
    /// Full reading rows (metadata loaded separately)
    Rows,
}

/// Rendered query fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParts {
    pub select: String,
    pub from: String,
    /// Empty when the filter has no predicates
    pub where_clause: String,
    pub order: String,
    /// Empty when unlimited
    pub limit: String,
}

impl QueryParts {
    /// Assemble the full statement
    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.select, self.from);
        if !self.where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause);
        }
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order);
        }
        if !self.limit.is_empty() {
            sql.push(' ');
            sql.push_str(&self.limit);
        }
        sql
    }

    /// Statement counting the rows `to_sql` would return
    pub fn to_count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM ({}) AS counted", self.to_sql())
    }
}

/// Translate a filter into query fragments
///
/// Fails before producing any SQL if the filter does not validate.
pub fn translate(filter: &Filter, projection: Projection, dialect: &dyn Dialect) -> Result<QueryParts> {
    let plan = plan(filter)?;
    Ok(render(&plan, projection, dialect))
}

/// Build the query plan for a filter
pub fn plan(filter: &Filter) -> Result<QueryPlan> {
    let filter = filter.validate()?;
    let mut plan = QueryPlan::default();

    // Reading-level predicates
    let row_regexes = [
        ("external_id", &filter.external_id_regex),
        ("tag", &filter.tag_regex),
        ("format", &filter.format_regex),
    ];
    for (column, pattern) in row_regexes {
        if let Some(pattern) = pattern {
            plan.predicates.push(Predicate::Regex {
                column: format!("{}.{}", READINGS_ALIAS, column),
                pattern: pattern.clone(),
            });
        }
    }

    // Free-standing field regexes
    if let Some(pattern) = &filter.instrument_regex {
        let alias = plan.joins.alias_for(FIELD_INSTRUMENT, JoinKind::Inner);
        plan.predicates.push(Predicate::Regex {
            column: format!("{}.value", alias),
            pattern: pattern.clone(),
        });
    }
    for field_match in &filter.field_regexes {
        let alias = plan.joins.alias_for(&field_match.field, JoinKind::Inner);
        plan.predicates.push(Predicate::Regex {
            column: format!("{}.value", alias),
            pattern: field_match.pattern.clone(),
        });
    }

    // Value ranges
    for range in &filter.ranges {
        let alias = plan.joins.alias_for(&range.field, JoinKind::Inner);
        let column = format!("{}.value", alias);
        if let Some(min) = range.min {
            plan.predicates.push(Predicate::NumericCompare {
                column: column.clone(),
                op: CmpOp::Ge,
                value: min,
            });
        }
        if let Some(max) = range.max {
            plan.predicates.push(Predicate::NumericCompare {
                column,
                op: CmpOp::Le,
                value: max,
            });
        }
    }

    // Required fields: the inner join alone enforces presence
    for field in &filter.required_fields {
        plan.joins.alias_for(field, JoinKind::Inner);
    }

    // Insert date bounds
    let date_bounds = [
        (filter.inserted_after, CmpOp::Ge),
        (filter.inserted_before, CmpOp::Le),
    ];
    for (bound, op) in date_bounds {
        if let Some(bound) = bound {
            let alias = plan.joins.alias_for(FIELD_INSERT_TIMESTAMP, JoinKind::Inner);
            plan.predicates.push(Predicate::Compare {
                column: format!("{}.value", alias),
                op,
                value: Literal::Text(bound.format(TIMESTAMP_FORMAT).to_string()),
            });
        }
    }

    // Dummy flag
    if filter.only_dummies {
        let alias = plan.joins.alias_for(FIELD_DUMMY, JoinKind::Inner);
        plan.predicates.push(Predicate::Compare {
            column: format!("{}.value", alias),
            op: CmpOp::Eq,
            value: Literal::Text("true".to_string()),
        });
    } else if filter.exclude_dummies {
        let alias = plan.joins.alias_for(FIELD_DUMMY, JoinKind::Left);
        plan.predicates.push(Predicate::MissingOrNot {
            column: format!("{}.value", alias),
            value: Literal::Text("true".to_string()),
        });
    }

    // Ordering; r.id breaks ties so results are deterministic
    let descending = filter.latest;
    match filter.sort {
        SortKey::InsertTimestamp => {
            let alias = plan.joins.alias_for(FIELD_INSERT_TIMESTAMP, JoinKind::Left);
            plan.order.push(OrderBy {
                column: format!("{}.value", alias),
                descending,
            });
        }
        SortKey::ExternalId => plan.order.push(OrderBy {
            column: format!("{}.external_id", READINGS_ALIAS),
            descending,
        }),
        SortKey::DatabaseId => {}
    }
    plan.order.push(OrderBy {
        column: format!("{}.id", READINGS_ALIAS),
        descending,
    });

    plan.limit = filter.effective_limit();

    Ok(plan)
}

/// Render a plan to SQL fragments
pub fn render(plan: &QueryPlan, projection: Projection, dialect: &dyn Dialect) -> QueryParts {
    let select = match projection {
        Projection::Ids => format!("{}.id", READINGS_ALIAS),
        Projection::Rows => READING_COLUMNS.to_string(),
    };

    let mut from = format!("readings {}", READINGS_ALIAS);
    if !plan.joins.is_empty() {
        from.push(' ');
        from.push_str(&plan.joins.render());
    }

    let where_clause = plan
        .predicates
        .iter()
        .map(|p| p.render(dialect))
        .collect::<Vec<_>>()
        .join(" AND ");

    let order = plan
        .order
        .iter()
        .map(|o| format!("{} {}", o.column, if o.descending { "DESC" } else { "ASC" }))
        .collect::<Vec<_>>()
        .join(", ");

    let limit = plan
        .limit
        .map(|n| dialect.limit_clause(n))
        .unwrap_or_default();

    QueryParts {
        select,
        from,
        where_clause,
        order,
        limit,
    }
}

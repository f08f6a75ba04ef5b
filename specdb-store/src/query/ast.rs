//! Query plan built from a filter before it is rendered to text

use crate::dialect::{quote_literal, Dialect};

pub const READINGS_ALIAS: &str = "r";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// One aliased join of the metadata table, restricted to a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub alias: String,
    pub field: String,
    pub kind: JoinKind,
}

impl Join {
    fn render(&self) -> String {
        let keyword = match self.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        format!(
            "{keyword} metadata {a} ON {a}.owner = {r}.external_id AND {a}.field = {field}",
            keyword = keyword,
            a = self.alias,
            r = READINGS_ALIAS,
            field = quote_literal(&self.field),
        )
    }
}

/// Joins keyed by field name; one alias per distinct field
#[derive(Debug, Clone, Default)]
pub struct JoinSet {
    joins: Vec<Join>,
}

impl JoinSet {
    /// Alias for `field`, allocating a join on first use
    ///
    /// A left join is upgraded to an inner join when any caller needs the
    /// field to be present.
    pub fn alias_for(&mut self, field: &str, kind: JoinKind) -> String {
        if let Some(join) = self.joins.iter_mut().find(|j| j.field == field) {
            if kind == JoinKind::Inner {
                join.kind = JoinKind::Inner;
            }
            return join.alias.clone();
        }

        let alias = format!("m{}", self.joins.len());
        self.joins.push(Join {
            alias: alias.clone(),
            field: field.to_string(),
            kind,
        });
        alias
    }

    pub fn get(&self, field: &str) -> Option<&Join> {
        self.joins.iter().find(|j| j.field == field)
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Join> {
        self.joins.iter()
    }

    pub fn render(&self) -> String {
        self.joins
            .iter()
            .map(Join::render)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ge,
    Le,
}

impl CmpOp {
    fn as_sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Number(f64),
}

impl Literal {
    fn render(&self) -> String {
        match self {
            Literal::Text(s) => quote_literal(s),
            Literal::Number(n) => format!("{:?}", n),
        }
    }
}

/// One conjunct of the WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column` matches a regular expression
    Regex { column: String, pattern: String },
    /// String comparison against a literal
    Compare { column: String, op: CmpOp, value: Literal },
    /// Numeric comparison of a string-encoded column
    NumericCompare { column: String, op: CmpOp, value: f64 },
    /// Column absent (left join miss) or not equal to a literal
    MissingOrNot { column: String, value: Literal },
}

impl Predicate {
    pub fn render(&self, dialect: &dyn Dialect) -> String {
        match self {
            Predicate::Regex { column, pattern } => {
                dialect.regex_match(column, &quote_literal(pattern))
            }
            Predicate::Compare { column, op, value } => {
                format!("{} {} {}", column, op.as_sql(), value.render())
            }
            Predicate::NumericCompare { column, op, value } => format!(
                "{} {} {}",
                dialect.numeric(column),
                op.as_sql(),
                Literal::Number(*value).render()
            ),
            Predicate::MissingOrNot { column, value } => {
                format!("({c} IS NULL OR {c} <> {v})", c = column, v = value.render())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// Join list, predicate list, ordering and limit for one query
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    pub joins: JoinSet,
    pub predicates: Vec<Predicate>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;

    #[test]
    fn test_alias_reused_per_field() {
        let mut joins = JoinSet::default();
        let a = joins.alias_for("moisture", JoinKind::Inner);
        let b = joins.alias_for("protein", JoinKind::Inner);
        let c = joins.alias_for("moisture", JoinKind::Inner);

        assert_eq!(a, "m0");
        assert_eq!(b, "m1");
        assert_eq!(a, c);
        assert_eq!(joins.len(), 2);
    }

    #[test]
    fn test_left_join_upgraded() {
        let mut joins = JoinSet::default();
        joins.alias_for("dummy", JoinKind::Left);
        joins.alias_for("dummy", JoinKind::Inner);
        assert_eq!(joins.get("dummy").map(|j| j.kind), Some(JoinKind::Inner));

        // Inner stays inner
        joins.alias_for("dummy", JoinKind::Left);
        assert_eq!(joins.get("dummy").map(|j| j.kind), Some(JoinKind::Inner));
    }

    #[test]
    fn test_join_field_is_quoted() {
        let mut joins = JoinSet::default();
        joins.alias_for("it's", JoinKind::Inner);
        assert_eq!(
            joins.render(),
            "INNER JOIN metadata m0 ON m0.owner = r.external_id AND m0.field = 'it''s'"
        );
    }

    #[test]
    fn test_predicate_rendering() {
        let dialect = SqliteDialect;
        let p = Predicate::NumericCompare {
            column: "m0.value".to_string(),
            op: CmpOp::Ge,
            value: 5.0,
        };
        assert_eq!(p.render(&dialect), "CAST(m0.value AS REAL) >= 5.0");

        let p = Predicate::MissingOrNot {
            column: "m1.value".to_string(),
            value: Literal::Text("true".to_string()),
        };
        assert_eq!(p.render(&dialect), "(m1.value IS NULL OR m1.value <> 'true')");
    }
}

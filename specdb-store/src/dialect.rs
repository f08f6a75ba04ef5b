//! Backend dialect adapter
//!
//! Everything the translator emits is backend-neutral SQL except for the
//! fragments supplied here: the regular-expression match operator, the
//! row-limit clause and the cast used to compare string-encoded numbers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Engine-specific SQL fragments
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Short backend name (used in logs)
    fn name(&self) -> &'static str;

    /// `expr` matches the already-quoted regular expression literal `pattern`
    fn regex_match(&self, expr: &str, pattern: &str) -> String;

    /// Clause appended to a SELECT to cap the row count
    fn limit_clause(&self, limit: u64) -> String {
        format!("LIMIT {}", limit)
    }

    /// Interpret a string-encoded column as a number
    fn numeric(&self, expr: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    // REGEXP is registered on every connection (see Database::open)
    fn regex_match(&self, expr: &str, pattern: &str) -> String {
        format!("{} REGEXP {}", expr, pattern)
    }

    fn numeric(&self, expr: &str) -> String {
        format!("CAST({} AS REAL)", expr)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn regex_match(&self, expr: &str, pattern: &str) -> String {
        format!("{} ~ {}", expr, pattern)
    }

    fn numeric(&self, expr: &str) -> String {
        format!("CAST({} AS DOUBLE PRECISION)", expr)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn regex_match(&self, expr: &str, pattern: &str) -> String {
        format!("{} REGEXP {}", expr, pattern)
    }

    fn numeric(&self, expr: &str) -> String {
        format!("CAST({} AS DOUBLE)", expr)
    }
}

/// Dialect selector used in configuration files and on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
}

impl DialectKind {
    pub fn dialect(self) -> Arc<dyn Dialect> {
        match self {
            DialectKind::Sqlite => Arc::new(SqliteDialect),
            DialectKind::Postgres => Arc::new(PostgresDialect),
            DialectKind::Mysql => Arc::new(MySqlDialect),
        }
    }
}

impl std::str::FromStr for DialectKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DialectKind::Sqlite),
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "mysql" | "mariadb" => Ok(DialectKind::Mysql),
            other => Err(crate::Error::Config(format!("Unknown dialect: {}", other))),
        }
    }
}

/// Render a string as a single-quoted SQL literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_literal_escapes_quotes() {
        assert_eq!(quote_literal("abc"), "'abc'");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
        assert_eq!(quote_literal("'; DROP TABLE readings; --"), "'''; DROP TABLE readings; --'");
    }

    #[test]
    fn test_regex_operators() {
        assert_eq!(SqliteDialect.regex_match("r.tag", "'^a'"), "r.tag REGEXP '^a'");
        assert_eq!(PostgresDialect.regex_match("r.tag", "'^a'"), "r.tag ~ '^a'");
        assert_eq!(MySqlDialect.regex_match("r.tag", "'^a'"), "r.tag REGEXP '^a'");
    }

    #[test]
    fn test_limit_and_numeric() {
        assert_eq!(SqliteDialect.limit_clause(3), "LIMIT 3");
        assert_eq!(SqliteDialect.numeric("m0.value"), "CAST(m0.value AS REAL)");
        assert_eq!(PostgresDialect.numeric("m0.value"), "CAST(m0.value AS DOUBLE PRECISION)");
    }

    #[test]
    fn test_dialect_kind_parse() {
        assert_eq!("PostgreSQL".parse::<DialectKind>().unwrap(), DialectKind::Postgres);
        assert_eq!("sqlite".parse::<DialectKind>().unwrap(), DialectKind::Sqlite);
        assert!("oracle".parse::<DialectKind>().is_err());
        assert_eq!(DialectKind::Mysql.dialect().name(), "mysql");
    }
}

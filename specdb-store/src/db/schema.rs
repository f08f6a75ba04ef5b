//! Declarative table schemas
//!
//! Each table is described once in code. On open the store creates missing
//! tables from the description, then adds any column the database lacks
//! (`ALTER TABLE ADD COLUMN`). Type or constraint drift is reported but not
//! repaired.

use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

/// Column definition with SQL constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    /// SQL type (e.g., "TEXT", "INTEGER", "REAL")
    pub sql_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            primary_key: false,
            autoincrement: false,
            default_value: None,
        }
    }

    /// Mark column as INTEGER PRIMARY KEY AUTOINCREMENT
    pub fn autoincrement_key(mut self) -> Self {
        self.primary_key = true;
        self.autoincrement = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.autoincrement {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default_value {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        sql
    }
}

/// Defines the expected schema for a table
pub trait TableSchema {
    fn table_name() -> &'static str;

    /// Expected columns (order matters for new table creation)
    fn expected_columns() -> Vec<ColumnDefinition>;

    /// Table-level constraints such as composite keys
    fn table_constraints() -> Vec<&'static str> {
        Vec::new()
    }

    /// (index name, column list)
    fn indices() -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }

    fn create_sql() -> String {
        let mut parts: Vec<String> = Self::expected_columns().iter().map(|c| c.to_sql()).collect();
        parts.extend(Self::table_constraints().iter().map(|c| c.to_string()));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            Self::table_name(),
            parts.join(", ")
        )
    }
}

/// Primary table: one row per reading
pub struct ReadingsTable;

impl TableSchema for ReadingsTable {
    fn table_name() -> &'static str {
        "readings"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("id", "INTEGER").autoincrement_key(),
            ColumnDefinition::new("external_id", "TEXT").not_null(),
            // Classification tag
            ColumnDefinition::new("tag", "TEXT"),
            ColumnDefinition::new("format", "TEXT").not_null().default("'NIR'"),
            ColumnDefinition::new("points", "TEXT").not_null().default("''"),
        ]
    }

    fn table_constraints() -> Vec<&'static str> {
        vec!["UNIQUE (external_id, format)"]
    }

    fn indices() -> Vec<(&'static str, &'static str)> {
        vec![("idx_readings_external_id", "external_id")]
    }
}

/// EAV metadata table keyed by the reading's external id
pub struct MetadataTable;

impl TableSchema for MetadataTable {
    fn table_name() -> &'static str {
        "metadata"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("owner", "TEXT").not_null(),
            ColumnDefinition::new("field", "TEXT").not_null(),
            // S = string, N = numeric, B = boolean
            ColumnDefinition::new("type", "TEXT").not_null().default("'S'"),
            ColumnDefinition::new("value", "TEXT"),
        ]
    }

    fn table_constraints() -> Vec<&'static str> {
        vec!["PRIMARY KEY (owner, field)"]
    }

    fn indices() -> Vec<(&'static str, &'static str)> {
        vec![("idx_metadata_field", "field")]
    }
}

/// Column as reported by `PRAGMA table_info`
#[derive(Debug, Clone)]
pub struct ActualColumn {
    pub name: String,
    pub type_name: String,
}

/// Creates and synchronizes table schemas
pub struct SchemaSync;

impl SchemaSync {
    /// Create the table if missing, add missing columns, create indices
    pub async fn ensure_table<T: TableSchema>(pool: &SqlitePool) -> Result<()> {
        sqlx::query(&T::create_sql()).execute(pool).await?;
        Self::sync_columns::<T>(pool).await?;

        for (name, columns) in T::indices() {
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                name,
                T::table_name(),
                columns
            );
            sqlx::query(&sql).execute(pool).await?;
        }

        Ok(())
    }

    /// Read actual columns from a table
    pub async fn introspect(pool: &SqlitePool, table_name: &str) -> Result<Vec<ActualColumn>> {
        let query = format!("PRAGMA table_info({})", table_name);
        let rows = sqlx::query(&query).fetch_all(pool).await?;

        Ok(rows
            .iter()
            .map(|row| ActualColumn {
                name: row.get("name"),
                type_name: row.get("type"),
            })
            .collect())
    }

    /// Add columns present in the definition but missing from the database
    ///
    /// Returns the number of columns added.
    pub async fn sync_columns<T: TableSchema>(pool: &SqlitePool) -> Result<usize> {
        let table_name = T::table_name();
        let actual = Self::introspect(pool, table_name).await?;
        let mut added = 0;

        for expected in T::expected_columns() {
            match actual.iter().find(|c| c.name == expected.name) {
                Some(column) => {
                    if !column.type_name.eq_ignore_ascii_case(&expected.sql_type) {
                        warn!(
                            table = table_name,
                            column = %expected.name,
                            expected = %expected.sql_type,
                            actual = %column.type_name,
                            "Column type drift (requires manual migration)"
                        );
                    }
                }
                None => {
                    // ALTER TABLE cannot add PRIMARY KEY columns
                    let mut column = expected.clone();
                    column.primary_key = false;
                    column.autoincrement = false;
                    if column.not_null && column.default_value.is_none() {
                        warn!(
                            table = table_name,
                            column = %column.name,
                            "Adding NOT NULL column without default as nullable"
                        );
                        column.not_null = false;
                    }

                    let sql = format!("ALTER TABLE {} ADD COLUMN {}", table_name, column.to_sql());
                    sqlx::query(&sql).execute(pool).await?;
                    info!(table = table_name, column = %column.name, "Added missing column");
                    added += 1;
                }
            }
        }

        debug!(table = table_name, added, "Schema sync complete");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readings_create_sql() {
        assert_eq!(
            ReadingsTable::create_sql(),
            "CREATE TABLE IF NOT EXISTS readings (id INTEGER PRIMARY KEY AUTOINCREMENT, \
             external_id TEXT NOT NULL, tag TEXT, format TEXT NOT NULL DEFAULT 'NIR', \
             points TEXT NOT NULL DEFAULT '', UNIQUE (external_id, format))"
        );
    }

    #[test]
    fn test_metadata_create_sql() {
        let sql = MetadataTable::create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS metadata (owner TEXT NOT NULL"));
        assert!(sql.ends_with("PRIMARY KEY (owner, field))"));
    }

    #[tokio::test]
    async fn test_sync_adds_missing_column() {
        // One connection: every in-memory connection is a separate database
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        // Old layout without the tag column
        sqlx::query(
            "CREATE TABLE readings (id INTEGER PRIMARY KEY AUTOINCREMENT, external_id TEXT NOT NULL, \
             format TEXT NOT NULL DEFAULT 'NIR', points TEXT NOT NULL DEFAULT '', \
             UNIQUE (external_id, format))",
        )
        .execute(&pool)
        .await
        .unwrap();

        SchemaSync::ensure_table::<ReadingsTable>(&pool).await.unwrap();

        let columns = SchemaSync::introspect(&pool, "readings").await.unwrap();
        assert!(columns.iter().any(|c| c.name == "tag"));

        // Second run is a no-op
        let added = SchemaSync::sync_columns::<ReadingsTable>(&pool).await.unwrap();
        assert_eq!(added, 0);
    }
}

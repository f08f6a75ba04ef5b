//! EAV metadata table
//!
//! One row per (owner, field) with a one-letter type tag and a
//! string-encoded value. The owner is the reading's external id.

use crate::metadata::{now_timestamp, FieldType, FieldValue, MetadataRecord, FIELD_INSERT_TIMESTAMP};
use crate::Result;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, error};

/// Rows per multi-row INSERT (4 bind parameters each)
const INSERT_CHUNK: usize = 200;

/// Handle to the metadata table
#[derive(Debug, Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load every field stored for `owner`
    ///
    /// A value that does not parse under its declared type is returned as
    /// text (and logged); it does not fail the load.
    pub async fn load(&self, owner: &str) -> Result<MetadataRecord> {
        let mut conn = self.pool.acquire().await?;
        load_on(&mut conn, owner).await
    }

    /// Merge `record` into the stored fields for `owner`
    ///
    /// Existing fields are updated, new ones inserted; fields not mentioned
    /// in `record` are left alone. Reserved fields are skipped.
    pub async fn store(&self, owner: &str, record: &MetadataRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        store_on(&mut tx, owner, record)
            .await
            .inspect_err(|e| error!(owner, "Failed to store metadata: {}", e))?;
        tx.commit().await?;
        Ok(())
    }

    /// Whether any field is stored for `owner`
    pub async fn exists(&self, owner: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM metadata WHERE owner = ?)")
                .bind(owner)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    pub async fn has_field(&self, owner: &str, field: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM metadata WHERE owner = ? AND field = ?)",
        )
        .bind(owner)
        .bind(field)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Point lookup of one field
    pub async fn get_field(&self, owner: &str, field: &str) -> Result<Option<FieldValue>> {
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT type, value FROM metadata WHERE owner = ? AND field = ?")
                .bind(owner)
                .bind(field)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(tag, value)| {
            FieldValue::decode_lossy(owner, field, &tag, value.as_deref().unwrap_or(""))
        }))
    }

    /// Distinct (field name, type) pairs across all owners
    pub async fn field_names(&self) -> Result<Vec<(String, FieldType)>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT DISTINCT field, type FROM metadata ORDER BY field, type")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(field, tag)| {
                let field_type = FieldType::from_tag(&tag).unwrap_or(FieldType::Text);
                (field, field_type)
            })
            .collect())
    }

    /// Distinct stored values of one field
    pub async fn field_values(&self, field: &str) -> Result<Vec<String>> {
        let values: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT value FROM metadata WHERE field = ? AND value IS NOT NULL ORDER BY value",
        )
        .bind(field)
        .fetch_all(&self.pool)
        .await?;
        Ok(values)
    }

    /// Distinct owners with at least one field
    pub async fn owners(&self) -> Result<Vec<String>> {
        let owners: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT owner FROM metadata ORDER BY owner")
                .fetch_all(&self.pool)
                .await?;
        Ok(owners)
    }

    /// Delete one field; returns whether it existed
    pub async fn delete_field(&self, owner: &str, field: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM metadata WHERE owner = ? AND field = ?")
            .bind(owner)
            .bind(field)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all fields of `owner`; returns the number removed
    pub async fn delete(&self, owner: &str) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        delete_on(&mut conn, owner).await
    }
}

/// Load `owner`'s fields on an existing connection
pub(crate) async fn load_on(conn: &mut SqliteConnection, owner: &str) -> Result<MetadataRecord> {
    let rows: Vec<(String, String, Option<String>)> =
        sqlx::query_as("SELECT field, type, value FROM metadata WHERE owner = ?")
            .bind(owner)
            .fetch_all(&mut *conn)
            .await
            .inspect_err(|e| error!(owner, "Failed to load metadata: {}", e))?;

    Ok(rows
        .into_iter()
        .map(|(field, tag, value)| {
            let value = FieldValue::decode_lossy(owner, &field, &tag, value.as_deref().unwrap_or(""));
            (field, value)
        })
        .collect())
}

/// Merge `record` into the stored set on an existing connection
pub(crate) async fn store_on(
    conn: &mut SqliteConnection,
    owner: &str,
    record: &MetadataRecord,
) -> Result<()> {
    let existing: HashSet<String> =
        sqlx::query_scalar::<_, String>("SELECT field FROM metadata WHERE owner = ?")
            .bind(owner)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .collect();

    let timestamp = FieldValue::Text(now_timestamp());
    let mut updates: Vec<(&str, &FieldValue)> = Vec::new();
    let mut inserts: Vec<(&str, &str, &FieldValue)> = Vec::new();

    for (field, value) in record.persistable() {
        if existing.contains(field) {
            updates.push((field.as_str(), value));
        } else {
            inserts.push((owner, field.as_str(), value));
        }
    }

    if !record.contains(FIELD_INSERT_TIMESTAMP) && !existing.contains(FIELD_INSERT_TIMESTAMP) {
        inserts.push((owner, FIELD_INSERT_TIMESTAMP, &timestamp));
    }

    for (field, value) in &updates {
        sqlx::query("UPDATE metadata SET type = ?, value = ? WHERE owner = ? AND field = ?")
            .bind(value.field_type().tag())
            .bind(value.encode())
            .bind(owner)
            .bind(*field)
            .execute(&mut *conn)
            .await?;
    }

    insert_rows(conn, &inserts).await?;

    debug!(owner, updated = updates.len(), inserted = inserts.len(), "Stored metadata");
    Ok(())
}

/// Fields written for a fresh owner: persistable fields plus an insert
/// timestamp when the record lacks one
pub(crate) fn fields_for_insert(record: &MetadataRecord) -> Vec<(String, FieldValue)> {
    let mut fields: Vec<(String, FieldValue)> = record
        .persistable()
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();

    if !record.contains(FIELD_INSERT_TIMESTAMP) {
        fields.push((FIELD_INSERT_TIMESTAMP.to_string(), FieldValue::Text(now_timestamp())));
    }
    fields
}

/// Insert (owner, field, value) rows with multi-row statements
pub(crate) async fn insert_rows(
    conn: &mut SqliteConnection,
    rows: &[(&str, &str, &FieldValue)],
) -> Result<()> {
    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO metadata (owner, field, type, value) ");
        builder.push_values(chunk, |mut b, (owner, field, value)| {
            b.push_bind(*owner)
                .push_bind(*field)
                .push_bind(value.field_type().tag())
                .push_bind(value.encode());
        });
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

pub(crate) async fn delete_on(conn: &mut SqliteConnection, owner: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM metadata WHERE owner = ?")
        .bind(owner)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

//! Primary reading table
//!
//! One row per reading: surrogate key, external id, classification tag,
//! format tag and the encoded point list. (external id, format) is unique.

use crate::db::cursor::ReadingCursor;
use crate::db::metadata_table::{self, MetadataStore};
use crate::db::Database;
use crate::filter::Filter;
use crate::query::{translate, Projection, READING_COLUMNS};
use crate::reading::{decode_points, Reading};
use crate::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, error, info};

/// Handle to the reading table
#[derive(Debug, Clone)]
pub struct ReadingStore {
    db: Database,
    metadata: MetadataStore,
}

impl ReadingStore {
    pub fn new(db: Database, metadata: MetadataStore) -> Self {
        Self { db, metadata }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Insert a new reading and merge its metadata
    ///
    /// Rejects a reading whose (external id, format) is already stored with
    /// [`Error::Duplicate`]. Returns the assigned surrogate key.
    pub async fn insert(&self, reading: &Reading) -> Result<i64> {
        reading.check().map_err(Error::Data)?;

        let mut tx = self.db.pool().begin().await?;
        let id = insert_row(&mut tx, reading).await.map_err(|e| match e {
            Error::Database(ref db_err) if Error::is_unique_violation(db_err) => Error::Duplicate {
                external_id: reading.external_id.clone(),
                format: reading.format.clone(),
            },
            other => {
                error!(external_id = %reading.external_id, "Failed to insert reading: {}", other);
                other
            }
        })?;
        metadata_table::store_on(&mut tx, &reading.external_id, &reading.metadata).await?;
        tx.commit().await?;

        debug!(id, external_id = %reading.external_id, format = %reading.format, "Inserted reading");
        Ok(id)
    }

    /// Replace a reading (delete then insert), including its metadata
    ///
    /// Metadata fields not present in `reading` are discarded.
    pub async fn replace(&self, reading: &Reading) -> Result<i64> {
        reading.check().map_err(Error::Data)?;

        let mut tx = self.db.pool().begin().await?;
        delete_by_identity(&mut tx, &reading.external_id, &reading.format).await?;
        let id = insert_row(&mut tx, reading).await?;

        let fields = metadata_table::fields_for_insert(&reading.metadata);
        let rows: Vec<(&str, &str, _)> = fields
            .iter()
            .map(|(field, value)| (reading.external_id.as_str(), field.as_str(), value))
            .collect();
        metadata_table::insert_rows(&mut tx, &rows).await?;
        tx.commit().await?;

        debug!(id, external_id = %reading.external_id, "Replaced reading");
        Ok(id)
    }

    /// Load a reading by surrogate key
    pub async fn load(&self, id: i64) -> Result<Option<Reading>> {
        let sql = format!("SELECT {} FROM readings r WHERE r.id = ?", READING_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await
            .inspect_err(|e| error!(id, "Failed to load reading: {}", e))?;

        match row {
            Some(row) => Ok(Some(self.materialize(&row).await?)),
            None => Ok(None),
        }
    }

    /// Load a reading by (external id, format)
    pub async fn load_by_external_id(&self, external_id: &str, format: &str) -> Result<Option<Reading>> {
        let sql = format!(
            "SELECT {} FROM readings r WHERE r.external_id = ? AND r.format = ?",
            READING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(external_id)
            .bind(format)
            .fetch_optional(self.db.pool())
            .await?;

        match row {
            Some(row) => Ok(Some(self.materialize(&row).await?)),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM readings WHERE id = ?)")
            .bind(id)
            .fetch_one(self.db.pool())
            .await?;
        Ok(exists)
    }

    pub async fn exists_external(&self, external_id: &str, format: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM readings WHERE external_id = ? AND format = ?)",
        )
        .bind(external_id)
        .bind(format)
        .fetch_one(self.db.pool())
        .await?;
        Ok(exists)
    }

    /// Delete a reading; with `cascade` its metadata goes too
    ///
    /// Returns whether a reading was removed.
    pub async fn delete(&self, id: i64, cascade: bool) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let external_id: Option<String> =
            sqlx::query_scalar("SELECT external_id FROM readings WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(external_id) = external_id else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM readings WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let mut fields_removed = 0;
        if cascade {
            fields_removed = metadata_table::delete_on(&mut tx, &external_id).await?;
        }
        tx.commit().await?;

        info!(id, external_id = %external_id, fields_removed, "Deleted reading");
        Ok(true)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// Distinct format tags in use
    pub async fn formats(&self) -> Result<Vec<String>> {
        let formats: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT format FROM readings ORDER BY format")
                .fetch_all(self.db.pool())
                .await?;
        Ok(formats)
    }

    /// Materialized list of readings matching `filter`
    pub async fn query(&self, filter: &Filter) -> Result<Vec<Reading>> {
        let sql = translate(filter, Projection::Rows, self.db.dialect())?.to_sql();
        debug!(sql = %sql, "Querying readings");

        let rows = sqlx::query(&sql)
            .fetch_all(self.db.pool())
            .await
            .inspect_err(|e| error!(sql = %sql, "Reading query failed: {}", e))?;

        let mut readings = Vec::with_capacity(rows.len());
        for row in &rows {
            readings.push(self.materialize(row).await?);
        }
        Ok(readings)
    }

    /// Surrogate keys of readings matching `filter`
    pub async fn query_ids(&self, filter: &Filter) -> Result<Vec<i64>> {
        let sql = translate(filter, Projection::Ids, self.db.dialect())?.to_sql();
        debug!(sql = %sql, "Querying reading ids");

        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .fetch_all(self.db.pool())
            .await
            .inspect_err(|e| error!(sql = %sql, "Reading id query failed: {}", e))?;
        Ok(ids)
    }

    /// Lazily consumed cursor over readings matching `filter`
    ///
    /// With `dedicated` the rows are read over a private connection that
    /// is closed together with the cursor.
    pub async fn stream(&self, filter: &Filter, dedicated: bool) -> Result<ReadingCursor> {
        ReadingCursor::open(self, filter, dedicated).await
    }

    /// Build a full reading from a row plus its stored metadata
    async fn materialize(&self, row: &SqliteRow) -> Result<Reading> {
        let mut reading = reading_from_row(row)?;
        reading.metadata = self.metadata.load(&reading.external_id).await?;
        reading.attach_indicators();
        Ok(reading)
    }
}

/// Build a full reading, loading its metadata over `conn`
pub(crate) async fn materialize_on(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<Reading> {
    let mut reading = reading_from_row(row)?;
    reading.metadata = metadata_table::load_on(conn, &reading.external_id).await?;
    reading.attach_indicators();
    Ok(reading)
}

/// Map a `READING_COLUMNS` row (metadata left empty)
pub(crate) fn reading_from_row(row: &SqliteRow) -> Result<Reading> {
    let points: String = row.try_get("points")?;
    Ok(Reading {
        id: Some(row.try_get("id")?),
        external_id: row.try_get("external_id")?,
        tag: row.try_get("tag")?,
        format: row.try_get("format")?,
        points: decode_points(&points),
        metadata: Default::default(),
    })
}

pub(crate) async fn insert_row(conn: &mut SqliteConnection, reading: &Reading) -> Result<i64> {
    let result =
        sqlx::query("INSERT INTO readings (external_id, tag, format, points) VALUES (?, ?, ?, ?)")
            .bind(&reading.external_id)
            .bind(&reading.tag)
            .bind(&reading.format)
            .bind(reading.encoded_points())
            .execute(&mut *conn)
            .await?;
    Ok(result.last_insert_rowid())
}

/// Delete the reading row and every metadata field of its owner
pub(crate) async fn delete_by_identity(
    conn: &mut SqliteConnection,
    external_id: &str,
    format: &str,
) -> Result<()> {
    sqlx::query("DELETE FROM readings WHERE external_id = ? AND format = ?")
        .bind(external_id)
        .bind(format)
        .execute(&mut *conn)
        .await?;
    metadata_table::delete_on(conn, external_id).await?;
    Ok(())
}

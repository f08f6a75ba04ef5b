//! Batched bulk upsert with checkpoints and cooperative cancellation
//!
//! Each reading is staged as a delete (by external id + format, metadata
//! included) followed by an insert of the new row and its fields. Every
//! `batch_size` staged readings form a checkpoint: the delete batch and the
//! insert batch are executed and, unless auto-commit is on, committed
//! together. A stop request is honoured before the next reading is staged;
//! checkpoints already committed are kept and the partial batch is not
//! flushed.
//!
//! The upsert is a full replace: metadata fields of the old reading that the
//! new record does not carry are gone afterwards.

use crate::db::metadata_table::{fields_for_insert, insert_rows};
use crate::db::monitor::{ConnectionHandle, MonitoredTransaction};
use crate::db::reading_table::{delete_by_identity, ReadingStore};
use crate::metadata::FieldValue;
use crate::reading::Reading;
use crate::Result;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 500;

const CALLER: &str = "bulk_write";

/// Rows per multi-row reading INSERT (4 bind parameters each)
const INSERT_CHUNK: usize = 200;

/// Outcome of a bulk write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteReport {
    /// Readings that passed validation and were staged
    pub staged: usize,
    /// Readings in committed checkpoints
    pub committed: usize,
    /// Readings rejected at staging or lost in a failed checkpoint
    pub failed: usize,
    /// A stop request was observed
    pub stopped: bool,
}

impl BulkWriteReport {
    /// True when nothing failed and the write was not stopped
    pub fn success(&self) -> bool {
        self.failed == 0 && !self.stopped
    }
}

/// Bulk writer bound to a reading store
#[derive(Debug, Clone)]
pub struct BulkWriter<'a> {
    store: &'a ReadingStore,
    batch_size: usize,
    auto_commit: bool,
    dedicated_connection: bool,
}

impl<'a> BulkWriter<'a> {
    pub fn new(store: &'a ReadingStore) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            auto_commit: false,
            dedicated_connection: false,
        }
    }

    /// Readings per checkpoint (at least 1)
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Commit each statement on its own instead of once per checkpoint
    pub fn auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    /// Write over a private connection rather than one from the shared pool
    pub fn dedicated_connection(mut self, dedicated: bool) -> Self {
        self.dedicated_connection = dedicated;
        self
    }

    /// Replace every reading in `readings`
    pub async fn write(&self, readings: &[Reading], cancel: &CancellationToken) -> BulkWriteReport {
        self.write_with_progress(readings, cancel, |_| {}).await
    }

    /// As [`write`](Self::write), calling `progress` with the staged count
    /// after each reading is staged
    pub async fn write_with_progress<F>(
        &self,
        readings: &[Reading],
        cancel: &CancellationToken,
        mut progress: F,
    ) -> BulkWriteReport
    where
        F: FnMut(usize),
    {
        let mut report = BulkWriteReport::default();

        let mut conn = match ConnectionHandle::acquire(
            self.store.database(),
            self.dedicated_connection,
            CALLER,
        )
        .await
        {
            Ok(conn) => conn,
            Err(e) => {
                error!("Bulk write could not acquire a connection: {}", e);
                report.failed = readings.len();
                return report;
            }
        };

        info!(
            total = readings.len(),
            batch_size = self.batch_size,
            auto_commit = self.auto_commit,
            dedicated = conn.is_dedicated(),
            "Bulk write started"
        );

        let mut batch: Vec<&Reading> = Vec::with_capacity(self.batch_size);

        for reading in readings {
            if cancel.is_cancelled() {
                report.stopped = true;
                break;
            }

            if let Err(reason) = reading.check() {
                warn!("Skipping reading: {}", reason);
                report.failed += 1;
                continue;
            }

            batch.push(reading);
            report.staged += 1;
            progress(report.staged);

            if batch.len() >= self.batch_size {
                self.checkpoint(&mut conn, &batch, &mut report).await;
                batch.clear();
            }
        }

        if report.stopped {
            warn!(
                committed = report.committed,
                unflushed = batch.len(),
                "Bulk write stopped; partial batch not committed"
            );
        } else if !batch.is_empty() {
            self.checkpoint(&mut conn, &batch, &mut report).await;
        }

        conn.release(CALLER).await;

        info!(
            staged = report.staged,
            committed = report.committed,
            failed = report.failed,
            stopped = report.stopped,
            "Bulk write finished"
        );
        report
    }

    /// Execute and (unless auto-committing) commit one batch
    async fn checkpoint(
        &self,
        conn: &mut SqliteConnection,
        batch: &[&Reading],
        report: &mut BulkWriteReport,
    ) {
        let result = if self.auto_commit {
            execute_batch(conn, batch).await
        } else {
            commit_batch(conn, batch).await
        };

        match result {
            Ok(()) => {
                report.committed += batch.len();
                debug!(size = batch.len(), committed = report.committed, "Checkpoint committed");
            }
            Err(e) => {
                error!(size = batch.len(), "Checkpoint failed: {}", e);
                report.failed += batch.len();
            }
        }
    }
}

async fn commit_batch(conn: &mut SqliteConnection, batch: &[&Reading]) -> Result<()> {
    let mut tx = MonitoredTransaction::begin(conn, CALLER).await?;
    match execute_batch(&mut tx, batch).await {
        Ok(()) => tx.commit().await,
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback after failed checkpoint failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}

/// Run the delete batch then the insert batch
///
/// Within one batch the last reading for an (external id, format) wins, and
/// the last reading for an external id supplies that owner's metadata.
async fn execute_batch(conn: &mut SqliteConnection, batch: &[&Reading]) -> Result<()> {
    let mut last_row: HashMap<(&str, &str), usize> = HashMap::new();
    let mut last_owner: HashMap<&str, usize> = HashMap::new();
    for (index, reading) in batch.iter().enumerate() {
        last_row.insert((reading.external_id.as_str(), reading.format.as_str()), index);
        last_owner.insert(reading.external_id.as_str(), index);
    }

    let rows: Vec<&Reading> = batch
        .iter()
        .enumerate()
        .filter(|(index, r)| last_row.get(&(r.external_id.as_str(), r.format.as_str())) == Some(index))
        .map(|(_, r)| *r)
        .collect();

    for reading in &rows {
        delete_by_identity(conn, &reading.external_id, &reading.format).await?;
    }

    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO readings (external_id, tag, format, points) ");
        builder.push_values(chunk, |mut b, reading| {
            b.push_bind(reading.external_id.as_str())
                .push_bind(reading.tag.as_deref())
                .push_bind(reading.format.as_str())
                .push_bind(reading.encoded_points());
        });
        builder.build().execute(&mut *conn).await?;
    }

    let fields: Vec<(&str, Vec<(String, FieldValue)>)> = batch
        .iter()
        .enumerate()
        .filter(|(index, r)| last_owner.get(r.external_id.as_str()) == Some(index))
        .map(|(_, r)| (r.external_id.as_str(), fields_for_insert(&r.metadata)))
        .collect();
    let field_rows: Vec<(&str, &str, &FieldValue)> = fields
        .iter()
        .flat_map(|(owner, fields)| {
            fields
                .iter()
                .map(move |(field, value)| (*owner, field.as_str(), value))
        })
        .collect();
    insert_rows(conn, &field_rows).await?;

    Ok(())
}

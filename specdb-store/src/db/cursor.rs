//! Forward-only streaming cursor over query results
//!
//! Rows are pulled one at a time from a live `sqlx` fetch stream and turned
//! into [`Reading`]s (metadata loaded per row, on a second connection) only
//! when asked for. The cursor is not restartable: once the stream is
//! exhausted it is released and never re-queried.
//!
//! ```rust,ignore
//! let mut cursor = tables.readings.stream(&filter, false).await?;
//! while cursor.has_next().await? {
//!     let reading = cursor.next()?;
//!     // ...
//! }
//! cursor.close().await;
//! ```

use crate::db::monitor::ConnectionHandle;
use crate::db::reading_table::{self, ReadingStore};
use crate::db::Database;
use crate::filter::Filter;
use crate::query::{translate, Projection};
use crate::reading::Reading;
use crate::{Error, Result};
use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::SqliteRow;
use tracing::{debug, error, warn};

const CALLER: &str = "reading_cursor";

type RowStream = BoxStream<'static, std::result::Result<SqliteRow, sqlx::Error>>;

/// Lazy, forward-only sequence of readings
///
/// Holds two connections while open: one streaming the rows and one for
/// the per-row metadata lookups.
pub struct ReadingCursor {
    rows: Option<RowStream>,
    metadata_conn: Option<ConnectionHandle>,
    pending: Option<Reading>,
    row_count: i64,
    dedicated: bool,
    exhausted: bool,
    closed: bool,
}

impl ReadingCursor {
    /// Run the filter's query and position the cursor before the first row
    pub(crate) async fn open(store: &ReadingStore, filter: &Filter, dedicated: bool) -> Result<Self> {
        let db = store.database();
        let parts = translate(filter, Projection::Rows, db.dialect())?;
        let sql = parts.to_sql();

        let row_count = probe_row_count(db, &parts.to_count_sql()).await;

        let rows_conn = ConnectionHandle::acquire(db, dedicated, CALLER).await?;
        let dedicated = rows_conn.is_dedicated();
        let metadata_conn = match metadata_connection(db).await {
            Ok(conn) => conn,
            Err(e) => {
                rows_conn.release(CALLER).await;
                return Err(e);
            }
        };

        debug!(
            sql = %sql,
            row_count,
            dedicated,
            metadata_dedicated = metadata_conn.is_dedicated(),
            "Opened reading cursor"
        );

        Ok(Self {
            rows: Some(open_rows(rows_conn, sql)),
            metadata_conn: Some(metadata_conn),
            pending: None,
            row_count,
            dedicated,
            exhausted: false,
            closed: false,
        })
    }

    /// Whether another reading is available
    ///
    /// Pulls and materializes the next row if none is cached. Exhaustion
    /// releases both connections immediately.
    pub async fn has_next(&mut self) -> Result<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }
        let (Some(rows), Some(conn)) = (self.rows.as_mut(), self.metadata_conn.as_mut()) else {
            return Ok(false);
        };

        let next = rows.next().await;
        match next {
            Some(Ok(row)) => {
                let reading = reading_table::materialize_on(conn, &row).await;
                match reading {
                    Ok(reading) => {
                        self.pending = Some(reading);
                        Ok(true)
                    }
                    Err(e) => {
                        error!("Failed to materialize reading: {}", e);
                        self.release().await;
                        Err(e)
                    }
                }
            }
            Some(Err(e)) => {
                error!("Cursor fetch failed: {}", e);
                self.release().await;
                Err(e.into())
            }
            None => {
                self.exhausted = true;
                self.release().await;
                Ok(false)
            }
        }
    }

    /// The reading found by the last successful [`has_next`](Self::has_next)
    ///
    /// Fails with [`Error::EndOfSequence`] if nothing is pending.
    pub fn next(&mut self) -> Result<Reading> {
        self.pending.take().ok_or(Error::EndOfSequence)
    }

    /// Total rows reported at open time; `-1` if the probe failed
    pub fn row_count(&self) -> i64 {
        self.row_count
    }

    /// Whether the rows were read over a private connection
    pub fn is_dedicated(&self) -> bool {
        self.dedicated
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the rows and both connections (idempotent)
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.release().await;
        self.pending = None;
        self.closed = true;
        debug!("Reading cursor closed");
    }

    // Dropping the stream returns or drops the rows connection
    async fn release(&mut self) {
        self.rows = None;
        if let Some(conn) = self.metadata_conn.take() {
            conn.release(CALLER).await;
        }
    }
}

/// Second connection for metadata lookups while the rows connection is busy
///
/// Takes an idle pooled connection, else grows the pool if it has room,
/// else opens a private connection so a saturated pool cannot block the
/// cursor on itself.
async fn metadata_connection(db: &Database) -> Result<ConnectionHandle> {
    let pool = db.pool();
    if let Some(conn) = pool.try_acquire() {
        return Ok(ConnectionHandle::Shared(conn));
    }
    if pool.size() < pool.options().get_max_connections() {
        return Ok(ConnectionHandle::Shared(pool.acquire().await?));
    }
    debug!(caller = CALLER, "Pool saturated, opening private metadata connection");
    Ok(ConnectionHandle::Dedicated(db.open_dedicated().await?))
}

/// Count the rows the query will return; `-1` when the probe fails
async fn probe_row_count(db: &Database, count_sql: &str) -> i64 {
    match sqlx::query_scalar::<_, i64>(count_sql).fetch_one(db.pool()).await {
        Ok(count) => count,
        Err(e) => {
            warn!("Row count probe failed, reporting unknown: {}", e);
            -1
        }
    }
}

fn open_rows(mut conn: ConnectionHandle, sql: String) -> RowStream {
    Box::pin(async_stream::stream! {
        {
            let mut rows = sqlx::query(&sql).fetch(&mut *conn);
            while let Some(row) = rows.next().await {
                yield row;
            }
        }
        conn.release(CALLER).await;
    })
}

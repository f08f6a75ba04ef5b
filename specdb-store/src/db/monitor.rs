//! Connection acquisition and monitored transactions
//!
//! Long-running writes either borrow a connection from the shared pool or
//! open a private one. Transactions are wrapped so that the time a
//! connection is held is logged on commit, rollback or drop.

use crate::db::Database;
use crate::Result;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Sqlite, SqliteConnection, Transaction};
use std::ops::{Deref, DerefMut};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Connection used for one call: pooled or private
pub enum ConnectionHandle {
    Shared(PoolConnection<Sqlite>),
    Dedicated(SqliteConnection),
}

impl ConnectionHandle {
    /// Acquire a connection; a private one when `dedicated` is set
    ///
    /// Failure to open a private connection falls back to the shared pool.
    pub async fn acquire(db: &Database, dedicated: bool, caller: &'static str) -> Result<Self> {
        let start = Instant::now();

        if dedicated {
            match db.open_dedicated().await {
                Ok(conn) => {
                    debug!(caller, wait_ms = start.elapsed().as_millis() as u64, "Dedicated connection opened");
                    return Ok(ConnectionHandle::Dedicated(conn));
                }
                Err(e) => {
                    warn!(caller, "Failed to open dedicated connection, using shared pool: {}", e);
                }
            }
        }

        let conn = db.pool().acquire().await?;
        let wait_ms = start.elapsed().as_millis() as u64;
        if wait_ms > 1000 {
            warn!(caller, wait_ms, "Slow connection acquisition - pool may be saturated");
        } else {
            debug!(caller, wait_ms, "Connection acquired");
        }
        Ok(ConnectionHandle::Shared(conn))
    }

    pub fn is_dedicated(&self) -> bool {
        matches!(self, ConnectionHandle::Dedicated(_))
    }

    /// Return a pooled connection or close a private one
    pub async fn release(self, caller: &'static str) {
        match self {
            ConnectionHandle::Shared(conn) => drop(conn),
            ConnectionHandle::Dedicated(conn) => {
                if let Err(e) = conn.close().await {
                    warn!(caller, "Error closing dedicated connection: {}", e);
                } else {
                    debug!(caller, "Dedicated connection closed");
                }
            }
        }
    }
}

impl Deref for ConnectionHandle {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match self {
            ConnectionHandle::Shared(conn) => conn,
            ConnectionHandle::Dedicated(conn) => conn,
        }
    }
}

impl DerefMut for ConnectionHandle {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match self {
            ConnectionHandle::Shared(conn) => conn,
            ConnectionHandle::Dedicated(conn) => conn,
        }
    }
}

/// Transaction wrapper that logs how long the connection was held
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    started_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    /// Begin a transaction on `conn`
    pub async fn begin(conn: &'c mut SqliteConnection, caller: &'static str) -> Result<Self> {
        let tx = conn.begin().await?;
        Ok(Self {
            tx: Some(tx),
            caller,
            started_at: Instant::now(),
        })
    }

    pub async fn commit(mut self) -> Result<()> {
        let tx = self.take();
        tx.commit().await?;
        self.log_release("commit");
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        let tx = self.take();
        tx.rollback().await?;
        self.log_release("rollback");
        Ok(())
    }

    fn take(&mut self) -> Transaction<'c, Sqlite> {
        self.tx.take().expect("Transaction already consumed")
    }

    fn log_release(&self, how: &'static str) {
        let held_ms = self.started_at.elapsed().as_millis() as u64;
        if held_ms > 2000 {
            warn!(caller = self.caller, held_ms, how, "Long transaction");
        } else if held_ms > 1000 {
            info!(caller = self.caller, held_ms, how, "Transaction held longer than expected (>1s)");
        } else {
            debug!(caller = self.caller, held_ms, how, "Transaction finished");
        }
    }
}

impl Deref for MonitoredTransaction<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        self.tx.as_ref().expect("Transaction already consumed")
    }
}

impl DerefMut for MonitoredTransaction<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        self.tx.as_mut().expect("Transaction already consumed")
    }
}

impl Drop for MonitoredTransaction<'_> {
    fn drop(&mut self) {
        // Still present: neither committed nor rolled back, sqlx rolls back on drop
        if self.tx.is_some() {
            self.log_release("drop");
        }
    }
}

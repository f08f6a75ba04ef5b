//! Per-database table handle registry
//!
//! One `Registry` is created at startup and passed by reference to whatever
//! needs table handles. The first request for a database builds its
//! [`Tables`]; later requests get the same handles back.

use crate::db::{Database, MetadataStore, ReadingStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Table handles bound to one database
///
/// Handles only delegate to the database; they cache no per-request data.
#[derive(Debug, Clone)]
pub struct Tables {
    pub readings: ReadingStore,
    pub metadata: MetadataStore,
}

impl Tables {
    pub fn new(db: &Database) -> Self {
        let metadata = MetadataStore::new(db.pool().clone());
        let readings = ReadingStore::new(db.clone(), metadata.clone());
        Self { readings, metadata }
    }
}

/// Lookup-or-create map from database identity to table handles
#[derive(Debug, Default)]
pub struct Registry {
    tables: Mutex<HashMap<String, Arc<Tables>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles for `db`, created on first use
    pub fn tables(&self, db: &Database) -> Arc<Tables> {
        let mut tables = self.lock();
        tables
            .entry(db.id().to_string())
            .or_insert_with(|| {
                debug!(database = db.id(), "Creating table handles");
                Arc::new(Tables::new(db))
            })
            .clone()
    }

    /// Drop the handles for `db`; returns whether any existed
    pub fn forget(&self, db: &Database) -> bool {
        self.lock().remove(db.id()).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Entries are immutable once inserted, so a poisoned map is still consistent
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Tables>>> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//! Shared fixtures for store integration tests

#![allow(dead_code)]

use specdb_store::{Database, MetadataRecord, Point, Reading, Registry, Tables};
use std::sync::Arc;
use tempfile::TempDir;

/// Fresh database in a temporary directory (kept alive by the returned guard)
pub async fn open_temp_db() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let db = Database::open_path(dir.path().join("store.db")).await.unwrap();
    (dir, db)
}

/// Fresh database plus its table handles
pub async fn open_temp_tables() -> (TempDir, Database, Arc<Tables>) {
    let (dir, db) = open_temp_db().await;
    let tables = Registry::new().tables(&db);
    (dir, db, tables)
}

/// Three-point reading carrying a moisture value
pub fn sample_reading(external_id: &str, moisture: f64) -> Reading {
    Reading::new(
        external_id,
        vec![
            Point::new(1100.0, 0.25),
            Point::new(1102.0, 0.5),
            Point::new(1104.0, 0.125),
        ],
    )
    .with_tag("wheat")
    .with_metadata(MetadataRecord::new().with("moisture", moisture))
}

/// Readings `r01..=rNN` with moisture 1..=n
pub fn numbered_readings(n: usize) -> Vec<Reading> {
    (1..=n)
        .map(|i| sample_reading(&format!("r{:02}", i), i as f64))
        .collect()
}

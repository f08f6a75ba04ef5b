//! # specdb store
//!
//! Persistence and retrieval engine for spectral readings:
//! - Reading table (identity + serialized point list)
//! - EAV metadata table (typed fields per reading)
//! - Filter-to-SQL translation with per-field join aliasing
//! - Forward-only streaming cursor over query results
//! - Batched, cancellable bulk upsert
//!
//! # Example
//!
//! ```rust,ignore
//! let config = StoreConfig::default().with_database_path("/tmp/spectra.db");
//! let db = Database::open(&config).await?;
//! let registry = Registry::new();
//! let tables = registry.tables(&db);
//!
//! let filter = Filter::new().with_range(FieldRange::new("moisture", Some(5.0), Some(10.0)));
//! let readings = tables.readings.query(&filter).await?;
//! ```

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod query;
pub mod reading;

pub use config::StoreConfig;
pub use db::{
    BulkWriteReport, BulkWriter, Database, MetadataStore, ReadingCursor, ReadingStore, Registry,
    Tables,
};
pub use dialect::{Dialect, DialectKind};
pub use error::{Error, Result};
pub use filter::{FieldMatch, FieldRange, Filter, SortKey};
pub use metadata::{FieldType, FieldValue, MetadataRecord};
pub use query::{translate, Projection, QueryParts};
pub use reading::{Point, Reading};

/// Cancellation token polled by long-running writes
pub use tokio_util::sync::CancellationToken;

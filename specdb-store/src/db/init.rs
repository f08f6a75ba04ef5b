//! Database opening and initialization

use crate::config::StoreConfig;
use crate::db::schema::{MetadataTable, ReadingsTable, SchemaSync};
use crate::dialect::{Dialect, SqliteDialect};
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{ConnectOptions, SqliteConnection, SqlitePool};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// An opened store database
///
/// Cheap to clone: the pool and dialect are shared. The connect options are
/// kept so private connections can be opened outside the pool.
#[derive(Clone)]
pub struct Database {
    id: String,
    pool: SqlitePool,
    options: SqliteConnectOptions,
    dialect: Arc<dyn Dialect>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.id)
            .field("dialect", &self.dialect.name())
            .finish()
    }
}

impl Database {
    /// Open (creating if needed) the database named by the configuration
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let db_path = &config.database_path;
        let newly_created = !db_path.exists();

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // WAL allows concurrent readers alongside one writer
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .with_regexp();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options.clone())
            .await?;

        if newly_created {
            info!("Initialized new database: {}", db_path.display());
        } else {
            info!("Opened existing database: {}", db_path.display());
        }

        let db = Self {
            id: canonical_id(db_path),
            pool,
            options,
            dialect: Arc::new(SqliteDialect),
        };
        db.init_schema().await?;

        Ok(db)
    }

    /// Open a database file with default settings
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let config = StoreConfig::default().with_database_path(path.as_ref());
        Self::open(&config).await
    }

    /// Create tables and bring columns up to date (idempotent)
    async fn init_schema(&self) -> Result<()> {
        SchemaSync::ensure_table::<ReadingsTable>(&self.pool).await?;
        SchemaSync::ensure_table::<MetadataTable>(&self.pool).await?;
        Ok(())
    }

    /// Open a brand-new connection outside the shared pool
    pub async fn open_dedicated(&self) -> Result<SqliteConnection> {
        let conn = self.options.connect().await?;
        Ok(conn)
    }

    /// Identity used as the registry key
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Close the shared pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn canonical_id(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    format!("sqlite://{}", resolved.display())
}

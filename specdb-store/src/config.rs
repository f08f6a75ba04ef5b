//! Store configuration and database path resolution

use crate::dialect::DialectKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable consulted for the database path
pub const DATABASE_ENV_VAR: &str = "SPECDB_DATABASE";

/// Database file name used under the default data directory
pub const DEFAULT_DATABASE_FILE: &str = "specdb.db";

/// Engine configuration
///
/// Loaded from TOML; every key is optional:
///
/// ```toml
/// database_path = "/data/spectra.db"
/// max_connections = 8
/// busy_timeout_ms = 5000
/// batch_size = 500
/// dialect = "sqlite"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    /// Default checkpoint size for bulk writes
    pub batch_size: usize,
    /// Dialect used when rendering SQL for display
    pub dialect: DialectKind,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_data_dir().join(DEFAULT_DATABASE_FILE),
            max_connections: 8,
            busy_timeout_ms: 5000,
            batch_size: 500,
            dialect: DialectKind::Sqlite,
        }
    }
}

impl StoreConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoreConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Override the database path
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Database path resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default data directory (fallback)
pub fn resolve_database_path(cli_arg: Option<&str>, config: Option<&StoreConfig>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(config) = config {
        return config.database_path.clone();
    }
    if let Ok(config_path) = find_config_file() {
        if let Ok(config) = StoreConfig::load(&config_path) {
            return config.database_path;
        }
    }

    // Priority 4: OS-dependent default
    default_data_dir().join(DEFAULT_DATABASE_FILE)
}

/// Locate the configuration file for the platform
pub fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("specdb").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/specdb/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("specdb"))
        .unwrap_or_else(|| PathBuf::from("./specdb_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.dialect, DialectKind::Sqlite);
        assert!(config.database_path.ends_with(DEFAULT_DATABASE_FILE));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = StoreConfig::from_toml_str(
            r#"
            database_path = "/data/spectra.db"
            batch_size = 50
            dialect = "postgres"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/data/spectra.db"));
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.dialect, DialectKind::Postgres);
        assert_eq!(config.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = StoreConfig::from_toml_str("batch_size = 0");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = StoreConfig::from_toml_str("batch_size = \"many\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_cli_argument_wins() {
        let config = StoreConfig::default().with_database_path("/from/config.db");
        let path = resolve_database_path(Some("/from/cli.db"), Some(&config));
        assert_eq!(path, PathBuf::from("/from/cli.db"));
    }
}

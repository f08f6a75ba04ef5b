//! specdb command-line front end
//!
//! Resolves configuration and the database path, opens the store and
//! dispatches to the subcommand implementations in [`commands`].

pub mod args;
pub mod commands;

use anyhow::{Context, Result};
use args::{Cli, Command};
use commands::ImportOptions;
use specdb_store::config::{find_config_file, resolve_database_path};
use specdb_store::{CancellationToken, Database, Registry, StoreConfig};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Configuration from `--config`, else the platform config file, else none
///
/// An explicitly named file must load; a discovered one that fails to
/// parse is reported and ignored.
pub fn load_config(explicit: Option<&Path>) -> Result<Option<StoreConfig>> {
    if let Some(path) = explicit {
        let config = StoreConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?;
        return Ok(Some(config));
    }

    match find_config_file() {
        Ok(path) => match StoreConfig::load(&path) {
            Ok(config) => {
                info!("Loaded config: {}", path.display());
                Ok(Some(config))
            }
            Err(e) => {
                warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Ok(None)
            }
        },
        Err(_) => Ok(None),
    }
}

/// Effective configuration for a command line
pub fn effective_config(cli: &Cli) -> Result<StoreConfig> {
    let loaded = load_config(cli.config.as_deref())?;
    let database_path = resolve_database_path(cli.database.as_deref(), loaded.as_ref());
    Ok(loaded.unwrap_or_default().with_database_path(database_path))
}

/// Run one command line to completion, writing results to `out`
pub async fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let config = effective_config(&cli)?;
    info!("Database path: {}", config.database_path.display());

    // SQL preview needs no database
    if let Command::Sql { filter, dialect, ids_only } = &cli.command {
        let filter = commands::load_filter(filter)?;
        let dialect = dialect.unwrap_or(config.dialect).dialect();
        let sql = commands::preview_sql(&filter, dialect.as_ref(), *ids_only)?;
        writeln!(out, "{}", sql)?;
        return Ok(());
    }

    let db = Database::open(&config)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    let registry = Registry::new();
    let tables = registry.tables(&db);

    let result = match cli.command {
        Command::Import {
            input,
            batch_size,
            auto_commit,
            dedicated,
        } => {
            let options = ImportOptions {
                batch_size: batch_size.unwrap_or(config.batch_size),
                auto_commit,
                dedicated,
            };
            let cancel = CancellationToken::new();
            let interrupt = spawn_interrupt_watch(cancel.clone());
            let report = commands::import(&tables, &input, &options, &cancel, out).await;
            interrupt.abort();
            report.map(|_| ())
        }
        Command::Query {
            filter,
            ids_only,
            dedicated,
        } => {
            async {
                let filter = commands::load_filter(&filter)?;
                let count = commands::query(&tables, &filter, ids_only, dedicated, &mut *out).await?;
                info!(count, "Query finished");
                Ok::<(), anyhow::Error>(())
            }
            .await
        }
        Command::Fields => commands::fields(&tables, out).await,
        Command::Values { field } => commands::values(&tables, &field, out).await,
        Command::Show {
            external_id,
            format,
        } => commands::show(&tables, &external_id, &format, out).await,
        Command::Delete { id, cascade } => commands::delete(&tables, id, cascade, out).await,
        Command::Sql { .. } => Ok(()),
    };

    db.close().await;
    result
}

/// Cancel `token` on Ctrl-C
fn spawn_interrupt_watch(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current checkpoint");
            token.cancel();
        }
    })
}

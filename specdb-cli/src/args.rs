//! Command-line arguments

use clap::{Parser, Subcommand};
use specdb_store::DialectKind;
use std::path::PathBuf;

/// Spectral reading store operator tool
#[derive(Parser, Debug)]
#[command(name = "specdb")]
#[command(about = "Store, filter and stream spectral readings")]
#[command(version)]
pub struct Cli {
    /// Database file (overrides SPECDB_DATABASE and the config file)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bulk-load readings from a JSON-lines file (one reading per line)
    Import {
        #[arg(value_name = "JSONL")]
        input: PathBuf,

        /// Readings per checkpoint (defaults to the configured batch size)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Commit each statement individually instead of per checkpoint
        #[arg(long)]
        auto_commit: bool,

        /// Write over a private connection
        #[arg(long)]
        dedicated: bool,
    },

    /// Stream matching readings as JSON lines
    Query {
        #[command(flatten)]
        filter: FilterArgs,

        /// Print surrogate keys only
        #[arg(long)]
        ids_only: bool,

        /// Read over a private connection
        #[arg(long)]
        dedicated: bool,
    },

    /// Print the SQL a filter translates to
    Sql {
        #[command(flatten)]
        filter: FilterArgs,

        /// Dialect to render (defaults to the configured dialect)
        #[arg(long)]
        dialect: Option<DialectKind>,

        /// Render the id-only projection
        #[arg(long)]
        ids_only: bool,
    },

    /// List metadata field names and their types
    Fields,

    /// List the distinct values stored for a field
    Values { field: String },

    /// Show one reading as pretty JSON
    Show {
        external_id: String,

        #[arg(long, default_value = specdb_store::reading::DEFAULT_FORMAT)]
        format: String,
    },

    /// Delete a reading by surrogate key
    Delete {
        id: i64,

        /// Remove its metadata as well
        #[arg(long)]
        cascade: bool,
    },
}

/// Filter source plus command-line overrides
#[derive(clap::Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// JSON filter document
    #[arg(long, value_name = "FILE")]
    pub filter: Option<PathBuf>,

    /// Maximum rows (zero for unlimited)
    #[arg(long)]
    pub limit: Option<i64>,

    /// Newest first
    #[arg(long)]
    pub latest: bool,
}

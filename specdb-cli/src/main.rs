//! specdb - spectral reading store CLI

use anyhow::Result;
use clap::Parser;
use specdb_cli::args::Cli;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting specdb v{}", env!("CARGO_PKG_VERSION"));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = specdb_cli::run(cli, &mut out).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

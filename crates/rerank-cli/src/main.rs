//! Rerank CLI - train, score and evaluate ranking models from JSON datasets.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rerank_cli::{Cli, Commands};

fn main() -> Result<()> {
    // Logs go to stderr so scores on stdout stay machine readable.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("rerank=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("Rerank CLI starting...");

    match cli.command {
        Commands::Train(cmd) => cmd.run()?,
        Commands::Predict(cmd) => cmd.run()?,
        Commands::Evaluate(cmd) => cmd.run()?,
    }

    info!("Rerank CLI completed successfully");
    Ok(())
}

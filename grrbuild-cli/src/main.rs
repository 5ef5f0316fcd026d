//! grrbuild CLI
//!
//! Builds the GRR server container image: provisions the isolated
//! environment, pre-builds dependencies into the wheelhouse, packages and
//! installs the core and server sdists, then attaches the runtime contract.

mod commands;
mod settings;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "grrbuild")]
#[command(about = "GRR server image build pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grrbuild=info,grrbuild_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    handle_command(cli.command).await
}

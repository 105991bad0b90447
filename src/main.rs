use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modeltask::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modeltask=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            record,
            out,
            devices,
            lock_dir,
        } => {
            modeltask::cli::run(config, record, out, devices, lock_dir).await?;
        }
        Commands::Stress {
            config,
            workers,
            samples,
            width,
            devices,
            lock_dir,
        } => {
            modeltask::cli::stress(config, workers, samples, width, devices, lock_dir)
                .await?;
        }
        Commands::Info { config } => {
            modeltask::cli::info(config).await?;
        }
    }

    Ok(())
}

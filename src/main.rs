// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use diskbusy::prelude::*;
use diskbusy::server;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging(args.verbose);

    let config = ServiceConfig::from_args(args).context("Invalid configuration")?;
    info!(
        pattern = %config.registry.pattern,
        block_size = config.registry.block_size,
        "starting diskbusy"
    );

    let registry = Arc::new(WorkloadRegistry::new(
        config.registry.clone(),
        Arc::new(UuidProvider),
    ));

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;

    server::serve(listener, Arc::clone(&registry), shutdown_signal())
        .await
        .context("HTTP server failed")?;

    registry.shutdown().await;
    Ok(())
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "diskbusy=debug,warn" } else { "diskbusy=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutting down gracefully");
}

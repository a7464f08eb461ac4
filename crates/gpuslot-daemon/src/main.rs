//! gpuslot daemon
//!
//! Serves the reservation engine over REST.

use anyhow::{Context, Result};
use clap::Parser;
use gpuslot_api::{create_router, with_layers};
use gpuslot_core::{GpuslotConfig, LogFormat, LoggingConfig};
use gpuslot_extract::{build_extractor, UsageLimiter};
use gpuslot_scheduler::Scheduler;
use gpuslot_store::open_repository;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// gpuslot daemon - priority-scored GPU time-slot reservations
#[derive(Parser, Debug)]
#[command(name = "gpuslotd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the API server
    #[arg(long)]
    address: Option<String>,

    /// Port for the REST API server
    #[arg(long)]
    port: Option<u16>,

    /// Log level or filter directive
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (text or json)
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    /// Command-line flags win over the file and environment
    fn apply(&self, config: &mut GpuslotConfig) -> Result<()> {
        if let Some(address) = &self.address {
            config.api.rest_address = address.clone();
        }
        if let Some(port) = self.port {
            config.api.rest_port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = match format.to_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => anyhow::bail!("unknown log format: {}", other),
            };
        }
        Ok(())
    }
}

fn init_logging(config: &LoggingConfig) {
    // RUST_LOG takes precedence over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match config.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = GpuslotConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    args.apply(&mut config)?;

    init_logging(&config.logging);
    info!("Starting gpuslot daemon v{}", env!("CARGO_PKG_VERSION"));

    let repository = open_repository(&config.storage)
        .await
        .context("Failed to open reservation store")?;

    let usage = Arc::new(UsageLimiter::from_config(&config.extraction));
    let extractor = build_extractor(&config.extraction, usage.clone());

    let scheduler = Arc::new(Scheduler::new(
        repository,
        extractor,
        config.resources.clone(),
        config.admission.clone(),
    ));

    let router = with_layers(create_router(scheduler, usage), &config.api);

    let addr: SocketAddr = format!("{}:{}", config.api.rest_address, config.api.rest_port)
        .parse()
        .context("Invalid listen address")?;

    info!(
        address = %addr,
        storage = ?config.storage.backend,
        extraction = ?config.extraction.mode,
        "API server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

// Opsdeck Admin Gateway - Main Entry Point
//
// This is the gateway process that fronts the hosted backend:
// - CLI interface
// - Bearer-session resolution and admin mutations
// - Per-client rate limiting
// - Audit trail writes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opsdeck::backend::{HttpBlobStore, HttpIdentityStore, HttpTableStore};
use opsdeck::config::Config;
use opsdeck::rate_limit::RateLimiter;
use opsdeck::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Opsdeck: Admin gateway for hosted-backend applications
#[derive(Parser, Debug)]
#[command(name = "opsdeck")]
#[command(version = "0.1.0")]
#[command(about = "Admin gateway with audit trail and rate limiting", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to a configuration file (defaults to the XDG config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway HTTP server
    Serve,
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let filter = if args.verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(filter.into())
                .from_env_lossy(),
        )
        .init();

    match args.command {
        Some(Commands::CheckConfig) => {
            config.validate()?;
            info!("Configuration OK");
            Ok(())
        }
        Some(Commands::Serve) | None => serve(config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    config.validate_for_serve()?;

    info!("Opsdeck gateway v0.1.0 starting...");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.backend.timeout_secs))
        .build()
        .context("Failed to build backend HTTP client")?;

    let identity = Arc::new(HttpIdentityStore::new(
        client.clone(),
        &config.backend.url,
        &config.backend.anon_key,
        &config.backend.service_role_key,
    ));
    let tables = Arc::new(HttpTableStore::new(
        client.clone(),
        &config.backend.url,
        &config.backend.anon_key,
        &config.backend.service_role_key,
    ));
    let blobs = Arc::new(HttpBlobStore::new(
        client,
        &config.backend.url,
        &config.backend.avatar_bucket,
        &config.backend.anon_key,
        &config.backend.service_role_key,
    ));

    let limiter = RateLimiter::new(&config.rate_limit);

    // The presence snapshot stays empty until a realtime feed is attached;
    // the sender must outlive the server for the watch to stay open.
    let (_online_tx, online_rx) = watch::channel(Vec::new());

    let state = AppState::new(identity, tables, blobs, limiter, online_rx);
    server::serve(state, config.server.port).await
}

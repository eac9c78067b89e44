use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gatekeeper::config::GatekeeperConfig;
use gatekeeper::gate::{Gate, HeaderIdentityPolicy};
use gatekeeper::ratelimit::RateLimiter;
use gatekeeper::server::HttpServer;
use gatekeeper::store::RedisStore;

/// Fixed-window rate limiting gate backed by Redis.
#[derive(Debug, Parser)]
#[command(name = "gatekeeper", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    info!("Starting Gatekeeper Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration: file (if any), then environment overrides
    let mut config = match &cli.config {
        Some(path) => GatekeeperConfig::from_file(path)?,
        None => GatekeeperConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }

    let limits = config.tier_limits();
    info!(
        listen_addr = %config.server.listen_addr,
        limit_per_ip = limits.anonymous,
        limit_per_token = limits.credentialed,
        window = ?limits.window,
        "Configuration loaded"
    );

    // Connect the shared counter store
    let store = RedisStore::connect(&config.store).await?;
    info!("Counter store connected");

    let limiter = RateLimiter::with_timeout(Arc::new(store), config.rate_limiting.store_timeout());
    let policy = HeaderIdentityPolicy::new(
        &config.rate_limiting.token_header,
        &config.rate_limiting.forwarded_header,
    )?;
    let gate = Arc::new(Gate::with_policy(limiter, policy, limits));

    let server = HttpServer::new(config.server.listen_addr, gate);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Gatekeeper Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

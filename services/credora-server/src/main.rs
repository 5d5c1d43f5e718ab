//! Credora Server
//!
//! Runs the ledger & loan-lifecycle engine on PostgreSQL and serves the
//! payment gateway webhook.
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings (requires a webhook secret)
//! credora-server --webhook-secret whsec_...
//!
//! # Start with a config file
//! credora-server --config /etc/credora/server.toml
//!
//! # Environment overrides
//! CREDORA__SERVER__PORT=9000 CREDORA__ENGINE__ANNUAL_INTEREST_RATE=7.5 credora-server
//! ```

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use credora_api::{create_router, ApiConfig, AppState};
use credora_db::Database;
use credora_engine::Engine;

use crate::config::ServerConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Credora Server - ledger and loan lifecycle engine
#[derive(Parser, Debug)]
#[command(name = "credora-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "CREDORA_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "CREDORA_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "CREDORA_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CREDORA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "CREDORA_LOG_FORMAT")]
    log_format: Option<String>,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Shared secret for payment gateway webhook signatures
    #[arg(long, env = "CREDORA_WEBHOOK_SECRET")]
    webhook_secret: Option<String>,

    /// Development mode: accept unsigned webhooks
    #[arg(long, env = "CREDORA_DEV_MODE")]
    dev_mode: bool,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(url) = self.database_url {
            config.database.postgres_url = url;
        }
        if let Some(secret) = self.webhook_secret {
            config.webhook.secret = secret;
        }
        if self.dev_mode {
            config.webhook.demo_mode = true;
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let dev_mode = args.dev_mode;

    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    args.apply(&mut server_config);

    init_logging(&server_config.logging);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Credora Server");

    server_config.validate(dev_mode)?;

    let db = init_database(&server_config.database).await?;

    let engine = Engine::new(Arc::new(db.store()), server_config.engine.clone());
    let state = Arc::new(AppState::new(engine, server_config.webhook.clone()));

    let api_config = ApiConfig {
        enable_cors: server_config.api.enable_cors,
        cors_origins: server_config.api.cors_origins.clone(),
        enable_tracing: server_config.api.enable_tracing,
    };
    let app = create_router(state, api_config);

    if server_config.metrics.enabled {
        start_metrics_exporter(server_config.metrics.port)?;
    }

    let addr = server_config.server.socket_addr()?;
    tracing::info!(
        host = %server_config.server.host,
        port = %server_config.server.port,
        "Server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(server_config.server.shutdown_timeout()))
        .await?;

    db.pg.close().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

fn init_logging(config: &config::LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => subscriber.with(fmt::layer().json().with_target(true)).init(),
        _ => subscriber.with(fmt::layer().pretty().with_target(true)).init(),
    }
}

async fn init_database(config: &credora_db::DatabaseConfig) -> anyhow::Result<Database> {
    let db = Database::connect(config).await?;

    if config.run_migrations {
        db.migrate().await?;
    }

    let health = db.health_check().await;
    if !health.healthy {
        anyhow::bail!("Database health check failed");
    }
    tracing::info!(postgres = health.postgres, "Database health check passed");

    Ok(db)
}

/// Install the Prometheus recorder with its own scrape listener
fn start_metrics_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(port, "Metrics exporter started");
    Ok(())
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for Ctrl+C or SIGTERM, then give in-flight requests a grace period
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown..."),
    }

    tracing::info!(grace_secs = grace.as_secs(), "Draining in-flight requests");
    tokio::time::sleep(grace).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["credora-server", "--port", "9000", "--dev-mode"]);
        assert_eq!(args.port, Some(9000));
        assert!(args.dev_mode);
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "credora-server",
            "--webhook-secret",
            "whsec_cli",
            "--log-format",
            "json",
        ]);
        let mut config = ServerConfig::default();
        args.apply(&mut config);
        assert_eq!(config.webhook.secret, "whsec_cli");
        assert_eq!(config.logging.format, "json");
        assert!(!config.webhook.demo_mode);
    }
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use carewarden::config::{CarewardenConfig, LogFormat, LoggingConfig};
use carewarden::governance::{spawn_sweeper, Governor};
use carewarden::http::{router, HttpServer};

/// Request governance service for the health system API.
#[derive(Parser, Debug)]
#[command(name = "carewarden", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "CAREWARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Override the log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = CarewardenConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }

    init_tracing(&config.logging);

    info!("Starting Carewarden");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %config.server.http_addr,
        config_file = ?args.config,
        "Configuration loaded"
    );

    let governor = Arc::new(Governor::new(&config.governance)?);
    info!(
        rate_limiting = governor.rate_limiting_enabled(),
        route_classes = governor.rules().routes().len(),
        max_concurrent = governor.concurrency().max_concurrent(),
        maintenance = governor.maintenance().is_enabled(),
        "Governor initialized"
    );

    let sweeper = spawn_sweeper(
        governor.rate_limiter().clone(),
        Duration::from_secs(config.governance.rate_limiting.sweep_interval_secs),
    );

    if config.admin.token.is_none() {
        info!("No admin token configured; admin routes are disabled");
    }
    let app = router(governor, Router::new(), config.admin.token.clone());

    let result = HttpServer::new(config.server.http_addr, app)
        .serve_with_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    if let Err(e) = &result {
        error!(error = %e, "Carewarden stopped with an error");
    }
    result?;

    info!("Carewarden stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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

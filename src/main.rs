use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reportgate::config::{LogFormat, LoggingConfig, ReportGateConfig};
use reportgate::download::{DownloadService, FileDownloadLog};
use reportgate::http::{AppState, HttpServer};
use reportgate::mail;
use reportgate::ratelimit::{FileStateStore, RateLimiter};

/// Email-gated report download service
#[derive(Parser, Debug)]
#[command(name = "reportgate", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ReportGateConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }

    init_tracing(&config.logging);

    info!("Starting Reportgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    config.validate()?;
    info!(
        http_addr = %config.server.http_addr,
        max_requests = config.rate_limiting.max_requests,
        window_secs = config.rate_limiting.window_secs,
        failure_mode = ?config.rate_limiting.failure_mode,
        "Configuration loaded"
    );

    let store = Arc::new(FileStateStore::new(&config.rate_limiting.state_path));
    info!(state_path = %store.path().display(), "Rate limiter initialized");
    let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limiting, store));

    let download_log = Arc::new(FileDownloadLog::new(&config.download.record_path));
    info!(record_path = %download_log.path().display(), "Download log initialized");

    let mailer = mail::from_config(&config.mail)?;
    let service = DownloadService::new(
        rate_limiter,
        download_log,
        mailer,
        config.download.download_url.clone(),
    )
    .with_mail_timeout(config.mail.timeout());

    let state = AppState::new(Arc::new(service))
        .with_trust_forwarded_for(config.server.trust_forwarded_for);

    // Run the server with graceful shutdown on Ctrl+C
    HttpServer::new(config.server.http_addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("Reportgate stopped");
    Ok(())
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

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use slidegate::config::SlidegateConfig;
use slidegate::http::{default_routes, HttpServer};
use slidegate::ratelimit::{spawn_sweeper, RateLimiter};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "slidegate", version, about = "Sliding-window rate limiting HTTP gateway")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to serve HTTP on
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Maximum requests per client per window
    #[arg(long)]
    max_requests: Option<usize>,

    /// Window length in seconds
    #[arg(long)]
    time_window: Option<u64>,

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
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    match args.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    info!("Starting Slidegate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = SlidegateConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    if let Some(max_requests) = args.max_requests {
        config.rate_limiting.max_requests = max_requests;
    }
    if let Some(time_window) = args.time_window {
        config.rate_limiting.time_window_secs = time_window;
    }
    config.validate()?;

    info!(
        http_addr = %config.server.http_addr,
        max_requests = config.rate_limiting.max_requests,
        time_window_secs = config.rate_limiting.time_window_secs,
        "Configuration loaded"
    );

    // Initialize the rate limiter
    let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limiting));
    let sweeper = config
        .rate_limiting
        .sweep_interval()
        .map(|interval| spawn_sweeper(Arc::clone(&rate_limiter), interval));

    let server = HttpServer::new(&config.server, rate_limiter);

    // Run the server with graceful shutdown on Ctrl+C
    server
        .serve_with_shutdown(default_routes(), shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("Slidegate stopped");
    Ok(())
}

/// Resolve once the process is asked to stop, by Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let received = tokio::select! {
        _ = interrupt() => "SIGINT",
        _ = terminate() => "SIGTERM",
    };
    info!(signal = received, "Initiating graceful shutdown");
}

async fn interrupt() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

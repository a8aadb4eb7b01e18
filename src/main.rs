use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use thread_mirror::api::{HttpClient, Transport};
use thread_mirror::cli::Cli;
use thread_mirror::config::Config;
use thread_mirror::watch::{WatchPlan, Watcher};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let target = cli.thread_target()?;

    let mut config = Config::from_env().context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        board = %target.board,
        thread = target.id,
        dst = %config.dst.display(),
        interval_secs = config.poll_interval.as_secs(),
        files_only = config.files_only,
        "Starting thread-mirror"
    );

    let client = HttpClient::new(&config).context("Failed to build HTTP client")?;
    let transport: Arc<dyn Transport> = Arc::new(client);

    // The thread has to exist before we start watching it
    transport
        .fetch_thread(&target.board, target.id, None)
        .await
        .with_context(|| format!("Failed to fetch thread /{}/{}", target.board, target.id))?;

    let watcher = Watcher::new(
        transport,
        target.board.clone(),
        target.id,
        WatchPlan::from_config(&config),
    );

    tokio::select! {
        reason = watcher.run() => {
            info!(board = %target.board, thread = target.id, "Done: {reason}");
        }
        () = shutdown_signal() => {
            info!("Shutting down...");
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,thread_mirror=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        // Pretty-printed logging for development
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

//! Shannon Heartbeat - Main Entry Point
//!
//! Runs the heartbeat scheduler until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use mimalloc::MiMalloc;

use shannon_heartbeat::config::AppConfig;
use shannon_heartbeat::logging::init_tracing;
use shannon_heartbeat::{
    HeartbeatFile, HeartbeatScheduler, MattermostClient, ProcessSessionFactory, SessionStore,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "shannon-heartbeat")]
#[command(about = "Shannon Heartbeat - scheduled agent runs for chat channels")]
#[command(version)]
struct Args {
    /// Config file path.
    #[arg(short, long, env = "SHANNON_HEARTBEAT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overrides `logging.level`.
    #[arg(long)]
    log_level: Option<String>,

    /// Heartbeat definitions file, overrides `scheduler.definitions_path`.
    #[arg(long, env = "SHANNON_HEARTBEAT_DEFINITIONS")]
    definitions: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(path) = args.definitions {
        config.scheduler.definitions_path = path;
    }

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, config.logging.format);

    tracing::info!("Starting Shannon Heartbeat v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        definitions = %config.scheduler.definitions_path.display(),
        agent = %config.agent.command,
        "Configuration loaded"
    );

    let store = SessionStore::new(&config.sessions.store_path);
    tracing::info!(
        path = %store.path().display(),
        sessions = store.load().len(),
        "Session store opened"
    );

    let chat = MattermostClient::new(&config.platform.base_url, &config.platform.bot_token)?;
    let scheduler = HeartbeatScheduler::new(
        Arc::new(HeartbeatFile::new(&config.scheduler.definitions_path)),
        Arc::new(chat),
        Arc::new(ProcessSessionFactory::new(
            config.agent.command.clone(),
            config.agent.extra_args.clone(),
        )),
        config.scheduler_settings(),
    );
    scheduler.start();

    shutdown_signal().await;

    scheduler.stop();
    for status in scheduler.status() {
        tracing::info!("{status}");
    }
    tracing::info!("Shut down");
    Ok(())
}

/// Graceful shutdown signal handler.
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
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relaybot::backend::OpenRouterBackend;
use relaybot::clock::SystemClock;
use relaybot::config::RelayConfig;
use relaybot::dispatch::{DispatchSettings, Dispatcher};
use relaybot::state::RelayState;
use relaybot::transport::TelegramTransport;

/// Inbound messages buffered between the poller and the dispatcher.
const INBOUND_QUEUE: usize = 256;

#[derive(Parser, Debug)]
#[command(version, about = "Chat relay bot with per-user rate limiting")]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting Relaybot");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::load(args.config.as_deref())?;
    config.validate()?;
    info!(
        model = %config.backend.model,
        request_limit = config.limits.request_limit,
        max_turns = config.limits.max_turns,
        "Configuration loaded"
    );

    let state = Arc::new(RelayState::from_limits(&config.limits));
    let backend = Arc::new(OpenRouterBackend::new(&config.backend)?);
    let transport = Arc::new(TelegramTransport::new(&config.telegram)?);

    if let Err(e) = transport.register_commands().await {
        warn!(error = %e, "Could not register bot commands");
    }

    let dispatcher = Arc::new(Dispatcher::new(
        state,
        backend,
        transport.clone(),
        Arc::new(SystemClock),
        DispatchSettings::from(&config),
    ));

    let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
    let dispatch_task = tokio::spawn(dispatcher.run(rx));

    // Dropping the poller closes the channel; the dispatcher then finishes
    // in-flight replies and returns
    tokio::select! {
        result = transport.run(tx) => result?,
        _ = shutdown_signal() => {}
    }

    dispatch_task.await?;

    info!("Relaybot stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
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

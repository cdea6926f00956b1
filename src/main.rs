//! Wynnrelay - deduplicating guild chat relay
//!
//! Accepts connections from redundant in-game mod clients, elects exactly
//! one submission per chat line, classifies it and broadcasts the result
//! to every connected client.

mod bridge;
mod common;
mod config;
mod game;
mod ledger;
mod platform;
mod protocol;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bridge::{run_relay_loop, Relay, RelayHandle};
use config::{env::get_config_path, load_and_validate};
use ledger::build_ledgers;
use protocol::auth::JwtAuthenticator;
use protocol::server::{ConnectionContext, RelayServer};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = get_config_path();

    let config = match load_and_validate(&config_path) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(false);
            error!("Failed to load configuration: {}", e);
            error!("Please ensure {} exists and is properly formatted.", config_path);
            return Err(e.into());
        }
    };

    init_tracing(config.logging.json);

    info!("Wynnrelay v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path);
    info!("  Bind: {}", config.server.bind);
    info!("  Handshake timeout: {}s", config.server.handshake_timeout_secs);
    info!(
        "  Minimum mod version: {}",
        config.mods.minimum_version.as_deref().unwrap_or("any")
    );
    info!("  Ledger: {:?}", config.ledger.kind);

    let ledgers = build_ledgers(&config.ledger).await?;
    let relay = Relay::standard(config.mods.version_policy(), ledgers);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (relay_handle, relay_events) = RelayHandle::new();
    let mut relay_task = tokio::spawn(run_relay_loop(relay, relay_events, shutdown_rx.clone()));

    let context = ConnectionContext {
        authenticator: Arc::new(JwtAuthenticator::new(config.auth.jwt_secret.as_bytes())),
        relay: relay_handle,
        handshake_timeout: Duration::from_secs(config.server.handshake_timeout_secs),
        max_frame_length: config.server.max_frame_length,
        shutdown_rx,
    };
    let server = RelayServer::bind(&config.server.bind, context).await?;
    let mut server_task = tokio::spawn(server.run());

    let shutdown = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - closing sessions...");
            true
        }
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => warn!("Server stopped unexpectedly"),
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
            }
            false
        }
        _ = &mut relay_task => {
            error!("Relay task ended unexpectedly");
            false
        }
    };

    // Fire-and-forget: if every receiver is gone the tasks already exited
    let _ = shutdown_tx.send(true);

    let timeout = Duration::from_secs(10);
    if shutdown {
        match tokio::time::timeout(timeout, server_task).await {
            Ok(Ok(Ok(()))) => info!("Listener closed"),
            Ok(Ok(Err(e))) => warn!("Listener error during shutdown: {}", e),
            Ok(Err(e)) => warn!("Listener task panicked: {}", e),
            Err(_) => warn!("Timed out waiting for connections to close"),
        }
    }
    if !relay_task.is_finished() {
        match tokio::time::timeout(timeout, relay_task).await {
            Ok(Ok(())) => info!("Pending side effects drained"),
            Ok(Err(e)) => warn!("Relay task panicked: {}", e),
            Err(_) => warn!("Timed out draining side effects"),
        }
    }

    info!("Exiting...");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
fn init_tracing(json: bool) {
    let env_filter = log_filter();
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Filter from `RUST_LOG`, falling back to `info` when unset or invalid.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

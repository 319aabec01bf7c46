//! `atelier-agent` -- bridge peer daemon.
//!
//! Connects to the server's bridge WebSocket and answers catalog requests
//! (`ping`, `search`, `get-item`). See [`atelier_agent::config`] for the
//! environment variables it reads.

use std::sync::Arc;

use atelier_agent::catalog::Catalog;
use atelier_agent::config::AgentConfig;
use atelier_agent::handlers::HandlerRegistry;
use atelier_agent::reconnect::{reconnect_loop, LoopExit};
use atelier_agent::session;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid agent configuration");
        std::process::exit(1);
    });

    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to load catalog");
            std::process::exit(1);
        }),
        None => Catalog::default(),
    };

    let catalog_items = catalog.item_count();
    let registry = Arc::new(HandlerRegistry::with_catalog(Arc::new(catalog)));

    tracing::info!(
        name = %config.name,
        ws_url = %config.ws_url,
        catalog_items,
        handlers = ?registry.kinds(),
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        "Starting atelier-agent",
    );
    let cancel = CancellationToken::new();

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            ctrl_c_cancel.cancel();
        }
    });

    let exit = reconnect_loop(&config.reconnect, &cancel, || {
        session::connect_and_serve(&config, Arc::clone(&registry), &cancel)
    })
    .await;

    match exit {
        LoopExit::Cancelled => tracing::info!("atelier-agent stopped"),
        LoopExit::GaveUp { attempts } => {
            tracing::error!(attempts, "atelier-agent giving up on the bridge");
            std::process::exit(1);
        }
    }
}

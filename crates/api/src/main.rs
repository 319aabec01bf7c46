use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use atelier_bridge::BridgeEndpoint;
use atelier_pipeline::assets::HttpAssetStore;
use atelier_pipeline::orchestrator::Orchestrator;
use atelier_pipeline::provider::HttpGenerationProvider;
use atelier_pipeline::recorder::{JobRecorder, MemoryJobRecorder};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_api::config::ServerConfig;
use atelier_api::identity::HeaderIdentity;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_api=debug,atelier_bridge=debug,atelier_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database (optional) ---
    let pool = match &config.database_url {
        Some(url) => {
            let pool = atelier_db::create_pool(url)
                .await
                .context("Failed to connect to database")?;
            atelier_db::health_check(&pool)
                .await
                .context("Database health check failed")?;
            atelier_db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database ready, jobs will be recorded in Postgres");
            Some(pool)
        }
        None => {
            tracing::info!("DATABASE_URL not set, jobs will be recorded in memory");
            None
        }
    };

    let recorder: Arc<dyn JobRecorder> = match &pool {
        Some(pool) => Arc::new(atelier_db::PgJobRecorder::new(pool.clone())),
        None => Arc::new(MemoryJobRecorder::new()),
    };

    // --- Generation pipeline ---
    let http = reqwest::Client::new();
    let provider = Arc::new(HttpGenerationProvider::new(
        http.clone(),
        config.provider_url.clone(),
        config.provider_api_key.clone(),
        Duration::from_secs(config.provider_timeout_secs),
    ));
    let assets = Arc::new(HttpAssetStore::new(http, config.asset_dir.clone()));
    let orchestrator = Orchestrator::new(provider, assets, recorder);
    tracing::info!(provider_url = %config.provider_url, "Generation orchestrator ready");

    // --- Bridge ---
    let bridge = Arc::new(BridgeEndpoint::new(Duration::from_secs(
        config.bridge_request_timeout_secs,
    )));

    // --- App state ---
    let state = AppState {
        bridge,
        orchestrator,
        identity: Arc::new(HeaderIdentity::default()),
        pool,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let host = config
        .host
        .parse::<IpAddr>()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or (on Unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

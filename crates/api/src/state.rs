use std::sync::Arc;

use atelier_bridge::BridgeEndpoint;
use atelier_pipeline::orchestrator::Orchestrator;

use crate::identity::CallerIdentity;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Server side of the bridge to the connected peer.
    pub bridge: Arc<BridgeEndpoint>,
    /// Generation job orchestrator.
    pub orchestrator: Orchestrator,
    /// Resolves the caller of a request.
    pub identity: Arc<dyn CallerIdentity>,
    /// Database pool, when `DATABASE_URL` is configured.
    pub pool: Option<atelier_db::DbPool>,
}

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atelier_api::config::ServerConfig;
use atelier_api::identity::HeaderIdentity;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;
use atelier_bridge::BridgeEndpoint;
use atelier_pipeline::assets::{AssetStore, ResolvedAsset};
use atelier_pipeline::error::{AssetError, ProviderCallError};
use atelier_pipeline::orchestrator::Orchestrator;
use atelier_pipeline::provider::{GenerationProvider, ProviderRequest};
use atelier_pipeline::recorder::MemoryJobRecorder;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        bridge_request_timeout_secs: 30,
        provider_url: "http://127.0.0.1:9/unused".to_string(),
        provider_api_key: None,
        provider_timeout_secs: 5,
        asset_dir: None,
        database_url: None,
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Provider returning one URL per variation, or failing every call.
pub struct FakeProvider {
    pub fail: bool,
}

#[async_trait]
impl GenerationProvider for FakeProvider {
    async fn generate(&self, request: &ProviderRequest) -> Result<Vec<String>, ProviderCallError> {
        if self.fail {
            return Err(ProviderCallError::Api {
                status: 500,
                body: "provider down".into(),
            });
        }
        Ok(vec![format!("https://cdn.test/{}.png", request.variation_index)])
    }
}

/// Asset store that knows no references.
pub struct NoAssets;

#[async_trait]
impl AssetStore for NoAssets {
    async fn resolve(&self, reference: &str) -> Result<ResolvedAsset, AssetError> {
        Err(AssetError::NotFound(reference.to_string()))
    }
}

/// A fully wired app plus handles to its in-memory collaborators.
pub struct TestApp {
    pub router: Router,
    pub bridge: Arc<BridgeEndpoint>,
    pub recorder: Arc<MemoryJobRecorder>,
}

/// Build the app with the given provider behaviour and bridge deadline.
pub fn build_test_app_with(provider_fails: bool, bridge_timeout: Duration) -> TestApp {
    let config = test_config();
    let recorder = Arc::new(MemoryJobRecorder::new());
    let bridge = Arc::new(BridgeEndpoint::new(bridge_timeout));

    let orchestrator = Orchestrator::new(
        Arc::new(FakeProvider {
            fail: provider_fails,
        }),
        Arc::new(NoAssets),
        recorder.clone(),
    );

    let state = AppState {
        bridge: bridge.clone(),
        orchestrator,
        identity: Arc::new(HeaderIdentity::default()),
        pool: None,
    };

    TestApp {
        router: build_app_router(state, &config),
        bridge,
        recorder,
    }
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(false, Duration::from_secs(30))
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
    headers: &[(&str, &str)],
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    app.oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Split an SSE body into `(event, data)` pairs.
pub fn parse_sse(body: &str) -> Vec<(String, serde_json::Value)> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    event = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data = serde_json::from_str(v.trim()).ok();
                }
            }
            Some((event?, data?))
        })
        .collect()
}

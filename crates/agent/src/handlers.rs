//! Request handlers and type-based dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use atelier_bridge::messages::{RequestFrame, ResponseFrame, REQ_GET_ITEM, REQ_PING, REQ_SEARCH};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::Catalog;

/// Search results returned when the caller gives no limit.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Failure reported back to the server as `{success: false, error}`.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Item not found")]
    NotFound,
}

/// Answers one request type.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, params: Option<Value>) -> Result<Value, HandlerError>;
}

/// Maps request types to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard `ping`, `search` and `get-item` handlers.
    pub fn with_catalog(catalog: Arc<Catalog>) -> Self {
        let mut registry = Self::new();
        registry.register(REQ_PING, PingHandler);
        registry.register(
            REQ_SEARCH,
            SearchHandler {
                catalog: Arc::clone(&catalog),
            },
        );
        registry.register(REQ_GET_ITEM, GetItemHandler { catalog });
        registry
    }

    pub fn register(&mut self, kind: &str, handler: impl RequestHandler + 'static) {
        let _ = self.handlers.insert(kind.to_owned(), Arc::new(handler));
    }

    /// Run the handler for `request` and build the correlated response.
    pub async fn dispatch(&self, request: RequestFrame) -> ResponseFrame {
        let RequestFrame { id, kind, params } = request;

        let Some(handler) = self.handlers.get(&kind) else {
            tracing::warn!(id = %id, kind = %kind, "Unknown request type");
            return ResponseFrame::err(id, format!("Unknown request type '{kind}'"));
        };

        match handler.handle(params).await {
            Ok(data) => ResponseFrame::ok(id, data),
            Err(e) => {
                tracing::debug!(id = %id, kind = %kind, error = %e, "Request handler failed");
                ResponseFrame::err(id, e.to_string())
            }
        }
    }

    /// Registered request types, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Option<Value>) -> Result<T, HandlerError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| HandlerError::InvalidParams(e.to_string()))
}

/// `ping` -> `{pong: true, timestamp}` with the peer's clock in epoch millis.
pub struct PingHandler;

#[async_trait]
impl RequestHandler for PingHandler {
    async fn handle(&self, _params: Option<Value>) -> Result<Value, HandlerError> {
        Ok(json!({
            "pong": true,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    limit: Option<usize>,
}

pub struct SearchHandler {
    catalog: Arc<Catalog>,
}

#[async_trait]
impl RequestHandler for SearchHandler {
    async fn handle(&self, params: Option<Value>) -> Result<Value, HandlerError> {
        let params: SearchParams = parse_params(params)?;
        if params.query.trim().is_empty() {
            return Err(HandlerError::InvalidParams("query must not be empty".into()));
        }
        let limit = params
            .limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);

        let (items, total) = self.catalog.search(&params.query, limit);
        Ok(json!({ "items": items, "total": total }))
    }
}

#[derive(Debug, Deserialize)]
struct GetItemParams {
    id: String,
}

pub struct GetItemHandler {
    catalog: Arc<Catalog>,
}

#[async_trait]
impl RequestHandler for GetItemHandler {
    async fn handle(&self, params: Option<Value>) -> Result<Value, HandlerError> {
        let params: GetItemParams = parse_params(params)?;
        let item = self.catalog.get(&params.id).ok_or(HandlerError::NotFound)?;
        serde_json::to_value(item).map_err(|e| HandlerError::InvalidParams(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample;

    fn registry() -> HandlerRegistry {
        HandlerRegistry::with_catalog(Arc::new(sample()))
    }

    fn request(kind: &str, params: Option<Value>) -> RequestFrame {
        RequestFrame {
            id: "req-1".into(),
            kind: kind.into(),
            params,
        }
    }

    #[tokio::test]
    async fn ping_answers_with_current_timestamp() {
        let before = chrono::Utc::now().timestamp_millis();
        let response = registry().dispatch(request("ping", None)).await;

        assert_eq!(response.id, "req-1");
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["pong"], true);
        let ts = data["timestamp"].as_i64().unwrap();
        assert!(ts >= before && ts - before < 1_000);
    }

    #[tokio::test]
    async fn search_returns_items_and_total() {
        let response = registry()
            .dispatch(request("search", Some(json!({"query": "animal", "limit": 1}))))
            .await;

        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["total"], 2);
        assert_eq!(data["items"].as_array().unwrap().len(), 1);
        assert_eq!(data["items"][0]["id"], "fox-01");
    }

    #[tokio::test]
    async fn empty_query_is_a_handler_error() {
        let response = registry()
            .dispatch(request("search", Some(json!({"query": "  "}))))
            .await;

        assert!(!response.success);
        assert!(response.error.unwrap().contains("query"));
    }

    #[tokio::test]
    async fn missing_params_are_a_handler_error() {
        let response = registry().dispatch(request("search", None)).await;
        assert!(!response.success);
        assert!(response.error.unwrap().starts_with("Invalid params"));
    }

    #[tokio::test]
    async fn get_item_found_and_missing() {
        let registry = registry();

        let found = registry
            .dispatch(request("get-item", Some(json!({"id": "owl-01"}))))
            .await;
        assert!(found.success);
        assert_eq!(found.data.unwrap()["name"], "Snowy Owl");

        let missing = registry
            .dispatch(request("get-item", Some(json!({"id": "nope"}))))
            .await;
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("Item not found"));
    }

    #[tokio::test]
    async fn unknown_type_names_the_type() {
        let response = registry().dispatch(request("render", None)).await;

        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Unknown request type 'render'"));
    }

    #[test]
    fn standard_kinds_are_registered() {
        assert_eq!(registry().kinds(), vec!["get-item", "ping", "search"]);
    }
}

//! Agent configuration loaded from environment variables.
//!
//! | Variable                    | Required | Default         |
//! |-----------------------------|----------|-----------------|
//! | `BRIDGE_WS_URL`             | yes      | --              |
//! | `AGENT_NAME`                | no       | `atelier-agent` |
//! | `AGENT_CATALOG_PATH`        | no       | empty catalog   |
//! | `HEARTBEAT_INTERVAL_SECS`   | no       | `15`            |
//! | `RECONNECT_BASE_DELAY_SECS` | no       | `2`             |
//! | `RECONNECT_MAX_ATTEMPTS`    | no       | `10`            |

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;
use crate::reconnect::ReconnectPolicy;

const DEFAULT_AGENT_NAME: &str = "atelier-agent";
const DEFAULT_HEARTBEAT_SECS: u64 = 15;
const DEFAULT_RECONNECT_BASE_SECS: u64 = 2;
const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Server bridge endpoint, e.g. `ws://host:3000/api/v1/bridge/ws`.
    pub ws_url: String,
    /// Announced in the handshake.
    pub name: String,
    pub catalog_path: Option<PathBuf>,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, AgentError> {
        let ws_url = get("BRIDGE_WS_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AgentError::Config("BRIDGE_WS_URL environment variable is required".into()))?;
        if !ws_url.starts_with("ws://") && !ws_url.starts_with("wss://") {
            return Err(AgentError::Config(format!(
                "BRIDGE_WS_URL must be a ws:// or wss:// URL, got '{ws_url}'"
            )));
        }

        let name = get("AGENT_NAME")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string());

        let catalog_path = get("AGENT_CATALOG_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let heartbeat_secs = parse_var(&get, "HEARTBEAT_INTERVAL_SECS", DEFAULT_HEARTBEAT_SECS)?;
        if heartbeat_secs == 0 {
            return Err(AgentError::Config("HEARTBEAT_INTERVAL_SECS must be positive".into()));
        }
        let base_secs = parse_var(&get, "RECONNECT_BASE_DELAY_SECS", DEFAULT_RECONNECT_BASE_SECS)?;
        let max_attempts = parse_var(&get, "RECONNECT_MAX_ATTEMPTS", DEFAULT_RECONNECT_MAX_ATTEMPTS)?;

        Ok(Self {
            ws_url,
            name,
            catalog_path,
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_secs(base_secs),
                max_attempts,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AgentError> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AgentError::Config(format!("{key} must be a non-negative integer, got '{raw}'"))),
        None => Ok(default),
    }
}

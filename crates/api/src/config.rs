use std::path::PathBuf;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds. Generation streams are long-lived,
    /// so the default is `300`.
    pub request_timeout_secs: u64,
    /// Deadline for a single bridge call in seconds (default: `30`).
    pub bridge_request_timeout_secs: u64,
    /// Generation provider endpoint.
    pub provider_url: String,
    /// Optional bearer token for the provider.
    pub provider_api_key: Option<String>,
    /// Per-call provider timeout in seconds (default: `120`).
    pub provider_timeout_secs: u64,
    /// Directory holding reference images addressed by bare asset id.
    pub asset_dir: Option<PathBuf>,
    /// Postgres URL; jobs are recorded in memory when unset.
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                           |
    /// |-------------------------------|-----------------------------------|
    /// | `HOST`                        | `0.0.0.0`                         |
    /// | `PORT`                        | `3000`                            |
    /// | `CORS_ORIGINS`                | `http://localhost:5173`           |
    /// | `REQUEST_TIMEOUT_SECS`        | `300`                             |
    /// | `BRIDGE_REQUEST_TIMEOUT_SECS` | `30`                              |
    /// | `PROVIDER_URL`                | `http://localhost:8600/v1/images` |
    /// | `PROVIDER_API_KEY`            | unset                             |
    /// | `PROVIDER_TIMEOUT_SECS`       | `120`                             |
    /// | `ASSET_DIR`                   | unset                             |
    /// | `DATABASE_URL`                | unset                             |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: secs_var("REQUEST_TIMEOUT_SECS", 300),
            bridge_request_timeout_secs: secs_var("BRIDGE_REQUEST_TIMEOUT_SECS", 30),
            provider_url: std::env::var("PROVIDER_URL")
                .unwrap_or_else(|_| "http://localhost:8600/v1/images".into()),
            provider_api_key: optional_var("PROVIDER_API_KEY"),
            provider_timeout_secs: secs_var("PROVIDER_TIMEOUT_SECS", 120),
            asset_dir: optional_var("ASSET_DIR").map(PathBuf::from),
            database_url: optional_var("DATABASE_URL"),
        }
    }
}

fn secs_var(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        Err(_) => default,
    }
}

/// Unset and empty are both treated as absent.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

//! Caller identity.
//!
//! Authentication happens in a fronting proxy; the server only reads the
//! identity the proxy forwards.

use axum::http::{HeaderMap, HeaderName};

/// Header set by the fronting proxy to the authenticated user id.
pub const FORWARDED_USER_HEADER: &str = "x-forwarded-user";

/// Resolves the caller behind a request, if any.
pub trait CallerIdentity: Send + Sync {
    fn current_caller(&self, headers: &HeaderMap) -> Option<String>;
}

/// Reads the caller id from a single request header.
#[derive(Debug, Clone)]
pub struct HeaderIdentity {
    header: HeaderName,
}

impl HeaderIdentity {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self::new(HeaderName::from_static(FORWARDED_USER_HEADER))
    }
}

impl CallerIdentity for HeaderIdentity {
    fn current_caller(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn reads_forwarded_user() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_USER_HEADER, HeaderValue::from_static(" ada "));

        assert_eq!(HeaderIdentity::default().current_caller(&headers).as_deref(), Some("ada"));
    }

    #[test]
    fn missing_or_blank_header_is_anonymous() {
        let identity = HeaderIdentity::default();
        assert_eq!(identity.current_caller(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_USER_HEADER, HeaderValue::from_static("  "));
        assert_eq!(identity.current_caller(&headers), None);
    }
}

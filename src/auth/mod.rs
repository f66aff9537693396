//! Authenticated request context
//!
//! The auth middleware resolves the caller's API key once and stores an
//! [`Auth`] in request extensions; handlers read it instead of re-parsing
//! credentials.

use axum::extract::Request;
use http::HeaderMap;

use crate::keys::ApiKey;

/// Header and query-parameter sources for the API secret, in precedence order
const HEADER_SOURCES: [&str; 2] = ["x-api-key", "xi-api-key"];
const QUERY_PARAM: &str = "api_key";

/// Per-request authentication context
#[derive(Debug, Clone)]
pub enum Auth {
    /// Authenticated with a stored key
    Key(ApiKey),
    /// Authentication disabled (development mode); full access, no quotas
    Open,
}

impl Auth {
    pub fn key(&self) -> Option<&ApiKey> {
        match self {
            Auth::Key(key) => Some(key),
            Auth::Open => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        match self {
            Auth::Key(key) => key.is_admin,
            Auth::Open => true,
        }
    }

    pub fn key_id(&self) -> &str {
        match self {
            Auth::Key(key) => &key.id,
            Auth::Open => "dev",
        }
    }
}

/// Pull the API secret out of headers, in precedence order:
/// `X-API-Key`, then `xi-api-key`, then `Authorization: Bearer`.
pub fn secret_from_headers(headers: &HeaderMap) -> Option<String> {
    for name in HEADER_SOURCES {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}

/// Pull the API secret out of a query string (`?api_key=...`), the fallback
/// for WebSocket clients that cannot set headers.
pub fn secret_from_query(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == QUERY_PARAM)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Extract the API secret from a request, headers before query string.
pub fn extract_secret(request: &Request) -> Option<String> {
    secret_from_headers(request.headers())
        .or_else(|| request.uri().query().and_then(secret_from_query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{AUTHORIZATION, HeaderValue};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                http::HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_header_precedence() {
        let map = headers(&[
            ("x-api-key", "from-x"),
            ("xi-api-key", "from-xi"),
            ("authorization", "Bearer from-bearer"),
        ]);
        assert_eq!(secret_from_headers(&map).as_deref(), Some("from-x"));

        let map = headers(&[
            ("xi-api-key", "from-xi"),
            ("authorization", "Bearer from-bearer"),
        ]);
        assert_eq!(secret_from_headers(&map).as_deref(), Some("from-xi"));

        let map = headers(&[("authorization", "Bearer from-bearer")]);
        assert_eq!(secret_from_headers(&map).as_deref(), Some("from-bearer"));
    }

    #[test]
    fn test_non_bearer_authorization_is_ignored() {
        let mut map = HeaderMap::new();
        map.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(secret_from_headers(&map), None);
    }

    #[test]
    fn test_query_fallback() {
        assert_eq!(
            secret_from_query("api_key=vg_abc&foo=bar").as_deref(),
            Some("vg_abc")
        );
        assert_eq!(secret_from_query("token=vg_abc"), None);
        assert_eq!(secret_from_query("api_key="), None);
    }
}

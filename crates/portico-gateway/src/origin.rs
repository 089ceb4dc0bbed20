//! Cross-origin access control.
//!
//! Browser callers are admitted either because their `Origin` is on the
//! static allow-list, or because they present an API key whose record lists
//! the origin (or lists none, which admits every origin). Lookup failures
//! deny.

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue};
use chrono::Utc;

use portico_auth::credential::fingerprint;
use portico_auth::{bearer_token, KeyDirectory};

/// Longest bearer value accepted for an origin lookup.
pub const MAX_ORIGIN_TOKEN_LEN: usize = 40;

const ALLOW_METHODS: &str = "GET, PUT, POST, DELETE, PATCH, OPTIONS";
const ALLOW_HEADERS: &str =
    "Accept, Content-Type, Content-Length, Accept-Encoding, Authorization, Cache-Control, X-Requested-With";

/// Outcome of origin validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginDecision {
    /// The origin may see responses. Carries the value to echo back.
    Allowed(HeaderValue),
    /// No `Origin` header. Allowed, without CORS headers.
    MissingOrigin,
    /// The origin is not permitted.
    Denied,
}

/// Validates the `Origin` of inbound requests.
pub struct OriginValidator<K: KeyDirectory> {
    allowed: HashSet<String>,
    directory: Arc<K>,
}

impl<K: KeyDirectory> OriginValidator<K> {
    /// Create a validator over a static allow-list and a key directory.
    pub fn new(allowed: impl IntoIterator<Item = String>, directory: Arc<K>) -> Self {
        Self {
            allowed: allowed
                .into_iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            directory,
        }
    }

    /// Decide whether `origin` may access the gateway.
    pub async fn validate(&self, origin: Option<&str>, authorization: Option<&str>) -> OriginDecision {
        let Some(origin) = origin.filter(|o| !o.is_empty()) else {
            tracing::warn!("Request without Origin header");
            return OriginDecision::MissingOrigin;
        };

        let Ok(value) = HeaderValue::from_str(origin) else {
            tracing::warn!("Origin header is not a valid header value");
            return OriginDecision::Denied;
        };

        if self.allowed.contains(origin) {
            return OriginDecision::Allowed(value);
        }

        let Some(token) = authorization.and_then(bearer_token) else {
            tracing::warn!(origin = %origin, "Origin not allow-listed and no bearer token");
            return OriginDecision::Denied;
        };

        if token.len() > MAX_ORIGIN_TOKEN_LEN {
            tracing::warn!(origin = %origin, "Origin not allow-listed and token is not an API key");
            return OriginDecision::Denied;
        }

        match self.directory.validate_key(token).await {
            Ok(record) if record.is_expired_at(Utc::now()) => {
                tracing::warn!(origin = %origin, key = %fingerprint(token), "Expired API key for origin");
                OriginDecision::Denied
            }
            Ok(record) => match record.into_principal() {
                Ok(principal) if principal.allows_origin(origin) => {
                    tracing::debug!(origin = %origin, key = %fingerprint(token), "Origin allowed by API key");
                    OriginDecision::Allowed(value)
                }
                Ok(_) => {
                    tracing::warn!(origin = %origin, key = %fingerprint(token), "Origin not allowed for API key");
                    OriginDecision::Denied
                }
                Err(e) => {
                    tracing::warn!(origin = %origin, key = %fingerprint(token), error = %e, "API key record unusable");
                    OriginDecision::Denied
                }
            },
            Err(e) => {
                tracing::warn!(origin = %origin, key = %fingerprint(token), error = %e, "Origin key lookup failed");
                OriginDecision::Denied
            }
        }
    }
}

/// Add the CORS response headers for an allowed origin.
pub fn apply_cors_headers(headers: &mut HeaderMap, origin: &HeaderValue) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}

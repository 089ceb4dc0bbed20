//! Bearer credential classification.
//!
//! Two credential formats share the same transport (session cookie or
//! `Authorization: Bearer`). They are told apart structurally:
//!
//! - an **API key** is a hyphenated UUID (36 characters, `8-4-4-4-12` hex);
//! - anything else is a **session token**, a compact JWS of three
//!   base64url segments separated by `.`.
//!
//! A compact JWS always contains `.`, so it can never parse as a UUID, and
//! the two formats cannot collide even when their lengths happen to match.

use std::fmt;

/// Length of a hyphenated UUID API key.
pub const API_KEY_LEN: usize = 36;

/// A bearer credential, tagged by scheme.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// An opaque API key, validated against the identity service.
    ApiKey(String),
    /// A signed session token, verified locally.
    SessionToken(String),
}

impl Credential {
    /// Classify a raw bearer value.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        if is_api_key(raw) {
            Self::ApiKey(raw.to_string())
        } else {
            Self::SessionToken(raw.to_string())
        }
    }

    /// The raw credential value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ApiKey(v) | Self::SessionToken(v) => v,
        }
    }

    /// Scheme name for logging.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::ApiKey(_) => "api_key",
            Self::SessionToken(_) => "session",
        }
    }

    /// A short, non-reversible hint safe to put in logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(self.as_str())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential::{}({})", self.scheme(), self.fingerprint())
    }
}

/// Whether `raw` has the structure of an API key.
#[must_use]
pub fn is_api_key(raw: &str) -> bool {
    raw.len() == API_KEY_LEN && uuid::Uuid::try_parse(raw).is_ok()
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// Returns `None` if the scheme is not `Bearer` or the token is empty.
#[must_use]
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let token = header_value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Render a credential as its first four characters plus its length.
#[must_use]
pub fn fingerprint(raw: &str) -> String {
    let head: String = raw.chars().take(4).collect();
    format!("{head}…(len={})", raw.len())
}

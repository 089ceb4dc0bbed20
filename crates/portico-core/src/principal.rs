//! The resolved caller identity.
//!
//! A [`Principal`] is produced by the gateway after a credential has been
//! verified and is handed to upstream services as JSON in a request header.
//! It lives for a single request and is never persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{TeamId, UserId};

/// Which authentication scheme produced a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrincipalKind {
    /// A signed session token issued at login.
    Session,
    /// A long-lived opaque API key.
    ApiKey,
}

/// Resolved identity attached to a request after authentication.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Scheme that produced this principal.
    pub kind: PrincipalKind,
    /// User id, or the owner of the API key.
    pub user_id: UserId,
    /// Team of the user or key.
    pub team_id: TeamId,
    /// Display name of the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The API key value itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Origins the key may be used from. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Whether the key is marked public.
    #[serde(default)]
    pub is_public: bool,
}

impl Principal {
    /// Build a session principal from verified token claims.
    #[must_use]
    pub fn session(user_id: UserId, team_id: TeamId) -> Self {
        Self {
            kind: PrincipalKind::Session,
            user_id,
            team_id,
            name: None,
            key: None,
            allowed_origins: Vec::new(),
            is_public: false,
        }
    }

    /// Build an API-key principal from a validated key record.
    #[must_use]
    pub fn api_key(
        user_id: UserId,
        team_id: TeamId,
        name: String,
        key: String,
        allowed_origins: Vec<String>,
        is_public: bool,
    ) -> Self {
        Self {
            kind: PrincipalKind::ApiKey,
            user_id,
            team_id,
            name: Some(name),
            key: Some(key),
            allowed_origins,
            is_public,
        }
    }

    /// Whether the principal may be used from `origin`.
    #[must_use]
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == origin)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("kind", &self.kind)
            .field("user_id", &self.user_id)
            .field("team_id", &self.team_id)
            .field("name", &self.name)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("allowed_origins", &self.allowed_origins)
            .field("is_public", &self.is_public)
            .finish()
    }
}

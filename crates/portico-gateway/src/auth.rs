//! Credential resolution.
//!
//! This module turns the cookie or `Authorization` header of a request into
//! a [`Principal`], using whichever scheme the credential's shape selects.

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use chrono::Utc;

use portico_auth::{bearer_token, AuthError, Credential, KeyDirectory, SessionValidator};
use portico_core::Principal;

use crate::redact::header_summary;
use crate::routing::ServiceRoute;

/// Resolves request credentials into principals.
pub struct CredentialResolver<V, K>
where
    V: SessionValidator,
    K: KeyDirectory,
{
    sessions: Arc<V>,
    keys: Arc<K>,
    cookie_name: String,
}

impl<V, K> CredentialResolver<V, K>
where
    V: SessionValidator,
    K: KeyDirectory,
{
    /// Create a resolver.
    pub fn new(sessions: Arc<V>, keys: Arc<K>, cookie_name: impl Into<String>) -> Self {
        Self {
            sessions,
            keys,
            cookie_name: cookie_name.into(),
        }
    }

    /// Resolve the caller for `route`.
    ///
    /// Returns `Ok(None)` for public routes without looking at credentials.
    ///
    /// # Errors
    ///
    /// Returns `TokenMissing` when no credential is present, otherwise the
    /// error from whichever scheme rejected the credential.
    pub async fn resolve(
        &self,
        route: &ServiceRoute,
        headers: &HeaderMap,
    ) -> Result<Option<Principal>, AuthError> {
        if !route.auth_required() {
            return Ok(None);
        }

        let Some(credential) = self.extract(headers) else {
            tracing::warn!(
                service = %route.key(),
                headers = %header_summary(headers),
                "No credential on protected route"
            );
            return Err(AuthError::TokenMissing);
        };

        match self.verify(&credential).await {
            Ok(principal) => {
                tracing::debug!(
                    service = %route.key(),
                    scheme = credential.scheme(),
                    user_id = %principal.user_id,
                    team_id = %principal.team_id,
                    "Credential resolved"
                );
                Ok(Some(principal))
            }
            Err(e) => {
                tracing::warn!(
                    service = %route.key(),
                    scheme = credential.scheme(),
                    credential = %credential.fingerprint(),
                    headers = %header_summary(headers),
                    error = %e,
                    "Credential rejected"
                );
                Err(e)
            }
        }
    }

    /// Pull the credential from the session cookie, falling back to the
    /// `Authorization` header.
    #[must_use]
    pub fn extract(&self, headers: &HeaderMap) -> Option<Credential> {
        let raw = cookie_value(headers, &self.cookie_name).or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(bearer_token)
        })?;
        Some(Credential::classify(raw))
    }

    async fn verify(&self, credential: &Credential) -> Result<Principal, AuthError> {
        match credential {
            Credential::ApiKey(key) => {
                let record = self.keys.validate_key(key).await?;
                if record.is_expired_at(Utc::now()) {
                    return Err(AuthError::ApiKeyExpired);
                }
                record.into_principal()
            }
            Credential::SessionToken(token) => {
                let claims = self.sessions.validate(token).await?;
                Ok(Principal::session(claims.user_id, claims.team_id))
            }
        }
    }
}

/// Find a non-empty cookie named `name` across all `Cookie` headers.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v.trim_matches('"'))
}

//! Credential verification for portico.
//!
//! This crate implements the two authentication schemes the gateway accepts:
//!
//! - **Session tokens**: HS256 JWTs verified locally with a shared secret
//! - **API keys**: opaque UUIDs resolved against the identity service
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│   Credential     │
//! │   (resolver)     │     │   ::classify     │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                 ┌─────────────────┴─────────────────┐
//!                 ▼                                   ▼
//!        ┌──────────────────┐                ┌──────────────────┐
//!        │ SessionValidator │                │  KeyDirectory    │
//!        │ (HS256, local)   │                │  (trait)         │
//!        └──────────────────┘                └────────┬─────────┘
//!                                                     │ HTTP
//!                                            ┌────────▼─────────┐
//!                                            │ Identity service │
//!                                            │ /validate-key    │
//!                                            └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use portico_auth::{AuthConfig, Credential, HmacSessionValidator, SessionValidator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::default();
//! let validator = HmacSessionValidator::new(config.jwt_secret.as_bytes());
//!
//! let token = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...";
//! if let Credential::SessionToken(token) = Credential::classify(token) {
//!     let claims = validator.validate(&token).await?;
//!     println!("user {} in team {}", claims.user_id, claims.team_id);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::fmt;
use std::time::Duration;

pub mod credential;
pub mod directory;
pub mod error;
pub mod jwt;

pub use credential::{bearer_token, Credential};
pub use directory::{ApiKeyRecord, HttpKeyDirectory, KeyDirectory};
pub use error::{AuthError, Result};
pub use jwt::{HmacSessionValidator, SessionClaims, SessionValidator};

#[cfg(any(test, feature = "test-utils"))]
pub use directory::MockKeyDirectory;
#[cfg(any(test, feature = "test-utils"))]
pub use jwt::MockSessionValidator;

/// Configuration for credential verification.
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared HS256 secret for session tokens.
    pub jwt_secret: String,
    /// Base URL of the identity service (e.g., `http://localhost:8500/authentication`).
    pub identity_base_url: String,
    /// Timeout for identity service calls.
    pub identity_timeout: Duration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("identity_base_url", &self.identity_base_url)
            .field("identity_timeout", &self.identity_timeout)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            identity_base_url: "http://localhost:8500/authentication".to_string(),
            identity_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AuthConfig::default();
        assert_eq!(
            config.identity_base_url,
            "http://localhost:8500/authentication"
        );
        assert_eq!(config.identity_timeout, Duration::from_secs(5));
        assert!(config.jwt_secret.is_empty());
    }

    #[test]
    fn debug_redacts_secret() {
        let config = AuthConfig {
            jwt_secret: "super-secret".to_string(),
            ..AuthConfig::default()
        };
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn auth_error_status_codes() {
        assert_eq!(AuthError::TokenMissing.http_status_code(), 401);
        assert_eq!(AuthError::TokenExpired.http_status_code(), 401);
        assert_eq!(AuthError::InvalidSignature.http_status_code(), 401);
        assert_eq!(AuthError::ApiKeyExpired.http_status_code(), 401);
        assert_eq!(AuthError::InvalidApiKey.http_status_code(), 400);
        assert_eq!(
            AuthError::DirectoryUnavailable("down".into()).http_status_code(),
            500
        );
    }
}

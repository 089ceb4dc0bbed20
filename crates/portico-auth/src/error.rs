//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while resolving a credential.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was found in the cookie or `Authorization` header.
    #[error("token missing")]
    TokenMissing,

    /// The session token has expired.
    #[error("token expired")]
    TokenExpired,

    /// The session token signature does not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// A required claim is missing from the token.
    #[error("missing required claim: {0}")]
    MissingClaim(String),

    /// The user id in the token or key record is malformed.
    #[error("invalid user ID format")]
    InvalidUserId,

    /// The team id in the token or key record is malformed.
    #[error("invalid team ID format")]
    InvalidTeamId,

    /// The token format is invalid.
    #[error("invalid token format: {0}")]
    InvalidToken(String),

    /// The API key is unknown to the identity service.
    #[error("invalid API key")]
    InvalidApiKey,

    /// The API key exists but its expiry has passed.
    #[error("API key expired")]
    ApiKeyExpired,

    /// The identity service could not be reached or answered unexpectedly.
    #[error("identity service unavailable: {0}")]
    DirectoryUnavailable(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns the appropriate HTTP status code for this error.
    ///
    /// Unknown API keys are a validation failure (400) rather than a plain
    /// authentication failure, matching what the identity service returns.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::TokenMissing
            | Self::TokenExpired
            | Self::InvalidSignature
            | Self::MissingClaim(_)
            | Self::InvalidUserId
            | Self::InvalidTeamId
            | Self::InvalidToken(_)
            | Self::ApiKeyExpired => 401,
            Self::InvalidApiKey => 400,
            Self::DirectoryUnavailable(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns `true` if the failure is on the gateway's side, not the caller's.
    #[must_use]
    pub const fn is_server_fault(&self) -> bool {
        matches!(self, Self::DirectoryUnavailable(_) | Self::Internal(_))
    }
}

//! API error types and responses.
//!
//! Every rejection the gateway writes uses the same envelope:
//!
//! ```json
//! { "message": "...", "errorCode": "ERROR_...", "errorInfo": { "requestID": "..." } }
//! ```
//!
//! `errorInfo` is only present for server-side failures, where the request id
//! is what an operator needs to find the matching log lines.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use portico_auth::AuthError;

use crate::proxy::{ProxyError, ProxyErrorKind};

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The first path segment names no configured service.
    #[error("Invalid service endpoint!")]
    ServiceNotFound,

    /// The service exists but nothing handles this path.
    #[error("Sorry! We haven't found this route or not implemented yet!")]
    RouteNotFound,

    /// The service has been retired.
    #[error("This API route is no longer supported! Please migrate to newer endpoints!")]
    DeprecatedRoute,

    /// The caller's origin is not permitted.
    #[error("You are not authorized to perform this action!")]
    OriginDenied,

    /// No credential was presented for a protected route.
    #[error("Token is required.")]
    TokenMissing,

    /// The session token or API key failed verification.
    #[error("Invalid or expired token.")]
    InvalidToken,

    /// The API key is unknown to the identity service.
    #[error("Api Key is Invalid or Expired")]
    InvalidApiKey,

    /// The request body went over the configured size limit.
    #[error("Request body is too large!")]
    PayloadTooLarge,

    /// The gateway did not finish handling the request in time.
    #[error("Request timed out!")]
    RequestTimeout,

    /// The upstream service timed out or could not be reached.
    #[error("Something went wrong!")]
    UpstreamFailed,

    /// Internal server error. Details are logged, never returned.
    #[error("Something went wrong!")]
    Internal,
}

/// Error response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    message: String,
    error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_info: Option<ErrorInfo>,
}

#[derive(Debug, Serialize)]
struct ErrorInfo {
    #[serde(rename = "requestID")]
    request_id: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::ServiceNotFound | Self::RouteNotFound | Self::DeprecatedRoute => {
                StatusCode::NOT_FOUND
            }
            Self::OriginDenied | Self::TokenMissing | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::InvalidApiKey => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::UpstreamFailed => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ServiceNotFound | Self::RouteNotFound => "ERROR_NOT_FOUND",
            Self::DeprecatedRoute => "ERROR_DEPRECATED_ROUTE",
            Self::OriginDenied => "ERROR_UNAUTHORIZED",
            Self::TokenMissing => "ERROR_TOKEN_MISSING",
            Self::InvalidToken | Self::InvalidApiKey => "ERROR_INVALID_TOKEN",
            Self::PayloadTooLarge => "ERROR_PAYLOAD_TOO_LARGE",
            Self::RequestTimeout => "ERROR_REQUEST_TIMEOUT",
            Self::UpstreamFailed => "ERROR_PROXY_FAILED",
            Self::Internal => "ERROR_WRONG_AT_SERVER",
        }
    }

    /// Whether the failure is on our side and should carry the request id.
    #[must_use]
    pub const fn is_server_fault(&self) -> bool {
        matches!(self, Self::RequestTimeout | Self::UpstreamFailed | Self::Internal)
    }

    /// Render the error, attaching `request_id` to server-side failures.
    #[must_use]
    pub fn into_response_with_id(self, request_id: Option<&str>) -> Response {
        let error_info = request_id
            .filter(|_| self.is_server_fault())
            .map(|id| ErrorInfo {
                request_id: id.to_string(),
            });

        let body = ErrorResponse {
            message: self.to_string(),
            error_code: self.code(),
            error_info,
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_response_with_id(None)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenMissing => Self::TokenMissing,
            AuthError::InvalidApiKey => Self::InvalidApiKey,
            AuthError::TokenExpired
            | AuthError::InvalidSignature
            | AuthError::MissingClaim(_)
            | AuthError::InvalidUserId
            | AuthError::InvalidTeamId
            | AuthError::InvalidToken(_)
            | AuthError::ApiKeyExpired => Self::InvalidToken,
            AuthError::DirectoryUnavailable(_) | AuthError::Internal(_) => {
                tracing::error!(error = %err, "Auth internal error");
                Self::Internal
            }
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        match err.kind() {
            ProxyErrorKind::UpstreamTimeout | ProxyErrorKind::UpstreamUnreachable => {
                Self::UpstreamFailed
            }
            ProxyErrorKind::PayloadTooLarge => Self::PayloadTooLarge,
            ProxyErrorKind::InternalFailure => Self::Internal,
        }
    }
}

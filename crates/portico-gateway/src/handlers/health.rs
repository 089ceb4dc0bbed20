//! Health check endpoint.
//!
//! This module answers the target-less `health` service.

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;

/// Service key this handler answers for.
pub const SERVICE_KEY: &str = "health";

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Human-readable status message.
    pub message: &'static str,
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Number of configured services.
    pub services: usize,
}

/// Health check handler.
///
/// # Example
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "message": "OK!",
///   "status": "healthy",
///   "version": "0.1.0",
///   "services": 4
/// }
/// ```
///
/// # Errors
///
/// Returns [`ApiError::RouteNotFound`] for anything other than `GET /health`.
pub fn health(method: &Method, path: &str, services: usize) -> Result<Response, ApiError> {
    if *method != Method::GET || path.trim_end_matches('/') != "/health" {
        return Err(ApiError::RouteNotFound);
    }

    let response = HealthResponse {
        message: "OK!",
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        services,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

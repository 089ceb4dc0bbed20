//! Local handlers.
//!
//! Requests that resolve to a service without an upstream, or that no path
//! filter claims, are answered here instead of being proxied.

pub mod health;

use axum::extract::Request;
use axum::response::Response;

use crate::error::ApiError;
use crate::routing::{RoutingTable, ServiceRoute};

/// Answer `request` locally for `route`.
///
/// # Errors
///
/// Returns [`ApiError::RouteNotFound`] if no handler is registered for the
/// service key or the handler does not serve this path.
pub fn dispatch(routes: &RoutingTable, route: &ServiceRoute, request: &Request) -> Result<Response, ApiError> {
    match route.key() {
        health::SERVICE_KEY => health::health(request.method(), request.uri().path(), routes.len()),
        _ => {
            tracing::warn!(
                service = %route.key(),
                path = %request.uri().path(),
                "No local handler for request"
            );
            Err(ApiError::RouteNotFound)
        }
    }
}

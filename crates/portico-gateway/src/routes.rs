//! Router configuration.
//!
//! The gateway has no fixed routes: every request goes to the pipeline
//! fallback, wrapped in the middleware stack below.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use portico_auth::{KeyDirectory, SessionValidator};

use crate::pipeline;
use crate::proxy::REQUEST_ID;
use crate::state::GatewayState;

/// Create the gateway router.
///
/// # Middleware (outermost first)
///
/// - `SetRequestId`: keeps an inbound `requestid`, otherwise generates one
/// - `Trace`: one span per request carrying `request_id`, `method`, `path`
/// - `PropagateRequestId`: echoes `requestid` on the response
/// - `RequestBodyLimit`: rejects oversized bodies with 413
///
/// The overall request deadline is enforced in [`pipeline::handle`].
pub fn create_router<V, K>(state: GatewayState<V, K>) -> Router
where
    V: SessionValidator + 'static,
    K: KeyDirectory + 'static,
{
    // Extract config values before moving state
    let max_body_bytes = state.config.max_body_bytes;

    let state = Arc::new(state);

    Router::new()
        .fallback(pipeline::handle::<V, K>)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(REQUEST_ID.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(PropagateRequestIdLayer::new(REQUEST_ID.clone()))
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .with_state(state)
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    )
}

//! Request pipeline.
//!
//! Every inbound request passes through the same stages, in order:
//!
//! ```text
//! resolve route ─▶ deprecation gate ─▶ origin check ─▶ credentials ─▶ forward
//!      │                 │                  │ (OPTIONS: 200)   │            │
//!      ▼                 ▼                  ▼                  ▼            ▼
//!     404               404                401              400/401     upstream / 5xx
//! ```
//!
//! A stage either hands over to the next one or produces the single
//! response for the request. Once the origin is allowed, its CORS headers
//! go on whatever response is produced, rejections included.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, ORIGIN};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use portico_auth::{KeyDirectory, SessionValidator};

use crate::deprecation;
use crate::error::ApiError;
use crate::handlers;
use crate::origin::{apply_cors_headers, OriginDecision};
use crate::proxy::REQUEST_ID;
use crate::redact::header_summary;
use crate::state::GatewayState;

/// Fallback handler driving every request through the pipeline.
pub async fn handle<V, K>(State(state): State<Arc<GatewayState<V, K>>>, request: Request) -> Response
where
    V: SessionValidator + 'static,
    K: KeyDirectory + 'static,
{
    let request_id = request
        .headers()
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);

    let mut cors = None;
    let deadline = state.config.request_timeout();
    let outcome = tokio::time::timeout(deadline, run(&state, request, &request_id, &mut cors)).await;
    let mut response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => err.into_response_with_id(Some(&request_id)),
        Err(_) => {
            tracing::error!(request_id = %request_id, timeout = ?deadline, "Request deadline exceeded");
            ApiError::RequestTimeout.into_response_with_id(Some(&request_id))
        }
    };

    if let Some(origin) = &cors {
        apply_cors_headers(response.headers_mut(), origin);
    }
    response
}

async fn run<V, K>(
    state: &GatewayState<V, K>,
    request: Request,
    request_id: &str,
    cors: &mut Option<HeaderValue>,
) -> Result<Response, ApiError>
where
    V: SessionValidator,
    K: KeyDirectory,
{
    let path = request.uri().path().to_string();
    let method = request.method().clone();
    let headers = request.headers();

    let Some(route) = state.routes.resolve(&path) else {
        tracing::warn!(path = %path, headers = %header_summary(headers), "No service for path");
        return Err(ApiError::ServiceNotFound);
    };

    deprecation::check(route, &path)?;

    let origin = match headers.get(ORIGIN).map(HeaderValue::to_str) {
        Some(Ok(origin)) => Some(origin),
        Some(Err(_)) => {
            tracing::warn!(service = %route.key(), "Origin header is not valid text");
            return Err(ApiError::OriginDenied);
        }
        None => None,
    };
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    match state.origins.validate(origin, authorization).await {
        OriginDecision::Allowed(value) => *cors = Some(value),
        OriginDecision::MissingOrigin => {}
        OriginDecision::Denied => {
            tracing::warn!(
                service = %route.key(),
                origin = ?origin,
                headers = %header_summary(headers),
                "Origin denied"
            );
            return Err(ApiError::OriginDenied);
        }
    }

    if method == Method::OPTIONS {
        return Ok(StatusCode::OK.into_response());
    }

    let principal = state.credentials.resolve(route, headers).await?;

    let outbound = route
        .upstream()
        .and_then(|_| route.outbound_path(&path, &method));

    match outbound {
        Some(outbound_path) => state
            .forwarder
            .forward(request, route, &outbound_path, principal.as_ref(), request_id)
            .await
            .map_err(ApiError::from),
        None => handlers::dispatch(&state.routes, route, &request),
    }
}

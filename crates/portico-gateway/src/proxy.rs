//! Reverse-proxy forwarding.
//!
//! A [`Forwarder`] sends one request to one upstream and streams the answer
//! back. Transport failures are classified into a [`ProxyErrorKind`] so the
//! caller always gets a stable envelope instead of the raw error.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{ConnectInfo, Request};
use axum::http::header::{CONTENT_LENGTH, CONNECTION, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use futures::{SinkExt, StreamExt, TryStreamExt};
use http_body_util::LengthLimitError;
use reqwest::Url;
use thiserror::Error;

use portico_core::Principal;

use crate::config::ConfigError;
use crate::routing::ServiceRoute;

/// Header carrying the resolved principal as JSON.
pub static USER_DETAILS: HeaderName = HeaderName::from_static("userdetails");
/// Header carrying the client's `Host`.
pub static ORIGINAL_HOST: HeaderName = HeaderName::from_static("originalhost");
/// Header carrying the client's path and query.
pub static ORIGINAL_URL: HeaderName = HeaderName::from_static("originalurl");
/// Request correlation header.
pub static REQUEST_ID: HeaderName = HeaderName::from_static("requestid");

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Chunks buffered between the client body and the upstream request.
const BODY_CHANNEL_CAPACITY: usize = 8;

/// Classification of a failed upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyErrorKind {
    /// Connection refused, reset, aborted, or name resolution failed.
    UpstreamUnreachable,
    /// No response headers within the upstream timeout.
    UpstreamTimeout,
    /// The client body went over the configured size limit mid-stream.
    PayloadTooLarge,
    /// Anything else, including failures on our side.
    InternalFailure,
}

impl fmt::Display for ProxyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UpstreamUnreachable => "upstream_unreachable",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::PayloadTooLarge => "payload_too_large",
            Self::InternalFailure => "internal_failure",
        })
    }
}

/// Errors raised while forwarding a request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The upstream did not answer in time.
    #[error("upstream {target} timed out")]
    Timeout {
        /// Outbound URL.
        target: String,
    },

    /// The upstream could not be reached.
    #[error("upstream {target} unreachable: {source}")]
    Unreachable {
        /// Outbound URL.
        target: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The client body exceeded the size limit while being streamed.
    #[error("request body for {target} exceeded the size limit")]
    PayloadTooLarge {
        /// Outbound URL.
        target: String,
    },

    /// The request could not be built or the exchange failed otherwise.
    #[error("proxy failure: {0}")]
    Internal(String),
}

impl ProxyError {
    /// The failure class.
    #[must_use]
    pub const fn kind(&self) -> ProxyErrorKind {
        match self {
            Self::Timeout { .. } => ProxyErrorKind::UpstreamTimeout,
            Self::Unreachable { .. } => ProxyErrorKind::UpstreamUnreachable,
            Self::PayloadTooLarge { .. } => ProxyErrorKind::PayloadTooLarge,
            Self::Internal(_) => ProxyErrorKind::InternalFailure,
        }
    }

    fn from_reqwest(err: reqwest::Error, target: &str) -> Self {
        let target = target.to_string();
        if err.is_timeout() {
            Self::Timeout { target }
        } else if err.is_connect() || is_connection_error(&err) {
            Self::Unreachable {
                target,
                source: err,
            }
        } else {
            Self::Internal(err.to_string())
        }
    }
}

/// Record of one forwarded request, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyOutcome {
    /// Upstream status, when a response arrived.
    pub status: Option<u16>,
    /// Time until response headers (or failure).
    pub duration_ms: u64,
    /// Failure class, `None` on success.
    pub error_kind: Option<ProxyErrorKind>,
}

impl ProxyOutcome {
    fn new(status: Option<StatusCode>, elapsed: Duration, error_kind: Option<ProxyErrorKind>) -> Self {
        Self {
            status: status.map(|s| s.as_u16()),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            error_kind,
        }
    }

    fn log(&self, service: &str, path: &str) {
        tracing::debug!(
            service = %service,
            path = %path,
            status = ?self.status,
            duration_ms = self.duration_ms,
            error_kind = ?self.error_kind,
            "Proxy round trip"
        );
    }
}

/// Forwards requests to upstream services.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    /// Create a forwarder that waits at most `timeout` for response headers.
    ///
    /// Body streaming in either direction is not bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Forward `request` to `route`'s upstream at `outbound_path`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`ProxyError`] if no upstream response arrives.
    pub async fn forward(
        &self,
        request: Request,
        route: &ServiceRoute,
        outbound_path: &str,
        principal: Option<&Principal>,
        request_id: &str,
    ) -> Result<Response, ProxyError> {
        let target = route
            .upstream()
            .ok_or_else(|| ProxyError::Internal(format!("service {} has no target", route.key())))?;

        let (parts, body) = request.into_parts();
        let url = outbound_url(target, outbound_path, parts.uri.query());

        let mut headers = forwarded_headers(&parts.headers);
        if let Some(host) = parts.headers.get(HOST) {
            headers.insert(ORIGINAL_HOST.clone(), host.clone());
        }
        let original_url = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path(), |pq| pq.as_str());
        if let Ok(value) = HeaderValue::from_str(original_url) {
            headers.insert(ORIGINAL_URL.clone(), value);
        }
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(&mut headers, addr.ip().to_string());
        }
        if let Some(principal) = principal {
            let json = serde_json::to_string(principal)
                .map_err(|e| ProxyError::Internal(format!("serialize principal: {e}")))?;
            let value = HeaderValue::from_bytes(json.as_bytes())
                .map_err(|e| ProxyError::Internal(format!("principal header: {e}")))?;
            headers.insert(USER_DETAILS.clone(), value);
        }
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(REQUEST_ID.clone(), value);
        }

        let over_limit = Arc::new(AtomicBool::new(false));
        let length = body.size_hint().exact();
        if let Some(length) = length.filter(|n| *n > 0) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        }

        let mut builder = self
            .client
            .request(parts.method.clone(), url.as_str())
            .headers(headers);
        if length != Some(0) {
            builder = builder.body(stream_body(body, Arc::clone(&over_limit)));
        }

        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, builder.send()).await;
        let elapsed = started.elapsed();

        let err = match result {
            Ok(Ok(upstream)) => {
                ProxyOutcome::new(Some(upstream.status()), elapsed, None)
                    .log(route.key(), outbound_path);
                return Ok(into_response(upstream, request_id));
            }
            Ok(Err(_)) if over_limit.load(Ordering::Acquire) => {
                ProxyError::PayloadTooLarge { target: url }
            }
            Ok(Err(e)) => ProxyError::from_reqwest(e, &url),
            Err(_elapsed) => ProxyError::Timeout { target: url },
        };

        ProxyOutcome::new(None, elapsed, Some(err.kind())).log(route.key(), outbound_path);
        if err.kind() == ProxyErrorKind::PayloadTooLarge {
            tracing::warn!(service = %route.key(), request_id = %request_id, error = %err, "Request body too large");
        } else {
            tracing::error!(
                service = %route.key(),
                request_id = %request_id,
                error_kind = %err.kind(),
                error = %err,
                "Upstream request failed"
            );
        }
        Err(err)
    }
}

/// Join the target base, outbound path, and query.
fn outbound_url(target: &Url, path: &str, query: Option<&str>) -> String {
    let base = target.as_str().trim_end_matches('/');
    let mut url = String::with_capacity(base.len() + path.len() + 1);
    url.push_str(base);
    if !path.starts_with('/') {
        url.push('/');
    }
    url.push_str(path);
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(q);
    }
    url
}

/// Copy request headers, dropping hop-by-hop headers, those named in
/// `Connection`, `host`, `content-length`, and any client-sent `userdetails`.
fn forwarded_headers(src: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = src
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(src.len());
    for (name, value) in src {
        let n = name.as_str();
        if HOP_BY_HOP.contains(&n)
            || *name == HOST
            || *name == CONTENT_LENGTH
            || *name == USER_DETAILS
            || listed.iter().any(|l| l == n)
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: String) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.trim().is_empty() => format!("{prior}, {client_ip}"),
        _ => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}

/// Pump the client body into a channel the HTTP client can own.
///
/// Sets `over_limit` before passing on an error caused by the body limit.
fn stream_body(body: Body, over_limit: Arc<AtomicBool>) -> reqwest::Body {
    let (mut tx, rx) = futures::channel::mpsc::channel::<Result<Bytes, axum::Error>>(
        BODY_CHANNEL_CAPACITY,
    );
    tokio::spawn(async move {
        let mut chunks = body.into_data_stream();
        while let Some(chunk) = chunks.next().await {
            if let Err(e) = &chunk {
                if exceeds_limit(e) {
                    over_limit.store(true, Ordering::Release);
                }
            }
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });
    reqwest::Body::wrap_stream(rx)
}

fn exceeds_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

fn into_response(upstream: reqwest::Response, request_id: &str) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }

    let request_id = request_id.to_string();
    let stream = upstream.bytes_stream().inspect_err(move |e| {
        tracing::warn!(request_id = %request_id, error = %e, "Upstream body aborted mid-stream");
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn is_connection_error(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            return matches!(
                io.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::BrokenPipe
            );
        }
        source = e.source();
    }
    false
}

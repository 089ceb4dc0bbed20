//! Shared harness for gateway integration tests.
//!
//! Each test gets its own upstream and identity mock servers, so tests can
//! run in parallel without interfering.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use portico_auth::{AuthConfig, HmacSessionValidator, HttpKeyDirectory};
use portico_gateway::{create_router, GatewayConfig, GatewayState, RoutingTable};

pub const SECRET: &str = "integration-test-secret";
pub const KEY: &str = "0b4e7c1a-2f3d-4e5f-8a9b-0c1d2e3f4a5b";
pub const ALLOWED_ORIGIN: &str = "https://app.example";
pub const PARTNER_ORIGIN: &str = "https://partner.example";

pub struct TestGateway {
    pub upstream: MockServer,
    pub identity: MockServer,
    router: Router,
}

impl TestGateway {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build a gateway, letting the test adjust the config first.
    pub async fn with_config(adjust: impl FnOnce(&mut GatewayConfig)) -> Self {
        let upstream = MockServer::start().await;
        let identity = MockServer::start().await;

        let routes = json!({
            "services": {
                "authentication": { "target": upstream.uri() },
                "upload": { "target": upstream.uri(), "requires_auth": true },
                "records": {
                    "target": upstream.uri(),
                    "path_filters": [
                        { "prefix": "/records/v2", "rewrite": { "from": "^/records/v2", "to": "/records" } }
                    ]
                },
                "legacy": { "target": upstream.uri(), "deprecated": true },
                "down": { "target": "http://127.0.0.1:9" },
                "health": {}
            }
        });
        let routes =
            RoutingTable::from_definitions(serde_json::from_value(routes).unwrap(), "local").unwrap();

        let mut config = GatewayConfig {
            allowed_origins: vec![ALLOWED_ORIGIN.to_string()],
            auth: AuthConfig {
                jwt_secret: SECRET.to_string(),
                identity_base_url: format!("{}/authentication", identity.uri()),
                identity_timeout: Duration::from_secs(2),
            },
            upstream_timeout_seconds: 5,
            ..GatewayConfig::default()
        };
        adjust(&mut config);

        let sessions = Arc::new(HmacSessionValidator::new(SECRET.as_bytes()));
        let keys = Arc::new(HttpKeyDirectory::new(&config.auth).unwrap());
        let state = GatewayState::new(config, routes, sessions, keys).unwrap();

        Self {
            upstream,
            identity,
            router: create_router(state),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Upstream answers every request with 200 `{"ok":true}`.
    pub async fn upstream_ok(&self) {
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&self.upstream)
            .await;
    }

    /// Identity service knows `KEY` with the given origins and expiry offset.
    pub async fn identity_knows_key(&self, origins: &[&str], expires_in_secs: i64) {
        let expires_at = Utc::now() + chrono::Duration::seconds(expires_in_secs);
        Mock::given(method("GET"))
            .and(path(format!("/authentication/validate-key/{KEY}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "data": {
                    "name": "ci-key",
                    "key": KEY,
                    "uuid": "user-42",
                    "teamId": "team-42",
                    "allowedOrigins": origins,
                    "isPublic": false,
                    "expiresAt": expires_at.to_rfc3339()
                }
            })))
            .mount(&self.identity)
            .await;
    }

    /// Identity service answers key lookups with `status` and `message`.
    pub async fn identity_rejects_key(&self, status: u16, message: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/authentication/validate-key/{KEY}")))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "message": message })))
            .mount(&self.identity)
            .await;
    }

    pub async fn upstream_requests(&self) -> Vec<wiremock::Request> {
        self.upstream.received_requests().await.unwrap_or_default()
    }
}

pub fn session_token(exp_offset_secs: i64, secret: &str) -> String {
    let exp = (Utc::now() + chrono::Duration::seconds(exp_offset_secs)).timestamp();
    encode(
        &Header::default(),
        &json!({ "_id": "user-1", "teamId": "team-1", "exp": exp }),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().uri(uri).header("host", "gateway.example")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

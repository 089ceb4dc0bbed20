//! HTTP edge gateway for portico.
//!
//! This crate is the single public entry point in front of the backend
//! services. For every request it:
//!
//! - resolves the upstream service from the first path segment
//! - rejects retired services
//! - validates the caller's `Origin` (static list or per-API-key list)
//! - resolves a session token or API key into a principal
//! - proxies the request and classifies upstream failures
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Browsers / API clients                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       portico-gateway                       │
//! │  ┌──────────┐ ┌───────────┐ ┌──────────┐ ┌──────────────┐   │
//! │  │ Routing  │▶│  Origin   │▶│Credential│▶│  Forwarder   │   │
//! │  │  Table   │ │ Validator │ │ Resolver │ │  (reqwest)   │   │
//! │  └──────────┘ └───────────┘ └──────────┘ └──────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                │                    │                │
//!                ▼                    ▼                ▼
//!         ┌────────────┐      ┌────────────┐    ┌────────────┐
//!         │  Identity  │      │ HS256 JWT  │    │  Upstream  │
//!         │  service   │      │  (local)   │    │  services  │
//!         └────────────┘      └────────────┘    └────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use portico_auth::{HmacSessionValidator, HttpKeyDirectory};
//! use portico_gateway::{create_router, GatewayConfig, GatewayState, RoutingTable};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_env()?;
//! let routes = RoutingTable::from_file(&config.routes_file, &config.environment)?;
//!
//! let sessions = Arc::new(HmacSessionValidator::new(config.auth.jwt_secret.as_bytes()));
//! let keys = Arc::new(HttpKeyDirectory::new(&config.auth)?);
//!
//! let state = GatewayState::new(config, routes, sessions, keys)?;
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8500").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod deprecation;
pub mod error;
pub mod handlers;
pub mod origin;
pub mod pipeline;
pub mod proxy;
pub mod redact;
pub mod routes;
pub mod routing;
pub mod state;
pub mod telemetry;

pub use config::{ConfigError, GatewayConfig};
pub use error::ApiError;
pub use routes::create_router;
pub use routing::{PathFilter, PathMatcher, PathRewrite, RoutingTable, ServiceRoute};
pub use state::GatewayState;

// Re-export key types for convenience
pub use auth::CredentialResolver;
pub use origin::{OriginDecision, OriginValidator};
pub use proxy::{Forwarder, ProxyError, ProxyErrorKind, ProxyOutcome};

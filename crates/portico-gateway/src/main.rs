//! Portico Gateway - HTTP edge gateway
//!
//! This is the main entry point for the gateway service. Configuration comes
//! from environment variables (see `GatewayConfig::from_env`) and the routing
//! table from the JSON file named by `ROUTES_FILE`.
//!
//! # Dev Mode
//!
//! Build with `--features dev-mode` to use a mock session validator and an
//! empty in-memory key directory, so no identity service is needed.
//! Use tokens in format: `test-session:<user-id>:<team-id>`

use std::net::SocketAddr;
use std::sync::Arc;

#[cfg(feature = "dev-mode")]
use portico_auth::{MockKeyDirectory, MockSessionValidator};
#[cfg(not(feature = "dev-mode"))]
use portico_auth::{HmacSessionValidator, HttpKeyDirectory};
use portico_gateway::{create_router, telemetry, GatewayConfig, GatewayState, RoutingTable};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment
    let config = GatewayConfig::from_env()?;

    telemetry::init(&config.log_level, config.log_format)?;

    tracing::info!("Starting Portico Gateway");
    tracing::info!(
        listen_addr = %config.listen_addr,
        environment = %config.environment,
        routes_file = %config.routes_file.display(),
        identity_base_url = %config.auth.identity_base_url,
        allowed_origins = config.allowed_origins.len(),
        log_format = %config.log_format,
        "Gateway configuration loaded"
    );

    let routes = RoutingTable::from_file(&config.routes_file, &config.environment)?;
    tracing::info!(services = routes.len(), "Routing table loaded");

    #[cfg(feature = "dev-mode")]
    let (sessions, keys) = {
        tracing::warn!("DEV MODE ENABLED - using mock credential validators");
        tracing::warn!("Use tokens in format: test-session:<user-id>:<team-id>");
        (
            Arc::new(MockSessionValidator),
            Arc::new(MockKeyDirectory::new()),
        )
    };

    #[cfg(not(feature = "dev-mode"))]
    let (sessions, keys) = (
        Arc::new(HmacSessionValidator::new(config.auth.jwt_secret.as_bytes())),
        Arc::new(HttpKeyDirectory::new(&config.auth)?),
    );
    tracing::info!("Credential validators initialized");

    let listen_addr = config.listen_addr.clone();
    let state = GatewayState::new(config, routes, sessions, keys)?;
    let app = create_router(state);

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

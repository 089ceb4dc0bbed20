//! Gateway application state.
//!
//! This module defines the shared state that is available to the pipeline
//! and the local handlers. Everything in it is immutable after start-up.

use std::sync::Arc;

use portico_auth::{KeyDirectory, SessionValidator};

use crate::auth::CredentialResolver;
use crate::config::{ConfigError, GatewayConfig};
use crate::origin::OriginValidator;
use crate::proxy::Forwarder;
use crate::routing::RoutingTable;

/// Shared application state for the gateway.
pub struct GatewayState<V, K>
where
    V: SessionValidator,
    K: KeyDirectory,
{
    /// Gateway configuration.
    pub config: GatewayConfig,
    /// Service routing table.
    pub routes: RoutingTable,
    /// Origin validation stage.
    pub origins: OriginValidator<K>,
    /// Credential resolution stage.
    pub credentials: CredentialResolver<V, K>,
    /// Upstream forwarder.
    pub forwarder: Forwarder,
}

impl<V, K> GatewayState<V, K>
where
    V: SessionValidator,
    K: KeyDirectory,
{
    /// Create a new gateway state.
    ///
    /// The key directory is shared by the origin validator and the
    /// credential resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be built.
    pub fn new(
        config: GatewayConfig,
        routes: RoutingTable,
        sessions: Arc<V>,
        keys: Arc<K>,
    ) -> Result<Self, ConfigError> {
        let forwarder = Forwarder::new(config.upstream_timeout())?;

        Ok(Self {
            origins: OriginValidator::new(config.allowed_origins.clone(), Arc::clone(&keys)),
            credentials: CredentialResolver::new(sessions, keys, config.cookie_name.clone()),
            forwarder,
            routes,
            config,
        })
    }
}

//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::auth::{Authenticator, CredentialVerifier, JwtVerifier};
use crate::config::RealtimeConfig;
use crate::domain::EventBus;
use crate::service::{DispatchBridge, Transport};
use crate::ws::ConnectionHub;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live connections and rooms.
    pub hub: Arc<ConnectionHub>,
    /// Event bus producers publish into.
    pub event_bus: EventBus,
    /// Handshake authenticator.
    pub authenticator: Authenticator,
    /// Bus → transport bridge.
    pub bridge: Arc<DispatchBridge>,
    /// Loaded configuration.
    pub settings: Arc<RealtimeConfig>,
}

impl AppState {
    /// Wires the gateway from `config`, verifying tokens with HS256 JWT.
    #[must_use]
    pub fn from_config(config: RealtimeConfig) -> Self {
        let verifier = JwtVerifier::new(config.jwt_secret.as_bytes(), config.jwt_issuer.as_deref());
        Self::with_verifier(config, Arc::new(verifier))
    }

    /// Wires the gateway around a custom credential verifier.
    #[must_use]
    pub fn with_verifier(config: RealtimeConfig, verifier: Arc<dyn CredentialVerifier>) -> Self {
        let hub = Arc::new(ConnectionHub::new(config.connection_buffer));
        let transport: Arc<dyn Transport> = Arc::clone(&hub) as Arc<dyn Transport>;
        Self {
            event_bus: EventBus::new(config.event_bus_capacity),
            authenticator: Authenticator::new(verifier, config.handshake_timeout()),
            bridge: Arc::new(DispatchBridge::new(transport)),
            hub,
            settings: Arc::new(config),
        }
    }

    /// Registers the dispatch bridge on the bus and starts delivery.
    ///
    /// Call once; every call adds another delivery task.
    pub async fn start(&self) -> JoinHandle<()> {
        self.bridge.register(&self.event_bus).await;
        self.event_bus.start()
    }
}

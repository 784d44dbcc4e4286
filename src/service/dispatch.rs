//! Bridge between the event bus and the transport.
//!
//! [`DispatchBridge`] is registered once at startup as the listener for
//! every [`EventKind`]. Each envelope is validated, routed through the
//! static table in [`super::routes`] and handed to a [`Transport`].
//! Invalid payloads are logged and dropped here; no client sees them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;

use super::routes::route;
use crate::domain::{
    DeliveryReport, EventBus, EventEnvelope, EventKind, EventListener, OutboundMessage,
    SchemaRegistry,
};
use crate::error::RealtimeError;

/// Delivery seam between the bridge and the socket layer.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Queues `message` for every connection in its destination.
    async fn deliver(&self, message: &OutboundMessage) -> DeliveryReport;
}

/// Running counters kept by the bridge.
#[derive(Debug, Default)]
pub struct DispatchStats {
    dispatched: AtomicU64,
    dropped_invalid: AtomicU64,
    messages_sent: AtomicU64,
    delivery_failures: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSnapshot {
    /// Events that passed validation and were routed.
    pub dispatched: u64,
    /// Events dropped for failing validation.
    pub dropped_invalid: u64,
    /// Frames queued to connections.
    pub messages_sent: u64,
    /// Frames skipped because a connection's queue was full or closed.
    pub delivery_failures: u64,
}

impl DispatchStats {
    /// Reads all counters.
    #[must_use]
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped_invalid: self.dropped_invalid.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Validates, routes and delivers every event published on the bus.
#[derive(Debug)]
pub struct DispatchBridge {
    transport: Arc<dyn Transport>,
    stats: DispatchStats,
}

impl DispatchBridge {
    /// Creates a bridge delivering through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            stats: DispatchStats::default(),
        }
    }

    /// Subscribes the bridge to every event kind on `bus`.
    pub async fn register(self: &Arc<Self>, bus: &EventBus) {
        for kind in EventKind::ALL {
            let listener: Arc<dyn EventListener> = Arc::clone(self) as Arc<dyn EventListener>;
            bus.subscribe(kind, listener).await;
        }
        tracing::info!(kinds = EventKind::ALL.len(), "dispatch bridge registered");
    }

    /// Counters since startup.
    #[must_use]
    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }

    /// Processes one envelope. Returns the combined delivery report, or
    /// `None` if the payload was rejected.
    pub async fn dispatch(&self, envelope: &EventEnvelope) -> Option<DeliveryReport> {
        let event = match SchemaRegistry::validate(envelope.kind, &envelope.payload) {
            Ok(event) => event,
            Err(e) => {
                self.stats.dropped_invalid.fetch_add(1, Ordering::Relaxed);
                let reason = match e {
                    RealtimeError::InvalidPayload { reason, .. } => reason,
                    other => other.to_string(),
                };
                tracing::warn!(
                    kind = %envelope.kind,
                    %reason,
                    event_id = %envelope.event_id,
                    "invalid event payload dropped"
                );
                return None;
            }
        };

        let mut report = DeliveryReport::default();
        for message in route(&event) {
            report.merge(self.transport.deliver(&message).await);
        }

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        self.stats
            .messages_sent
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.stats
            .delivery_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        tracing::debug!(
            kind = %envelope.kind,
            delivered = report.delivered,
            failed = report.failed,
            "event dispatched"
        );
        Some(report)
    }
}

#[async_trait]
impl EventListener for DispatchBridge {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), RealtimeError> {
        self.dispatch(envelope).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dispatch-bridge"
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;
    use tokio::sync::Mutex;
    use tracing::{Level, Subscriber};
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    use super::*;
    use crate::domain::{Destination, MessageName};

    #[derive(Debug, Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn deliver(&self, message: &OutboundMessage) -> DeliveryReport {
            self.sent.lock().await.push(message.clone());
            DeliveryReport {
                delivered: 1,
                failed: 0,
            }
        }
    }

    #[derive(Debug, Clone, Default)]
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn bridge() -> (Arc<RecordingTransport>, DispatchBridge) {
        let transport = Arc::new(RecordingTransport::default());
        let bridge = DispatchBridge::new(Arc::clone(&transport) as Arc<dyn Transport>);
        (transport, bridge)
    }

    #[tokio::test]
    async fn malformed_presence_is_dropped_and_logged() {
        let counter = WarnCounter::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(counter.clone()));
        let (transport, bridge) = bridge();

        let envelope =
            EventEnvelope::new(EventKind::PresenceUpdated, json!({"gymId": "abc", "currentCount": 3}));
        assert!(bridge.dispatch(&envelope).await.is_none());

        assert!(transport.sent.lock().await.is_empty());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.stats().dropped_invalid, 1);
        assert_eq!(bridge.stats().dispatched, 0);
    }

    #[tokio::test]
    async fn missing_required_field_produces_nothing() {
        let (transport, bridge) = bridge();
        let envelope = EventEnvelope::new(
            EventKind::UserTokensUpdated,
            json!({"userId": 1, "previousBalance": 0, "delta": 5, "reason": "checkin"}),
        );
        assert!(bridge.dispatch(&envelope).await.is_none());
        assert!(transport.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn tokens_event_sends_owner_and_operator_messages() {
        let (transport, bridge) = bridge();
        let envelope = EventEnvelope::new(
            EventKind::UserTokensUpdated,
            json!({"userId": 42, "newBalance": 120, "previousBalance": 100,
                   "delta": 20, "reason": "checkin", "ledgerEntryId": 77}),
        );
        let Some(report) = bridge.dispatch(&envelope).await else {
            panic!("valid tokens event should dispatch");
        };
        assert_eq!(report.delivered, 2);

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.name == MessageName::UserTokensUpdated));
        assert_eq!(bridge.stats().messages_sent, 2);
    }

    #[tokio::test]
    async fn gym_created_goes_to_everyone() {
        let (transport, bridge) = bridge();
        let envelope = EventEnvelope::new(EventKind::GymCreated, json!({"id": 1, "name": "Core"}));
        let _ = bridge.dispatch(&envelope).await;

        let sent = transport.sent.lock().await;
        let [msg] = sent.as_slice() else {
            panic!("expected one message");
        };
        assert_eq!(msg.destination, Destination::Everyone);
        assert_eq!(msg.payload["action"], "created");
    }

    #[tokio::test]
    async fn registered_bridge_receives_bus_events() {
        let transport = Arc::new(RecordingTransport::default());
        let bridge = Arc::new(DispatchBridge::new(
            Arc::clone(&transport) as Arc<dyn Transport>
        ));
        let bus = EventBus::new(16);
        bridge.register(&bus).await;
        for kind in EventKind::ALL {
            assert_eq!(bus.listener_count(kind).await, 1);
        }
        let _task = bus.start();

        bus.publish_raw(
            EventKind::SystemAnnouncement,
            json!({"message": "maintenance at 2am", "priority": "normal"}),
        );

        for _ in 0..50 {
            if bridge.stats().dispatched == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(bridge.stats().dispatched, 1);
        assert_eq!(transport.sent.lock().await.len(), 1);
    }
}

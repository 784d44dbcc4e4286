//! In-process publish/subscribe for domain events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Producers call
//! [`EventBus::publish`] (never blocks, never fails the caller); a single
//! delivery task started with [`EventBus::start`] hands each envelope to the
//! [`EventListener`]s registered for its kind, in publish order.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;

use super::{DomainEvent, EventEnvelope, EventKind};
use crate::error::RealtimeError;

/// Receives envelopes for the kinds it was subscribed to.
///
/// Errors and panics stay inside the delivery task: they are logged and
/// the next listener still runs.
#[async_trait]
pub trait EventListener: Send + Sync + std::fmt::Debug {
    /// Handles one envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`RealtimeError`] that the bus logs and discards.
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), RealtimeError>;

    /// Listener name for logs.
    fn name(&self) -> &'static str;
}

type ListenerMap = HashMap<EventKind, Vec<Arc<dyn EventListener>>>;

/// Broadcast bus for [`EventEnvelope`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity
/// (default 10 000). When the ring buffer is full the oldest envelopes are
/// dropped for the lagging delivery task, which logs how many it missed.
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    listeners: Arc<RwLock<ListenerMap>>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publishes a typed event.
    ///
    /// Returns the number of delivery tasks that will see it. With no
    /// running delivery task the event is silently lost.
    pub fn publish(&self, event: DomainEvent) -> usize {
        let kind = event.kind();
        match event.into_envelope() {
            Ok(envelope) => self.publish_envelope(envelope),
            Err(e) => {
                tracing::warn!(%kind, error = %e, "domain event could not be serialized; dropped");
                0
            }
        }
    }

    /// Publishes an untyped payload under `kind`. The payload is validated
    /// downstream, not here.
    pub fn publish_raw(&self, kind: EventKind, payload: Value) -> usize {
        self.publish_envelope(EventEnvelope::new(kind, payload))
    }

    /// Publishes a prepared envelope.
    pub fn publish_envelope(&self, envelope: EventEnvelope) -> usize {
        tracing::trace!(kind = %envelope.kind, event_id = %envelope.event_id, "event published");
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Registers `listener` for `kind`. Several listeners may share a kind;
    /// they run in registration order.
    pub async fn subscribe(&self, kind: EventKind, listener: Arc<dyn EventListener>) {
        self.listeners
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(listener);
    }

    /// Number of listeners registered for `kind`.
    pub async fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().await.get(&kind).map_or(0, Vec::len)
    }

    /// Returns the current number of active receivers (delivery tasks).
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Spawns the delivery task.
    ///
    /// The task ends when every clone of the bus has been dropped.
    #[must_use = "dropping the handle detaches the delivery task"]
    pub fn start(&self) -> JoinHandle<()> {
        let mut rx = self.sender.subscribe();
        let listeners = Arc::clone(&self.listeners);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => deliver(&listeners, &envelope).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "event bus delivery lagged; events lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("event bus delivery task stopped");
        })
    }
}

async fn deliver(listeners: &RwLock<ListenerMap>, envelope: &EventEnvelope) {
    let targets = listeners
        .read()
        .await
        .get(&envelope.kind)
        .cloned()
        .unwrap_or_default();

    if targets.is_empty() {
        tracing::debug!(kind = %envelope.kind, "no listener for event kind");
        return;
    }

    for listener in targets {
        match AssertUnwindSafe(listener.handle(envelope)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                listener = listener.name(),
                kind = %envelope.kind,
                error = %e,
                "event listener failed"
            ),
            Err(_) => tracing::error!(
                listener = listener.name(),
                kind = %envelope.kind,
                "event listener panicked"
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    #[derive(Debug)]
    struct Forward(mpsc::UnboundedSender<EventEnvelope>);

    #[async_trait]
    impl EventListener for Forward {
        async fn handle(&self, envelope: &EventEnvelope) -> Result<(), RealtimeError> {
            let _ = self.0.send(envelope.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "forward"
        }
    }

    #[derive(Debug)]
    struct Explode;

    #[async_trait]
    impl EventListener for Explode {
        async fn handle(&self, _envelope: &EventEnvelope) -> Result<(), RealtimeError> {
            panic!("listener bug");
        }

        fn name(&self) -> &'static str {
            "explode"
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<EventEnvelope>) -> EventEnvelope {
        let Ok(Some(envelope)) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await
        else {
            panic!("expected an envelope");
        };
        envelope
    }

    #[test]
    fn publish_without_delivery_task_returns_zero() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish_raw(EventKind::GymCreated, json!({"id": 1})), 0);
    }

    #[tokio::test]
    async fn listener_receives_in_publish_order() {
        let bus = EventBus::new(16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(EventKind::PresenceUpdated, Arc::new(Forward(tx)))
            .await;
        let _task = bus.start();

        for count in 1..=3 {
            assert_eq!(
                bus.publish_raw(EventKind::PresenceUpdated, json!({"gymId": 1, "currentCount": count})),
                1
            );
        }
        for count in 1..=3 {
            assert_eq!(next(&mut rx).await.payload["currentCount"], count);
        }
    }

    #[tokio::test]
    async fn listener_only_sees_subscribed_kinds() {
        let bus = EventBus::new(16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(EventKind::GymUpdated, Arc::new(Forward(tx))).await;
        let _task = bus.start();

        bus.publish_raw(EventKind::GymDeleted, json!({"id": 1}));
        bus.publish_raw(EventKind::GymUpdated, json!({"id": 2}));

        assert_eq!(next(&mut rx).await.kind, EventKind::GymUpdated);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_stop_delivery() {
        let bus = EventBus::new(16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(EventKind::SystemAnnouncement, Arc::new(Explode))
            .await;
        bus.subscribe(EventKind::SystemAnnouncement, Arc::new(Forward(tx)))
            .await;
        assert_eq!(bus.listener_count(EventKind::SystemAnnouncement).await, 2);
        let _task = bus.start();

        bus.publish_raw(EventKind::SystemAnnouncement, json!({"message": "a"}));
        bus.publish_raw(EventKind::SystemAnnouncement, json!({"message": "b"}));

        assert_eq!(next(&mut rx).await.payload["message"], "a");
        assert_eq!(next(&mut rx).await.payload["message"], "b");
    }

    #[test]
    fn receiver_count_tracks_delivery_tasks() {
        let bus = EventBus::new(4);
        assert_eq!(bus.receiver_count(), 0);
        tokio_test::block_on(async {
            let task = bus.start();
            assert_eq!(bus.receiver_count(), 1);
            task.abort();
        });
    }
}

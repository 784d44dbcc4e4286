//! Connection and room membership registry.
//!
//! [`ConnectionHub`] is the single owner of live connections. Both maps
//! (connection → rooms, room → connections) sit behind one
//! [`tokio::sync::RwLock`], so a join, leave or close is never observed
//! half-applied. No I/O happens under the lock: frames are handed to each
//! connection's bounded queue with `try_send`, and the connection task
//! does the actual socket write.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};

use super::messages::WsMessage;
use crate::auth::Principal;
use crate::domain::{ConnectionId, DeliveryReport, Destination, MessageName, OutboundMessage, RoomName};
use crate::error::RealtimeError;
use crate::service::Transport;

#[derive(Debug)]
struct ConnectionEntry {
    principal: Principal,
    rooms: HashSet<RoomName>,
    sender: mpsc::Sender<Message>,
    connected_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct HubInner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomName, HashSet<ConnectionId>>,
}

/// Read-only view of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Connection id.
    pub id: ConnectionId,
    /// Owning principal.
    pub principal: Principal,
    /// Joined rooms, sorted.
    pub rooms: Vec<RoomName>,
    /// When the connection was registered.
    pub connected_at: DateTime<Utc>,
}

/// Registry of live connections and their room memberships.
#[derive(Debug)]
pub struct ConnectionHub {
    inner: RwLock<HubInner>,
    buffer: usize,
}

impl ConnectionHub {
    /// Creates an empty hub whose per-connection queues hold `buffer` frames.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: RwLock::new(HubInner::default()),
            buffer: buffer.max(1),
        }
    }

    /// Registers a connection for `principal` with no rooms.
    ///
    /// The returned receiver is the connection's outbound queue; the
    /// connection task drains it into the socket.
    pub async fn register(&self, principal: Principal) -> (ConnectionId, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = ConnectionId::new();
        let user_id = principal.user_id;
        self.inner.write().await.connections.insert(
            id,
            ConnectionEntry {
                principal,
                rooms: HashSet::new(),
                sender,
                connected_at: Utc::now(),
            },
        );
        tracing::debug!(connection_id = %id, user_id, "connection registered");
        (id, receiver)
    }

    /// Adds `id` to `room`. Joining a room twice is a no-op.
    ///
    /// Returns `true` if the membership is new.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::ConnectionNotFound`] if `id` is not registered.
    pub async fn join(&self, id: ConnectionId, room: &RoomName) -> Result<bool, RealtimeError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .connections
            .get_mut(&id)
            .ok_or(RealtimeError::ConnectionNotFound(id))?;
        if !entry.rooms.insert(room.clone()) {
            return Ok(false);
        }
        inner.rooms.entry(room.clone()).or_default().insert(id);
        tracing::debug!(connection_id = %id, %room, "joined room");
        Ok(true)
    }

    /// Removes `id` from `room`, deleting the room once it is empty.
    ///
    /// Returns `true` if the connection was a member.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::ConnectionNotFound`] if `id` is not registered.
    pub async fn leave(&self, id: ConnectionId, room: &RoomName) -> Result<bool, RealtimeError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .connections
            .get_mut(&id)
            .ok_or(RealtimeError::ConnectionNotFound(id))?;
        if !entry.rooms.remove(room) {
            return Ok(false);
        }
        remove_member(&mut inner.rooms, room, id);
        tracing::debug!(connection_id = %id, %room, "left room");
        Ok(true)
    }

    /// Forgets `id` and every membership it held, in one step.
    ///
    /// Closing an unknown connection is a no-op and returns `false`.
    pub async fn close(&self, id: ConnectionId) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.connections.remove(&id) else {
            return false;
        };
        for room in &entry.rooms {
            remove_member(&mut inner.rooms, room, id);
        }
        tracing::debug!(
            connection_id = %id,
            user_id = entry.principal.user_id,
            rooms = entry.rooms.len(),
            "connection closed"
        );
        true
    }

    /// Queues `message` for every connection in its destination.
    ///
    /// Each connection receives the frame at most once, even when it is a
    /// member of several target rooms. A full or closed queue only affects
    /// that connection.
    pub async fn deliver(&self, message: &OutboundMessage) -> DeliveryReport {
        let frame = match WsMessage::event(message.name.as_str(), message.payload.clone()).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(event = %message.name, error = %e, "outbound frame could not be encoded");
                return DeliveryReport::default();
            }
        };

        let inner = self.inner.read().await;
        let recipients: HashSet<ConnectionId> = match &message.destination {
            Destination::Everyone => inner.connections.keys().copied().collect(),
            Destination::Rooms(rooms) => rooms
                .iter()
                .filter_map(|room| inner.rooms.get(room))
                .flatten()
                .copied()
                .collect(),
        };

        let mut report = DeliveryReport::default();
        for id in recipients {
            let Some(entry) = inner.connections.get(&id) else {
                continue;
            };
            match entry.sender.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    let reason = match e {
                        mpsc::error::TrySendError::Full(_) => "outbound queue full",
                        mpsc::error::TrySendError::Closed(_) => "outbound queue closed",
                    };
                    let failure = RealtimeError::TransportFailure {
                        connection_id: id,
                        reason: reason.to_string(),
                    };
                    tracing::debug!(event = %message.name, error = %failure, "delivery skipped");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Sends `payload` as `name` to every open connection.
    pub async fn broadcast_all(&self, name: MessageName, payload: Value) -> DeliveryReport {
        self.deliver(&OutboundMessage {
            name,
            payload,
            destination: Destination::Everyone,
        })
        .await
    }

    /// Members of `room`; empty if the room does not exist.
    pub async fn members(&self, room: &RoomName) -> Vec<ConnectionId> {
        self.inner
            .read()
            .await
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Rooms joined by `id`, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::ConnectionNotFound`] if `id` is not registered.
    pub async fn rooms_of(&self, id: ConnectionId) -> Result<Vec<RoomName>, RealtimeError> {
        let inner = self.inner.read().await;
        let entry = inner
            .connections
            .get(&id)
            .ok_or(RealtimeError::ConnectionNotFound(id))?;
        let mut rooms: Vec<RoomName> = entry.rooms.iter().cloned().collect();
        rooms.sort();
        Ok(rooms)
    }

    /// Snapshot of one connection.
    pub async fn info(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        let inner = self.inner.read().await;
        let entry = inner.connections.get(&id)?;
        let mut rooms: Vec<RoomName> = entry.rooms.iter().cloned().collect();
        rooms.sort();
        Some(ConnectionInfo {
            id,
            principal: entry.principal.clone(),
            rooms,
            connected_at: entry.connected_at,
        })
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Number of non-empty rooms.
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}

fn remove_member(rooms: &mut HashMap<RoomName, HashSet<ConnectionId>>, room: &RoomName, id: ConnectionId) {
    if let Some(members) = rooms.get_mut(room) {
        members.remove(&id);
        if members.is_empty() {
            rooms.remove(room);
        }
    }
}

#[async_trait]
impl Transport for ConnectionHub {
    async fn deliver(&self, message: &OutboundMessage) -> DeliveryReport {
        Self::deliver(self, message).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::{Audience, RoomRouter};

    fn room(audience: Audience) -> RoomName {
        let Ok(room) = RoomRouter::room(audience) else {
            panic!("{audience:?} has a room");
        };
        room
    }

    fn to_rooms(audiences: &[Audience]) -> OutboundMessage {
        OutboundMessage {
            name: MessageName::PresenceUpdated,
            payload: json!({"gymId": 1, "currentCount": 4}),
            destination: RoomRouter::resolve_all(audiences),
        }
    }

    fn frame_text(message: Message) -> String {
        let Message::Text(text) = message else {
            panic!("expected a text frame");
        };
        text.as_str().to_owned()
    }

    #[tokio::test]
    async fn join_is_idempotent_and_requires_registration() {
        let hub = ConnectionHub::new(8);
        let (id, _rx) = hub.register(Principal::new(1, "a@b.c", vec![])).await;
        let gym = room(Audience::Gym(5));

        assert!(matches!(hub.join(id, &gym).await, Ok(true)));
        assert!(matches!(hub.join(id, &gym).await, Ok(false)));
        assert_eq!(hub.members(&gym).await, vec![id]);

        let stranger = ConnectionId::new();
        assert!(matches!(
            hub.join(stranger, &gym).await,
            Err(RealtimeError::ConnectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn leave_deletes_empty_rooms() {
        let hub = ConnectionHub::new(8);
        let (id, _rx) = hub.register(Principal::new(1, "a@b.c", vec![])).await;
        let gym = room(Audience::Gym(5));
        let _ = hub.join(id, &gym).await;
        assert_eq!(hub.room_count().await, 1);

        assert!(matches!(hub.leave(id, &gym).await, Ok(true)));
        assert!(matches!(hub.leave(id, &gym).await, Ok(false)));
        assert_eq!(hub.room_count().await, 0);
        assert!(hub.members(&gym).await.is_empty());
    }

    #[tokio::test]
    async fn close_removes_every_membership() {
        let hub = ConnectionHub::new(8);
        let (a, _rx_a) = hub.register(Principal::new(1, "a@b.c", vec![])).await;
        let (b, _rx_b) = hub.register(Principal::new(2, "b@b.c", vec![])).await;
        let shared = room(Audience::Gym(1));
        let _ = hub.join(a, &shared).await;
        let _ = hub.join(a, &room(Audience::User(1))).await;
        let _ = hub.join(b, &shared).await;

        assert!(hub.close(a).await);
        assert!(!hub.close(a).await);
        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(hub.room_count().await, 1);
        assert_eq!(hub.members(&shared).await, vec![b]);
        assert!(hub.rooms_of(a).await.is_err());
    }

    #[tokio::test]
    async fn deliver_reaches_each_member_once() {
        let hub = ConnectionHub::new(8);
        let (id, mut rx) = hub.register(Principal::new(1, "a@b.c", vec![])).await;
        let _ = hub.join(id, &room(Audience::User(1))).await;
        let _ = hub.join(id, &room(Audience::UserTokens(1))).await;

        let report = hub
            .deliver(&to_rooms(&[Audience::User(1), Audience::UserTokens(1)]))
            .await;
        assert_eq!(report, DeliveryReport { delivered: 1, failed: 0 });

        let Some(frame) = rx.recv().await else {
            panic!("frame expected");
        };
        let Ok(value) = serde_json::from_str::<Value>(&frame_text(frame)) else {
            panic!("frame is JSON");
        };
        assert_eq!(value["event"], "presence:updated");
        assert_eq!(value["payload"]["currentCount"], 4);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn deliver_to_empty_room_is_a_no_op() {
        let hub = ConnectionHub::new(8);
        let report = hub.deliver(&to_rooms(&[Audience::Gym(404)])).await;
        assert_eq!(report, DeliveryReport::default());
    }

    #[tokio::test]
    async fn full_queue_fails_only_that_connection() {
        let hub = ConnectionHub::new(1);
        let (slow, _slow_rx) = hub.register(Principal::new(1, "a@b.c", vec![])).await;
        let (fast, mut fast_rx) = hub.register(Principal::new(2, "b@b.c", vec![])).await;
        let gym = room(Audience::Gym(1));
        let _ = hub.join(slow, &gym).await;
        let _ = hub.join(fast, &gym).await;

        let first = hub.deliver(&to_rooms(&[Audience::Gym(1)])).await;
        assert_eq!(first.delivered, 2);
        let _ = fast_rx.recv().await;

        let second = hub.deliver(&to_rooms(&[Audience::Gym(1)])).await;
        assert_eq!(second, DeliveryReport { delivered: 1, failed: 1 });
    }

    #[tokio::test]
    async fn broadcast_reaches_connections_without_rooms() {
        let hub = ConnectionHub::new(8);
        let (_a, mut rx_a) = hub.register(Principal::new(1, "a@b.c", vec![])).await;
        let (_b, mut rx_b) = hub.register(Principal::new(2, "b@b.c", vec![])).await;

        let report = hub
            .broadcast_all(MessageName::SystemAnnouncement, json!({"message": "hi"}))
            .await;
        assert_eq!(report.delivered, 2);
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn info_reports_sorted_rooms() {
        let hub = ConnectionHub::new(8);
        let (id, _rx) = hub.register(Principal::new(3, "c@b.c", vec![])).await;
        let _ = hub.join(id, &room(Audience::User(3))).await;
        let _ = hub.join(id, &room(Audience::Gym(2))).await;

        let Some(info) = hub.info(id).await else {
            panic!("connection is registered");
        };
        assert_eq!(info.principal.user_id, 3);
        let keys: Vec<&str> = info.rooms.iter().map(RoomName::as_str).collect();
        assert_eq!(keys, vec!["gym:2", "user:3"]);
    }
}

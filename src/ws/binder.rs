//! Session/room binding.
//!
//! After a connection is admitted, [`SessionBinder::bind`] joins it to the
//! principal's personal room and builds the `connection:ack` payload.
//! Client `subscribe` / `unsubscribe` commands go through the same type so
//! every membership change passes [`SubscriptionPolicy`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::hub::ConnectionHub;
use super::subscription::SubscriptionPolicy;
use crate::auth::{Principal, Role};
use crate::domain::{AdminTopic, Audience, ConnectionId, RoomName, RoomRouter};
use crate::error::RealtimeError;

/// Payload of the `connection:ack` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAck {
    /// Resolved user id.
    pub user_id: u64,
    /// Resolved email.
    pub email: String,
    /// Granted roles.
    pub roles: Vec<Role>,
    /// Server-assigned connection id.
    pub connection_id: ConnectionId,
    /// Rooms joined so far.
    pub rooms: Vec<RoomName>,
    /// Admin topic rooms the client may subscribe to; empty for non-admins.
    pub available_topics: Vec<RoomName>,
    /// Server time at binding.
    pub timestamp: DateTime<Utc>,
}

/// Result of a `subscribe` or `unsubscribe` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomChange {
    /// Room the command targeted.
    pub room: RoomName,
    /// Whether membership actually changed (`false` for repeats).
    pub changed: bool,
    /// Rooms joined after the command.
    pub rooms: Vec<RoomName>,
}

/// Applies membership changes on behalf of one connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionBinder;

impl SessionBinder {
    /// Joins `id` to `user:<principal.user_id>` and returns the ack payload.
    ///
    /// Rebinding an already-bound connection is a no-op apart from a fresh
    /// timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::ConnectionNotFound`] if `id` was closed
    /// before binding completed.
    pub async fn bind(
        hub: &ConnectionHub,
        id: ConnectionId,
        principal: &Principal,
    ) -> Result<ConnectionAck, RealtimeError> {
        let personal = RoomRouter::room(Audience::User(principal.user_id))?;
        hub.join(id, &personal).await?;

        let available_topics = if principal.is_admin() {
            AdminTopic::ALL
                .into_iter()
                .map(|topic| RoomRouter::room(Audience::AdminTopic(topic)))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        tracing::info!(
            connection_id = %id,
            user_id = principal.user_id,
            admin = principal.is_admin(),
            "session bound"
        );

        Ok(ConnectionAck {
            user_id: principal.user_id,
            email: principal.email.clone(),
            roles: principal.roles.clone(),
            connection_id: id,
            rooms: hub.rooms_of(id).await?,
            available_topics,
            timestamp: Utc::now(),
        })
    }

    /// Handles a client `subscribe` for room `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::UnknownAudience`] or
    /// [`RealtimeError::Forbidden`] from the policy, or
    /// [`RealtimeError::ConnectionNotFound`] if the connection is gone.
    pub async fn subscribe(
        hub: &ConnectionHub,
        id: ConnectionId,
        principal: &Principal,
        key: &str,
    ) -> Result<RoomChange, RealtimeError> {
        let room = SubscriptionPolicy::authorize_join(principal, key)?;
        let changed = hub.join(id, &room).await?;
        Ok(RoomChange {
            rooms: hub.rooms_of(id).await?,
            room,
            changed,
        })
    }

    /// Handles a client `unsubscribe` for room `key`.
    ///
    /// # Errors
    ///
    /// Same as [`SessionBinder::subscribe`]; the personal room is refused
    /// with [`RealtimeError::Forbidden`].
    pub async fn unsubscribe(
        hub: &ConnectionHub,
        id: ConnectionId,
        principal: &Principal,
        key: &str,
    ) -> Result<RoomChange, RealtimeError> {
        let room = SubscriptionPolicy::authorize_leave(principal, key)?;
        let changed = hub.leave(id, &room).await?;
        Ok(RoomChange {
            rooms: hub.rooms_of(id).await?,
            room,
            changed,
        })
    }
}

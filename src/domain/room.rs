//! Audience descriptors and the room naming scheme.
//!
//! This is the only place room keys are built or parsed. Producers and the
//! dispatch bridge speak in [`Audience`]s; the hub only ever sees the
//! [`RoomName`]s the [`RoomRouter`] resolves them to.
//!
//! | Audience            | Room key                  |
//! |---------------------|---------------------------|
//! | `User(id)`          | `user:<id>`               |
//! | `UserTokens(id)`    | `user:<id>:tokens`        |
//! | `Gym(id)`           | `gym:<id>`                |
//! | `AdminTopic(topic)` | `admin:<topic>`           |
//! | `Broadcast`         | none (every connection)   |

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::RealtimeError;

/// Administrative topic rooms an admin console may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdminTopic {
    /// Gym onboarding requests.
    GymRequests,
    /// Account, status and balance changes.
    UserManagement,
    /// Dashboard aggregates.
    Stats,
}

impl AdminTopic {
    /// Every topic, in the order offered to admins on connect.
    pub const ALL: [Self; 3] = [Self::GymRequests, Self::UserManagement, Self::Stats];

    /// Topic segment of the room key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GymRequests => "gym-requests",
            Self::UserManagement => "user-management",
            Self::Stats => "stats",
        }
    }
}

/// Logical recipient set of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Audience {
    /// Every connection of one user.
    User(u64),
    /// Opt-in token-balance stream of one user.
    UserTokens(u64),
    /// Watchers of one gym.
    Gym(u64),
    /// Admin consoles subscribed to a topic.
    AdminTopic(AdminTopic),
    /// Every open connection.
    Broadcast,
}

impl FromStr for Audience {
    type Err = RealtimeError;

    /// Parses a client-supplied room key. [`Audience::Broadcast`] has no key
    /// and is never produced.
    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let unknown = || RealtimeError::UnknownAudience(key.to_string());
        let mut parts = key.split(':');
        let audience = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("user"), Some(id), None, None) => Self::User(parse_id(id).ok_or_else(unknown)?),
            (Some("user"), Some(id), Some("tokens"), None) => {
                Self::UserTokens(parse_id(id).ok_or_else(unknown)?)
            }
            (Some("gym"), Some(id), None, None) => Self::Gym(parse_id(id).ok_or_else(unknown)?),
            (Some("admin"), Some(topic), None, None) => Self::AdminTopic(
                AdminTopic::ALL
                    .into_iter()
                    .find(|t| t.as_str() == topic)
                    .ok_or_else(unknown)?,
            ),
            _ => return Err(unknown()),
        };
        Ok(audience)
    }
}

/// Ids are positive integers; `0` is never a valid row id.
fn parse_id(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().filter(|id| *id > 0)
}

/// Transport-level room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    /// Returns the room key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an outbound message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Members of any of these rooms (each connection at most once).
    Rooms(Vec<RoomName>),
    /// Every open connection, regardless of membership.
    Everyone,
}

/// Pure audience → room resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoomRouter;

impl RoomRouter {
    /// Resolves an audience to its destination.
    #[must_use]
    pub fn resolve(audience: Audience) -> Destination {
        match audience {
            Audience::Broadcast => Destination::Everyone,
            Audience::User(id) => Destination::Rooms(vec![RoomName(format!("user:{id}"))]),
            Audience::UserTokens(id) => {
                Destination::Rooms(vec![RoomName(format!("user:{id}:tokens"))])
            }
            Audience::Gym(id) => Destination::Rooms(vec![RoomName(format!("gym:{id}"))]),
            Audience::AdminTopic(topic) => {
                Destination::Rooms(vec![RoomName(format!("admin:{}", topic.as_str()))])
            }
        }
    }

    /// Resolves several audiences into one destination.
    ///
    /// Any [`Audience::Broadcast`] widens the destination to everyone.
    #[must_use]
    pub fn resolve_all(audiences: &[Audience]) -> Destination {
        let mut rooms = Vec::with_capacity(audiences.len());
        for audience in audiences {
            match Self::resolve(*audience) {
                Destination::Everyone => return Destination::Everyone,
                Destination::Rooms(resolved) => rooms.extend(resolved),
            }
        }
        rooms.sort();
        rooms.dedup();
        Destination::Rooms(rooms)
    }

    /// Resolves an audience that must name a concrete room.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::UnknownAudience`] for [`Audience::Broadcast`],
    /// which has no room key.
    pub fn room(audience: Audience) -> Result<RoomName, RealtimeError> {
        match Self::resolve(audience) {
            Destination::Rooms(rooms) => rooms
                .into_iter()
                .next()
                .ok_or_else(|| RealtimeError::UnknownAudience(format!("{audience:?}"))),
            Destination::Everyone => Err(RealtimeError::UnknownAudience(
                "broadcast has no room key".to_string(),
            )),
        }
    }
}

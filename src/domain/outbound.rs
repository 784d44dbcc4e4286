//! Wire-ready messages produced by the dispatch bridge.

use serde::Serialize;
use serde_json::Value;

use super::room::Destination;

/// Outbound message names. This namespace is distinct from
/// [`super::EventKind`]: several kinds share one name
/// (`data:gyms:updated` carries all three gym kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MessageName {
    /// `connection:ack`
    #[serde(rename = "connection:ack")]
    ConnectionAck,
    /// `notification:new`
    #[serde(rename = "notification:new")]
    NotificationNew,
    /// `assistance:registered`
    #[serde(rename = "assistance:registered")]
    AssistanceRegistered,
    /// `presence:updated`
    #[serde(rename = "presence:updated")]
    PresenceUpdated,
    /// `streak:updated`
    #[serde(rename = "streak:updated")]
    StreakUpdated,
    /// `streak:milestone`
    #[serde(rename = "streak:milestone")]
    StreakMilestone,
    /// `user:tokens:updated`
    #[serde(rename = "user:tokens:updated")]
    UserTokensUpdated,
    /// `user:subscription:updated`
    #[serde(rename = "user:subscription:updated")]
    UserSubscriptionUpdated,
    /// `user:profile:updated`
    #[serde(rename = "user:profile:updated")]
    UserProfileUpdated,
    /// `user:status:updated`
    #[serde(rename = "user:status:updated")]
    UserStatusUpdated,
    /// `gym:request:created`
    #[serde(rename = "gym:request:created")]
    GymRequestCreated,
    /// `gym:request:approved`
    #[serde(rename = "gym:request:approved")]
    GymRequestApproved,
    /// `gym:request:rejected`
    #[serde(rename = "gym:request:rejected")]
    GymRequestRejected,
    /// `data:gyms:updated`
    #[serde(rename = "data:gyms:updated")]
    DataGymsUpdated,
    /// `data:achievements:updated`
    #[serde(rename = "data:achievements:updated")]
    DataAchievementsUpdated,
    /// `data:rewards:updated`
    #[serde(rename = "data:rewards:updated")]
    DataRewardsUpdated,
    /// `data:exercises:updated`
    #[serde(rename = "data:exercises:updated")]
    DataExercisesUpdated,
    /// `data:routine-templates:updated`
    #[serde(rename = "data:routine-templates:updated")]
    DataRoutineTemplatesUpdated,
    /// `stats:updated`
    #[serde(rename = "stats:updated")]
    StatsUpdated,
    /// `system:announcement`
    #[serde(rename = "system:announcement")]
    SystemAnnouncement,
}

impl MessageName {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionAck => "connection:ack",
            Self::NotificationNew => "notification:new",
            Self::AssistanceRegistered => "assistance:registered",
            Self::PresenceUpdated => "presence:updated",
            Self::StreakUpdated => "streak:updated",
            Self::StreakMilestone => "streak:milestone",
            Self::UserTokensUpdated => "user:tokens:updated",
            Self::UserSubscriptionUpdated => "user:subscription:updated",
            Self::UserProfileUpdated => "user:profile:updated",
            Self::UserStatusUpdated => "user:status:updated",
            Self::GymRequestCreated => "gym:request:created",
            Self::GymRequestApproved => "gym:request:approved",
            Self::GymRequestRejected => "gym:request:rejected",
            Self::DataGymsUpdated => "data:gyms:updated",
            Self::DataAchievementsUpdated => "data:achievements:updated",
            Self::DataRewardsUpdated => "data:rewards:updated",
            Self::DataExercisesUpdated => "data:exercises:updated",
            Self::DataRoutineTemplatesUpdated => "data:routine-templates:updated",
            Self::StatsUpdated => "stats:updated",
            Self::SystemAnnouncement => "system:announcement",
        }
    }
}

impl std::fmt::Display for MessageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated message ready for the transport.
///
/// Only the dispatch bridge builds these, and only from a validated
/// [`super::DomainEvent`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Wire name.
    pub name: MessageName,
    /// JSON object delivered as the frame payload.
    pub payload: Value,
    /// Target rooms or everyone.
    pub destination: Destination,
}

/// Outcome of one delivery, per connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Connections the frame was queued for.
    pub delivered: usize,
    /// Connections skipped because their queue was full or closed.
    pub failed: usize,
}

impl DeliveryReport {
    /// Adds another report's counts to this one.
    pub fn merge(&mut self, other: Self) {
        self.delivered = self.delivered.saturating_add(other.delivered);
        self.failed = self.failed.saturating_add(other.failed);
    }
}

//! Domain events published by business-logic producers.
//!
//! Producers inside the process publish a typed [`DomainEvent`]; producers
//! outside it (the ingest endpoint) submit an [`EventKind`] plus a raw JSON
//! payload. Both travel the bus as an [`EventEnvelope`] and are re-validated
//! by the schema registry before anything reaches a socket.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed enumeration of every domain event kind.
///
/// Serialized in `SCREAMING_SNAKE_CASE` (`USER_TOKENS_UPDATED`), which is
/// the name producers use on the ingest endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A notification was stored for a user.
    NotificationCreated,
    /// A gym check-in (assistance) was recorded.
    AssistanceRegistered,
    /// A gym's live head-count changed.
    PresenceUpdated,
    /// A user's streak counters changed.
    StreakUpdated,
    /// A user crossed a streak milestone.
    StreakMilestone,
    /// A user's token balance changed.
    UserTokensUpdated,
    /// A user's subscription plan changed.
    UserSubscriptionUpdated,
    /// A user's profile was edited.
    UserProfileUpdated,
    /// An account was activated or deactivated.
    UserStatusUpdated,
    /// A gym owner submitted a new gym request.
    GymRequestCreated,
    /// A gym request was approved.
    GymRequestApproved,
    /// A gym request was rejected.
    GymRequestRejected,
    /// Gym catalog entry created.
    GymCreated,
    /// Gym catalog entry updated.
    GymUpdated,
    /// Gym catalog entry deleted.
    GymDeleted,
    /// Achievement definition created.
    AchievementCreated,
    /// Achievement definition updated.
    AchievementUpdated,
    /// Achievement definition deleted.
    AchievementDeleted,
    /// Reward created.
    RewardCreated,
    /// Reward updated.
    RewardUpdated,
    /// Reward deleted.
    RewardDeleted,
    /// Exercise created.
    ExerciseCreated,
    /// Exercise updated.
    ExerciseUpdated,
    /// Exercise deleted.
    ExerciseDeleted,
    /// Routine template created.
    RoutineTemplateCreated,
    /// Routine template updated.
    RoutineTemplateUpdated,
    /// Routine template deleted.
    RoutineTemplateDeleted,
    /// Aggregated admin dashboard stats were recomputed.
    AdminStatsUpdated,
    /// Operator-wide announcement.
    SystemAnnouncement,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 29] = [
        Self::NotificationCreated,
        Self::AssistanceRegistered,
        Self::PresenceUpdated,
        Self::StreakUpdated,
        Self::StreakMilestone,
        Self::UserTokensUpdated,
        Self::UserSubscriptionUpdated,
        Self::UserProfileUpdated,
        Self::UserStatusUpdated,
        Self::GymRequestCreated,
        Self::GymRequestApproved,
        Self::GymRequestRejected,
        Self::GymCreated,
        Self::GymUpdated,
        Self::GymDeleted,
        Self::AchievementCreated,
        Self::AchievementUpdated,
        Self::AchievementDeleted,
        Self::RewardCreated,
        Self::RewardUpdated,
        Self::RewardDeleted,
        Self::ExerciseCreated,
        Self::ExerciseUpdated,
        Self::ExerciseDeleted,
        Self::RoutineTemplateCreated,
        Self::RoutineTemplateUpdated,
        Self::RoutineTemplateDeleted,
        Self::AdminStatsUpdated,
        Self::SystemAnnouncement,
    ];

    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotificationCreated => "NOTIFICATION_CREATED",
            Self::AssistanceRegistered => "ASSISTANCE_REGISTERED",
            Self::PresenceUpdated => "PRESENCE_UPDATED",
            Self::StreakUpdated => "STREAK_UPDATED",
            Self::StreakMilestone => "STREAK_MILESTONE",
            Self::UserTokensUpdated => "USER_TOKENS_UPDATED",
            Self::UserSubscriptionUpdated => "USER_SUBSCRIPTION_UPDATED",
            Self::UserProfileUpdated => "USER_PROFILE_UPDATED",
            Self::UserStatusUpdated => "USER_STATUS_UPDATED",
            Self::GymRequestCreated => "GYM_REQUEST_CREATED",
            Self::GymRequestApproved => "GYM_REQUEST_APPROVED",
            Self::GymRequestRejected => "GYM_REQUEST_REJECTED",
            Self::GymCreated => "GYM_CREATED",
            Self::GymUpdated => "GYM_UPDATED",
            Self::GymDeleted => "GYM_DELETED",
            Self::AchievementCreated => "ACHIEVEMENT_CREATED",
            Self::AchievementUpdated => "ACHIEVEMENT_UPDATED",
            Self::AchievementDeleted => "ACHIEVEMENT_DELETED",
            Self::RewardCreated => "REWARD_CREATED",
            Self::RewardUpdated => "REWARD_UPDATED",
            Self::RewardDeleted => "REWARD_DELETED",
            Self::ExerciseCreated => "EXERCISE_CREATED",
            Self::ExerciseUpdated => "EXERCISE_UPDATED",
            Self::ExerciseDeleted => "EXERCISE_DELETED",
            Self::RoutineTemplateCreated => "ROUTINE_TEMPLATE_CREATED",
            Self::RoutineTemplateUpdated => "ROUTINE_TEMPLATE_UPDATED",
            Self::RoutineTemplateDeleted => "ROUTINE_TEMPLATE_DELETED",
            Self::AdminStatsUpdated => "ADMIN_STATS_UPDATED",
            Self::SystemAnnouncement => "SYSTEM_ANNOUNCEMENT",
        }
    }

    /// For catalog-data kinds, returns the entity and the change action.
    #[must_use]
    pub const fn data_change(self) -> Option<(DataEntity, ChangeAction)> {
        use ChangeAction::{Created, Deleted, Updated};
        use DataEntity::{Achievements, Exercises, Gyms, Rewards, RoutineTemplates};
        let pair = match self {
            Self::GymCreated => (Gyms, Created),
            Self::GymUpdated => (Gyms, Updated),
            Self::GymDeleted => (Gyms, Deleted),
            Self::AchievementCreated => (Achievements, Created),
            Self::AchievementUpdated => (Achievements, Updated),
            Self::AchievementDeleted => (Achievements, Deleted),
            Self::RewardCreated => (Rewards, Created),
            Self::RewardUpdated => (Rewards, Updated),
            Self::RewardDeleted => (Rewards, Deleted),
            Self::ExerciseCreated => (Exercises, Created),
            Self::ExerciseUpdated => (Exercises, Updated),
            Self::ExerciseDeleted => (Exercises, Deleted),
            Self::RoutineTemplateCreated => (RoutineTemplates, Created),
            Self::RoutineTemplateUpdated => (RoutineTemplates, Updated),
            Self::RoutineTemplateDeleted => (RoutineTemplates, Deleted),
            _ => return None,
        };
        Some(pair)
    }

    /// Inverse of [`EventKind::data_change`].
    #[must_use]
    pub const fn for_data(entity: DataEntity, action: ChangeAction) -> Self {
        match (entity, action) {
            (DataEntity::Gyms, ChangeAction::Created) => Self::GymCreated,
            (DataEntity::Gyms, ChangeAction::Updated) => Self::GymUpdated,
            (DataEntity::Gyms, ChangeAction::Deleted) => Self::GymDeleted,
            (DataEntity::Achievements, ChangeAction::Created) => Self::AchievementCreated,
            (DataEntity::Achievements, ChangeAction::Updated) => Self::AchievementUpdated,
            (DataEntity::Achievements, ChangeAction::Deleted) => Self::AchievementDeleted,
            (DataEntity::Rewards, ChangeAction::Created) => Self::RewardCreated,
            (DataEntity::Rewards, ChangeAction::Updated) => Self::RewardUpdated,
            (DataEntity::Rewards, ChangeAction::Deleted) => Self::RewardDeleted,
            (DataEntity::Exercises, ChangeAction::Created) => Self::ExerciseCreated,
            (DataEntity::Exercises, ChangeAction::Updated) => Self::ExerciseUpdated,
            (DataEntity::Exercises, ChangeAction::Deleted) => Self::ExerciseDeleted,
            (DataEntity::RoutineTemplates, ChangeAction::Created) => Self::RoutineTemplateCreated,
            (DataEntity::RoutineTemplates, ChangeAction::Updated) => Self::RoutineTemplateUpdated,
            (DataEntity::RoutineTemplates, ChangeAction::Deleted) => Self::RoutineTemplateDeleted,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference-data collections whose changes are broadcast to every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataEntity {
    /// Gym catalog.
    Gyms,
    /// Achievement definitions.
    Achievements,
    /// Redeemable rewards.
    Rewards,
    /// Exercise library.
    Exercises,
    /// Routine templates.
    RoutineTemplates,
}

/// What happened to a reference-data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// Record inserted.
    Created,
    /// Record modified.
    Updated,
    /// Record removed.
    Deleted,
}

/// Announcement urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Informational.
    Low,
    /// Default urgency.
    Normal,
    /// Shown prominently by clients.
    High,
}

/// Payload of [`EventKind::NotificationCreated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCreated {
    /// Recipient user.
    pub user_id: u64,
    /// Notification record as stored by the producer.
    pub notification: Map<String, Value>,
}

/// Payload of [`EventKind::AssistanceRegistered`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistanceRegistered {
    /// User who checked in.
    pub user_id: u64,
    /// Gym checked into.
    pub gym_id: u64,
    /// Ledger id of the assistance, when the producer has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistance_id: Option<u64>,
    /// When the check-in happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Payload of [`EventKind::PresenceUpdated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdated {
    /// Gym whose head-count changed.
    pub gym_id: u64,
    /// People currently checked in.
    pub current_count: u64,
    /// When the count was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Payload of [`EventKind::StreakUpdated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakUpdated {
    /// Streak owner.
    pub user_id: u64,
    /// Current consecutive-day streak.
    pub current_streak: u32,
    /// Best streak ever reached.
    pub longest_streak: u32,
    /// When the streak was recomputed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Payload of [`EventKind::StreakMilestone`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakMilestone {
    /// Streak owner.
    pub user_id: u64,
    /// Milestone reached (in days).
    pub milestone: u32,
    /// Current streak.
    pub current_streak: u32,
    /// Congratulation text shown to the user.
    pub message: String,
}

/// Payload of [`EventKind::UserTokensUpdated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensUpdated {
    /// Balance owner.
    pub user_id: u64,
    /// Balance after the change.
    pub new_balance: i64,
    /// Balance before the change.
    pub previous_balance: i64,
    /// Signed difference.
    pub delta: i64,
    /// Why the balance changed (`checkin`, `reward_claim`, ...).
    pub reason: String,
    /// Originating ledger entry; operator-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_entry_id: Option<u64>,
    /// When the ledger entry was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Payload of [`EventKind::UserSubscriptionUpdated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionUpdated {
    /// Subscriber.
    pub user_id: u64,
    /// New plan name.
    pub new_subscription: String,
    /// Whether the plan is a premium one.
    pub is_premium: bool,
    /// Premium start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_since: Option<DateTime<Utc>>,
    /// Premium expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_expires: Option<DateTime<Utc>>,
}

/// Payload of [`EventKind::UserProfileUpdated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdated {
    /// Profile owner.
    pub user_id: u64,
    /// Updated profile fields.
    pub profile: Map<String, Value>,
}

/// Payload of [`EventKind::UserStatusUpdated`].
///
/// `is_active` keeps its snake-case wire name; admin consoles already
/// consume it that way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdated {
    /// Account whose status changed.
    #[serde(rename = "accountId")]
    pub account_id: u64,
    /// Whether the account may sign in.
    pub is_active: bool,
    /// Account email.
    pub email: String,
    /// Owning user, when the account belongs to one.
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

/// Payload shared by the three gym-request kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GymRequestChanged {
    /// Gym request id.
    pub request_id: u64,
    /// Full request record, when the producer includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Map<String, Value>>,
    /// Rejection reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Stage of a gym request, paired with [`GymRequestChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GymRequestStage {
    /// Request submitted.
    Created,
    /// Request accepted by an operator.
    Approved,
    /// Request refused by an operator.
    Rejected,
}

/// A change to a reference-data record.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChange {
    /// Collection the record belongs to.
    pub entity: DataEntity,
    /// Kind of change.
    pub action: ChangeAction,
    /// The record (must carry a numeric `id`).
    pub record: Map<String, Value>,
}

/// Payload of [`EventKind::AdminStatsUpdated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsUpdated {
    /// Aggregated dashboard figures.
    pub stats: Map<String, Value>,
}

/// Payload of [`EventKind::SystemAnnouncement`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    /// Announcement text.
    pub message: String,
    /// Urgency.
    pub priority: Priority,
}

/// A validated, strongly-typed domain event.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// See [`EventKind::NotificationCreated`].
    NotificationCreated(NotificationCreated),
    /// See [`EventKind::AssistanceRegistered`].
    AssistanceRegistered(AssistanceRegistered),
    /// See [`EventKind::PresenceUpdated`].
    PresenceUpdated(PresenceUpdated),
    /// See [`EventKind::StreakUpdated`].
    StreakUpdated(StreakUpdated),
    /// See [`EventKind::StreakMilestone`].
    StreakMilestone(StreakMilestone),
    /// See [`EventKind::UserTokensUpdated`].
    UserTokensUpdated(TokensUpdated),
    /// See [`EventKind::UserSubscriptionUpdated`].
    UserSubscriptionUpdated(SubscriptionUpdated),
    /// See [`EventKind::UserProfileUpdated`].
    UserProfileUpdated(ProfileUpdated),
    /// See [`EventKind::UserStatusUpdated`].
    UserStatusUpdated(StatusUpdated),
    /// Any of the `GYM_REQUEST_*` kinds.
    GymRequest(GymRequestStage, GymRequestChanged),
    /// Any of the reference-data `*_CREATED/UPDATED/DELETED` kinds.
    DataChanged(DataChange),
    /// See [`EventKind::AdminStatsUpdated`].
    AdminStatsUpdated(StatsUpdated),
    /// See [`EventKind::SystemAnnouncement`].
    SystemAnnouncement(Announcement),
}

impl DomainEvent {
    /// Returns the kind this event was (or will be) published under.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::NotificationCreated(_) => EventKind::NotificationCreated,
            Self::AssistanceRegistered(_) => EventKind::AssistanceRegistered,
            Self::PresenceUpdated(_) => EventKind::PresenceUpdated,
            Self::StreakUpdated(_) => EventKind::StreakUpdated,
            Self::StreakMilestone(_) => EventKind::StreakMilestone,
            Self::UserTokensUpdated(_) => EventKind::UserTokensUpdated,
            Self::UserSubscriptionUpdated(_) => EventKind::UserSubscriptionUpdated,
            Self::UserProfileUpdated(_) => EventKind::UserProfileUpdated,
            Self::UserStatusUpdated(_) => EventKind::UserStatusUpdated,
            Self::GymRequest(GymRequestStage::Created, _) => EventKind::GymRequestCreated,
            Self::GymRequest(GymRequestStage::Approved, _) => EventKind::GymRequestApproved,
            Self::GymRequest(GymRequestStage::Rejected, _) => EventKind::GymRequestRejected,
            Self::DataChanged(change) => EventKind::for_data(change.entity, change.action),
            Self::AdminStatsUpdated(_) => EventKind::AdminStatsUpdated,
            Self::SystemAnnouncement(_) => EventKind::SystemAnnouncement,
        }
    }

    /// Serializes the payload to the JSON shape producers use on the wire.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if a payload cannot be represented
    /// as JSON.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::NotificationCreated(p) => serde_json::to_value(p),
            Self::AssistanceRegistered(p) => serde_json::to_value(p),
            Self::PresenceUpdated(p) => serde_json::to_value(p),
            Self::StreakUpdated(p) => serde_json::to_value(p),
            Self::StreakMilestone(p) => serde_json::to_value(p),
            Self::UserTokensUpdated(p) => serde_json::to_value(p),
            Self::UserSubscriptionUpdated(p) => serde_json::to_value(p),
            Self::UserProfileUpdated(p) => serde_json::to_value(p),
            Self::UserStatusUpdated(p) => serde_json::to_value(p),
            Self::GymRequest(_, p) => serde_json::to_value(p),
            Self::DataChanged(change) => Ok(Value::Object(change.record.clone())),
            Self::AdminStatsUpdated(p) => serde_json::to_value(p),
            Self::SystemAnnouncement(p) => serde_json::to_value(p),
        }
    }

    /// Wraps the event for publication on the bus.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload cannot be serialized.
    pub fn into_envelope(self) -> Result<EventEnvelope, serde_json::Error> {
        let payload = self.payload()?;
        Ok(EventEnvelope::new(self.kind(), payload))
    }
}

/// Unit of transport on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Unique id, returned to ingest callers for correlation.
    pub event_id: uuid::Uuid,
    /// Declared kind.
    pub kind: EventKind,
    /// Unvalidated payload.
    pub payload: Value,
    /// When the producer published it.
    pub published_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Creates an envelope stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4(),
            kind,
            payload,
            published_at: Utc::now(),
        }
    }
}

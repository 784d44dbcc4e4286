//! Event schema registry: payload shape enforcement per [`EventKind`].
//!
//! Every envelope coming off the bus passes through
//! [`SchemaRegistry::validate`] before the dispatch bridge reads a single
//! field. Deserialization into the kind's payload struct enforces field
//! presence and JSON types; [`PayloadRules`] adds the semantic checks serde
//! cannot express.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::event::{
    Announcement, AssistanceRegistered, DataChange, DomainEvent, EventKind, GymRequestChanged,
    GymRequestStage, NotificationCreated, PresenceUpdated, ProfileUpdated, StatsUpdated,
    StatusUpdated, StreakMilestone, StreakUpdated, SubscriptionUpdated, TokensUpdated,
};
use crate::error::RealtimeError;

/// Semantic checks applied after a payload deserializes.
trait PayloadRules {
    /// Returns the reason the payload is unacceptable, if any.
    fn check(&self) -> Result<(), String>;
}

fn positive(field: &str, id: u64) -> Result<(), String> {
    if id == 0 {
        return Err(format!("{field} must be a positive id"));
    }
    Ok(())
}

fn non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    Ok(())
}

impl PayloadRules for NotificationCreated {
    fn check(&self) -> Result<(), String> {
        positive("userId", self.user_id)
    }
}

impl PayloadRules for AssistanceRegistered {
    fn check(&self) -> Result<(), String> {
        positive("userId", self.user_id)?;
        positive("gymId", self.gym_id)
    }
}

impl PayloadRules for PresenceUpdated {
    fn check(&self) -> Result<(), String> {
        positive("gymId", self.gym_id)
    }
}

impl PayloadRules for StreakUpdated {
    fn check(&self) -> Result<(), String> {
        positive("userId", self.user_id)?;
        if self.longest_streak < self.current_streak {
            return Err("longestStreak must be >= currentStreak".to_string());
        }
        Ok(())
    }
}

impl PayloadRules for StreakMilestone {
    fn check(&self) -> Result<(), String> {
        positive("userId", self.user_id)?;
        non_empty("message", &self.message)
    }
}

impl PayloadRules for TokensUpdated {
    fn check(&self) -> Result<(), String> {
        positive("userId", self.user_id)?;
        non_empty("reason", &self.reason)
    }
}

impl PayloadRules for SubscriptionUpdated {
    fn check(&self) -> Result<(), String> {
        positive("userId", self.user_id)?;
        non_empty("newSubscription", &self.new_subscription)
    }
}

impl PayloadRules for ProfileUpdated {
    fn check(&self) -> Result<(), String> {
        positive("userId", self.user_id)
    }
}

impl PayloadRules for StatusUpdated {
    fn check(&self) -> Result<(), String> {
        positive("accountId", self.account_id)?;
        if let Some(user_id) = self.user_id {
            positive("userId", user_id)?;
        }
        non_empty("email", &self.email)
    }
}

impl PayloadRules for GymRequestChanged {
    fn check(&self) -> Result<(), String> {
        positive("requestId", self.request_id)
    }
}

impl PayloadRules for StatsUpdated {
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

impl PayloadRules for Announcement {
    fn check(&self) -> Result<(), String> {
        non_empty("message", &self.message)
    }
}

/// Stateless registry mapping each [`EventKind`] to its payload schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaRegistry;

impl SchemaRegistry {
    /// Validates `payload` against the schema of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidPayload`] when the payload is not a
    /// JSON object, a required field is missing or has the wrong type, or a
    /// semantic rule fails.
    pub fn validate(kind: EventKind, payload: &Value) -> Result<DomainEvent, RealtimeError> {
        let event = match kind {
            EventKind::NotificationCreated => {
                DomainEvent::NotificationCreated(parse(kind, payload)?)
            }
            EventKind::AssistanceRegistered => {
                DomainEvent::AssistanceRegistered(parse(kind, payload)?)
            }
            EventKind::PresenceUpdated => DomainEvent::PresenceUpdated(parse(kind, payload)?),
            EventKind::StreakUpdated => DomainEvent::StreakUpdated(parse(kind, payload)?),
            EventKind::StreakMilestone => DomainEvent::StreakMilestone(parse(kind, payload)?),
            EventKind::UserTokensUpdated => DomainEvent::UserTokensUpdated(parse(kind, payload)?),
            EventKind::UserSubscriptionUpdated => {
                DomainEvent::UserSubscriptionUpdated(parse(kind, payload)?)
            }
            EventKind::UserProfileUpdated => DomainEvent::UserProfileUpdated(parse(kind, payload)?),
            EventKind::UserStatusUpdated => DomainEvent::UserStatusUpdated(parse(kind, payload)?),
            EventKind::GymRequestCreated => {
                DomainEvent::GymRequest(GymRequestStage::Created, parse(kind, payload)?)
            }
            EventKind::GymRequestApproved => {
                DomainEvent::GymRequest(GymRequestStage::Approved, parse(kind, payload)?)
            }
            EventKind::GymRequestRejected => {
                DomainEvent::GymRequest(GymRequestStage::Rejected, parse(kind, payload)?)
            }
            EventKind::GymCreated
            | EventKind::GymUpdated
            | EventKind::GymDeleted
            | EventKind::AchievementCreated
            | EventKind::AchievementUpdated
            | EventKind::AchievementDeleted
            | EventKind::RewardCreated
            | EventKind::RewardUpdated
            | EventKind::RewardDeleted
            | EventKind::ExerciseCreated
            | EventKind::ExerciseUpdated
            | EventKind::ExerciseDeleted
            | EventKind::RoutineTemplateCreated
            | EventKind::RoutineTemplateUpdated
            | EventKind::RoutineTemplateDeleted => DomainEvent::DataChanged(parse_data(kind, payload)?),
            EventKind::AdminStatsUpdated => DomainEvent::AdminStatsUpdated(parse(kind, payload)?),
            EventKind::SystemAnnouncement => DomainEvent::SystemAnnouncement(parse(kind, payload)?),
        };
        Ok(event)
    }

    /// Lists the required payload fields of `kind`, for the catalog.
    #[must_use]
    pub const fn required_fields(kind: EventKind) -> &'static [&'static str] {
        match kind {
            EventKind::NotificationCreated => &["userId", "notification"],
            EventKind::AssistanceRegistered => &["userId", "gymId"],
            EventKind::PresenceUpdated => &["gymId", "currentCount"],
            EventKind::StreakUpdated => &["userId", "currentStreak", "longestStreak"],
            EventKind::StreakMilestone => &["userId", "milestone", "currentStreak", "message"],
            EventKind::UserTokensUpdated => {
                &["userId", "newBalance", "previousBalance", "delta", "reason"]
            }
            EventKind::UserSubscriptionUpdated => &["userId", "newSubscription", "isPremium"],
            EventKind::UserProfileUpdated => &["userId", "profile"],
            EventKind::UserStatusUpdated => &["accountId", "is_active", "email"],
            EventKind::GymRequestCreated
            | EventKind::GymRequestApproved
            | EventKind::GymRequestRejected => &["requestId"],
            EventKind::GymCreated
            | EventKind::GymUpdated
            | EventKind::GymDeleted
            | EventKind::AchievementCreated
            | EventKind::AchievementUpdated
            | EventKind::AchievementDeleted
            | EventKind::RewardCreated
            | EventKind::RewardUpdated
            | EventKind::RewardDeleted
            | EventKind::ExerciseCreated
            | EventKind::ExerciseUpdated
            | EventKind::ExerciseDeleted
            | EventKind::RoutineTemplateCreated
            | EventKind::RoutineTemplateUpdated
            | EventKind::RoutineTemplateDeleted => &["id"],
            EventKind::AdminStatsUpdated => &["stats"],
            EventKind::SystemAnnouncement => &["message", "priority"],
        }
    }
}

fn as_object(kind: EventKind, payload: &Value) -> Result<&Map<String, Value>, RealtimeError> {
    payload
        .as_object()
        .ok_or_else(|| RealtimeError::invalid_payload(kind, "payload must be a JSON object"))
}

fn parse<T>(kind: EventKind, payload: &Value) -> Result<T, RealtimeError>
where
    T: DeserializeOwned + PayloadRules,
{
    as_object(kind, payload)?;
    let parsed = T::deserialize(payload)
        .map_err(|e| RealtimeError::invalid_payload(kind, e.to_string()))?;
    parsed
        .check()
        .map_err(|reason| RealtimeError::invalid_payload(kind, reason))?;
    Ok(parsed)
}

/// Reference-data payloads are the record itself; only `id` is mandated.
fn parse_data(kind: EventKind, payload: &Value) -> Result<DataChange, RealtimeError> {
    let Some((entity, action)) = kind.data_change() else {
        return Err(RealtimeError::invalid_payload(
            kind,
            "kind does not describe a reference-data change",
        ));
    };
    let record = as_object(kind, payload)?;
    match record.get("id").and_then(Value::as_u64) {
        Some(id) if id > 0 => {}
        Some(_) => return Err(RealtimeError::invalid_payload(kind, "id must be a positive id")),
        None => {
            return Err(RealtimeError::invalid_payload(
                kind,
                "missing numeric field `id`",
            ));
        }
    }
    Ok(DataChange {
        entity,
        action,
        record: record.clone(),
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::event::{ChangeAction, DataEntity, Priority};

    fn reason_of(result: Result<DomainEvent, RealtimeError>) -> String {
        match result {
            Err(RealtimeError::InvalidPayload { reason, .. }) => reason,
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
    }

    #[test]
    fn valid_tokens_payload_parses() {
        let payload = json!({
            "userId": 7, "newBalance": 150, "previousBalance": 100,
            "delta": 50, "reason": "checkin"
        });
        let Ok(DomainEvent::UserTokensUpdated(tokens)) =
            SchemaRegistry::validate(EventKind::UserTokensUpdated, &payload)
        else {
            panic!("tokens payload should validate");
        };
        assert_eq!(tokens.user_id, 7);
        assert_eq!(tokens.new_balance, 150);
        assert_eq!(tokens.delta, 50);
    }

    #[test]
    fn string_gym_id_is_rejected() {
        let payload = json!({"gymId": "not-a-number", "currentCount": 3});
        let reason = reason_of(SchemaRegistry::validate(EventKind::PresenceUpdated, &payload));
        assert!(reason.contains("invalid type"), "{reason}");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let payload = json!({"gymId": 4});
        let reason = reason_of(SchemaRegistry::validate(EventKind::PresenceUpdated, &payload));
        assert!(reason.contains("currentCount"), "{reason}");
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let reason = reason_of(SchemaRegistry::validate(
            EventKind::SystemAnnouncement,
            &json!(["hello"]),
        ));
        assert_eq!(reason, "payload must be a JSON object");
    }

    #[test]
    fn zero_id_is_rejected() {
        let payload = json!({"userId": 0, "profile": {}});
        let reason = reason_of(SchemaRegistry::validate(EventKind::UserProfileUpdated, &payload));
        assert!(reason.contains("userId"));
    }

    #[test]
    fn object_fields_must_be_objects() {
        let payload = json!({"userId": 3, "notification": "ping"});
        assert!(SchemaRegistry::validate(EventKind::NotificationCreated, &payload).is_err());
    }

    #[test]
    fn streak_longest_below_current_is_rejected() {
        let payload = json!({"userId": 3, "currentStreak": 10, "longestStreak": 4});
        let reason = reason_of(SchemaRegistry::validate(EventKind::StreakUpdated, &payload));
        assert!(reason.contains("longestStreak"));
    }

    #[test]
    fn data_kinds_require_numeric_id() {
        let ok = SchemaRegistry::validate(EventKind::GymCreated, &json!({"id": 12, "name": "Iron"}));
        let Ok(DomainEvent::DataChanged(change)) = ok else {
            panic!("gym record should validate");
        };
        assert_eq!(change.entity, DataEntity::Gyms);
        assert_eq!(change.action, ChangeAction::Created);
        assert_eq!(change.record.get("name"), Some(&json!("Iron")));

        let missing = SchemaRegistry::validate(EventKind::RewardDeleted, &json!({"name": "x"}));
        assert!(reason_of(missing).contains("`id`"));
    }

    #[test]
    fn status_keeps_snake_case_is_active() {
        let payload = json!({"accountId": 5, "is_active": false, "email": "a@b.c"});
        let Ok(DomainEvent::UserStatusUpdated(status)) =
            SchemaRegistry::validate(EventKind::UserStatusUpdated, &payload)
        else {
            panic!("status payload should validate");
        };
        assert!(!status.is_active);
        assert_eq!(status.user_id, None);
    }

    #[test]
    fn announcement_priority_is_closed() {
        let ok = json!({"message": "Maintenance at 2am", "priority": "high"});
        let Ok(DomainEvent::SystemAnnouncement(a)) =
            SchemaRegistry::validate(EventKind::SystemAnnouncement, &ok)
        else {
            panic!("announcement should validate");
        };
        assert_eq!(a.priority, Priority::High);

        let bad = json!({"message": "hi", "priority": "critical"});
        assert!(SchemaRegistry::validate(EventKind::SystemAnnouncement, &bad).is_err());
    }

    #[test]
    fn typed_events_validate_after_round_trip() {
        let event = DomainEvent::StreakMilestone(StreakMilestone {
            user_id: 9,
            milestone: 30,
            current_streak: 30,
            message: "30 days in a row!".to_string(),
        });
        let Ok(envelope) = event.clone().into_envelope() else {
            panic!("milestone serializes");
        };
        let validated = SchemaRegistry::validate(envelope.kind, &envelope.payload);
        assert!(matches!(validated, Ok(ref e) if *e == event));
    }

    #[test]
    fn every_kind_lists_required_fields() {
        for kind in EventKind::ALL {
            assert!(!SchemaRegistry::required_fields(kind).is_empty(), "{kind}");
        }
    }
}

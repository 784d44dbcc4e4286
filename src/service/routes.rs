//! Static routing table: validated event → outbound messages.
//!
//! [`route`] is one exhaustive `match` over [`DomainEvent`]. Adding a
//! variant without a route does not compile. [`EVENT_CATALOG`] is the
//! same table in descriptive form, served by `GET /api/v1/events/catalog`.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use crate::domain::event::{DataEntity, GymRequestStage};
use crate::domain::{
    AdminTopic, Audience, DomainEvent, EventKind, MessageName, OutboundMessage, RoomRouter,
    SchemaRegistry,
};

fn message(name: MessageName, audiences: &[Audience], payload: Value) -> OutboundMessage {
    OutboundMessage {
        name,
        payload,
        destination: RoomRouter::resolve_all(audiences),
    }
}

fn stamp(timestamp: Option<DateTime<Utc>>) -> DateTime<Utc> {
    timestamp.unwrap_or_else(Utc::now)
}

/// Builds the outbound messages for a validated event.
///
/// Most kinds produce one message. Token and subscription changes also
/// produce an operator copy for `admin:user-management` carrying fields
/// the owner never sees.
#[must_use]
pub fn route(event: &DomainEvent) -> Vec<OutboundMessage> {
    let now = Utc::now();
    match event {
        DomainEvent::NotificationCreated(p) => vec![message(
            MessageName::NotificationNew,
            &[Audience::User(p.user_id)],
            json!({ "notification": p.notification, "timestamp": now }),
        )],
        DomainEvent::AssistanceRegistered(p) => {
            let mut payload = json!({
                "userId": p.user_id,
                "gymId": p.gym_id,
                "timestamp": stamp(p.timestamp),
            });
            if let (Some(fields), Some(assistance_id)) = (payload.as_object_mut(), p.assistance_id) {
                fields.insert("assistanceId".to_string(), json!(assistance_id));
            }
            vec![message(
                MessageName::AssistanceRegistered,
                &[Audience::User(p.user_id), Audience::Gym(p.gym_id)],
                payload,
            )]
        }
        DomainEvent::PresenceUpdated(p) => vec![message(
            MessageName::PresenceUpdated,
            &[Audience::Gym(p.gym_id)],
            json!({
                "gymId": p.gym_id,
                "currentCount": p.current_count,
                "timestamp": stamp(p.timestamp),
            }),
        )],
        DomainEvent::StreakUpdated(p) => vec![message(
            MessageName::StreakUpdated,
            &[Audience::User(p.user_id)],
            json!({
                "currentStreak": p.current_streak,
                "longestStreak": p.longest_streak,
                "timestamp": stamp(p.timestamp),
            }),
        )],
        DomainEvent::StreakMilestone(p) => vec![message(
            MessageName::StreakMilestone,
            &[Audience::User(p.user_id)],
            json!({
                "milestone": p.milestone,
                "currentStreak": p.current_streak,
                "message": p.message,
                "timestamp": now,
            }),
        )],
        DomainEvent::UserTokensUpdated(p) => {
            let timestamp = stamp(p.timestamp);
            let owner = json!({
                "newBalance": p.new_balance,
                "previousBalance": p.previous_balance,
                "delta": p.delta,
                "reason": p.reason,
                "timestamp": timestamp,
            });
            let mut operator = owner.clone();
            if let Some(fields) = operator.as_object_mut() {
                fields.insert("userId".to_string(), json!(p.user_id));
                if let Some(entry) = p.ledger_entry_id {
                    fields.insert("ledgerEntryId".to_string(), json!(entry));
                }
            }
            vec![
                message(
                    MessageName::UserTokensUpdated,
                    &[Audience::User(p.user_id), Audience::UserTokens(p.user_id)],
                    owner,
                ),
                message(
                    MessageName::UserTokensUpdated,
                    &[Audience::AdminTopic(AdminTopic::UserManagement)],
                    operator,
                ),
            ]
        }
        DomainEvent::UserSubscriptionUpdated(p) => {
            let owner = json!({
                "newSubscription": p.new_subscription,
                "isPremium": p.is_premium,
                "premiumSince": p.premium_since,
                "premiumExpires": p.premium_expires,
                "timestamp": now,
            });
            let mut operator = owner.clone();
            if let Some(fields) = operator.as_object_mut() {
                fields.insert("userId".to_string(), json!(p.user_id));
            }
            vec![
                message(
                    MessageName::UserSubscriptionUpdated,
                    &[Audience::User(p.user_id)],
                    owner,
                ),
                message(
                    MessageName::UserSubscriptionUpdated,
                    &[Audience::AdminTopic(AdminTopic::UserManagement)],
                    operator,
                ),
            ]
        }
        DomainEvent::UserProfileUpdated(p) => vec![message(
            MessageName::UserProfileUpdated,
            &[Audience::User(p.user_id)],
            json!({ "profile": p.profile, "timestamp": now }),
        )],
        DomainEvent::UserStatusUpdated(p) => {
            let mut audiences = vec![Audience::AdminTopic(AdminTopic::UserManagement)];
            audiences.extend(p.user_id.map(Audience::User));
            vec![message(
                MessageName::UserStatusUpdated,
                &audiences,
                json!({
                    "accountId": p.account_id,
                    "is_active": p.is_active,
                    "email": p.email,
                    "timestamp": now,
                }),
            )]
        }
        DomainEvent::GymRequest(stage, p) => {
            let name = match stage {
                GymRequestStage::Created => MessageName::GymRequestCreated,
                GymRequestStage::Approved => MessageName::GymRequestApproved,
                GymRequestStage::Rejected => MessageName::GymRequestRejected,
            };
            let mut payload = json!({ "requestId": p.request_id, "timestamp": now });
            if let Some(fields) = payload.as_object_mut() {
                if let Some(request) = &p.request {
                    fields.insert("request".to_string(), Value::Object(request.clone()));
                }
                if let Some(reason) = &p.reason {
                    fields.insert("reason".to_string(), json!(reason));
                }
            }
            vec![message(
                name,
                &[Audience::AdminTopic(AdminTopic::GymRequests)],
                payload,
            )]
        }
        DomainEvent::DataChanged(change) => vec![message(
            data_message(change.entity),
            &[Audience::Broadcast],
            json!({ "action": change.action, "data": change.record, "timestamp": now }),
        )],
        DomainEvent::AdminStatsUpdated(p) => vec![message(
            MessageName::StatsUpdated,
            &[Audience::AdminTopic(AdminTopic::Stats)],
            json!({ "stats": p.stats, "timestamp": now }),
        )],
        DomainEvent::SystemAnnouncement(p) => vec![message(
            MessageName::SystemAnnouncement,
            &[Audience::Broadcast],
            json!({ "message": p.message, "priority": p.priority, "timestamp": now }),
        )],
    }
}

const fn data_message(entity: DataEntity) -> MessageName {
    match entity {
        DataEntity::Gyms => MessageName::DataGymsUpdated,
        DataEntity::Achievements => MessageName::DataAchievementsUpdated,
        DataEntity::Rewards => MessageName::DataRewardsUpdated,
        DataEntity::Exercises => MessageName::DataExercisesUpdated,
        DataEntity::RoutineTemplates => MessageName::DataRoutineTemplatesUpdated,
    }
}

/// Outbound message name for `kind`.
#[must_use]
pub const fn message_name(kind: EventKind) -> MessageName {
    if let Some((entity, _)) = kind.data_change() {
        return data_message(entity);
    }
    match kind {
        EventKind::NotificationCreated => MessageName::NotificationNew,
        EventKind::AssistanceRegistered => MessageName::AssistanceRegistered,
        EventKind::PresenceUpdated => MessageName::PresenceUpdated,
        EventKind::StreakUpdated => MessageName::StreakUpdated,
        EventKind::StreakMilestone => MessageName::StreakMilestone,
        EventKind::UserTokensUpdated => MessageName::UserTokensUpdated,
        EventKind::UserSubscriptionUpdated => MessageName::UserSubscriptionUpdated,
        EventKind::UserProfileUpdated => MessageName::UserProfileUpdated,
        EventKind::UserStatusUpdated => MessageName::UserStatusUpdated,
        EventKind::GymRequestCreated => MessageName::GymRequestCreated,
        EventKind::GymRequestApproved => MessageName::GymRequestApproved,
        EventKind::GymRequestRejected => MessageName::GymRequestRejected,
        EventKind::AdminStatsUpdated => MessageName::StatsUpdated,
        _ => MessageName::SystemAnnouncement,
    }
}

/// Room patterns an event of `kind` is delivered to.
#[must_use]
pub const fn room_patterns(kind: EventKind) -> &'static [&'static str] {
    if kind.data_change().is_some() {
        return &["*"];
    }
    match kind {
        EventKind::NotificationCreated
        | EventKind::StreakUpdated
        | EventKind::StreakMilestone
        | EventKind::UserProfileUpdated => &["user:<userId>"],
        EventKind::AssistanceRegistered => &["user:<userId>", "gym:<gymId>"],
        EventKind::PresenceUpdated => &["gym:<gymId>"],
        EventKind::UserTokensUpdated => &[
            "user:<userId>",
            "user:<userId>:tokens",
            "admin:user-management",
        ],
        EventKind::UserSubscriptionUpdated => &["user:<userId>", "admin:user-management"],
        EventKind::UserStatusUpdated => &["admin:user-management", "user:<userId>"],
        EventKind::GymRequestCreated
        | EventKind::GymRequestApproved
        | EventKind::GymRequestRejected => &["admin:gym-requests"],
        EventKind::AdminStatsUpdated => &["admin:stats"],
        _ => &["*"],
    }
}

/// One row of the event catalog.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Event kind accepted on the bus.
    pub kind: EventKind,
    /// Outbound message name clients receive.
    #[schema(example = "user:tokens:updated")]
    pub message: String,
    /// Room patterns (`*` = every connection).
    pub rooms: Vec<String>,
    /// Payload fields the schema requires.
    pub required_fields: Vec<String>,
}

/// Every kind, its outbound name, rooms and required fields.
pub static EVENT_CATALOG: LazyLock<Vec<CatalogEntry>> = LazyLock::new(|| {
    EventKind::ALL
        .iter()
        .map(|&kind| CatalogEntry {
            kind,
            message: message_name(kind).as_str().to_string(),
            rooms: room_patterns(kind).iter().map(|r| (*r).to_string()).collect(),
            required_fields: SchemaRegistry::required_fields(kind)
                .iter()
                .map(|f| (*f).to_string())
                .collect(),
        })
        .collect()
});

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Destination;

    fn validated(kind: EventKind, payload: Value) -> DomainEvent {
        match SchemaRegistry::validate(kind, &payload) {
            Ok(event) => event,
            Err(e) => panic!("{kind} payload should validate: {e}"),
        }
    }

    fn room_keys(msg: &OutboundMessage) -> Vec<String> {
        match &msg.destination {
            Destination::Rooms(rooms) => rooms.iter().map(ToString::to_string).collect(),
            Destination::Everyone => vec!["*".to_string()],
        }
    }

    #[test]
    fn tokens_fan_out_with_operator_fields() {
        let event = validated(
            EventKind::UserTokensUpdated,
            json!({"userId": 42, "newBalance": 120, "previousBalance": 100,
                   "delta": 20, "reason": "checkin", "ledgerEntryId": 9}),
        );
        let messages = route(&event);
        let [owner, operator] = messages.as_slice() else {
            panic!("expected two messages, got {}", messages.len());
        };

        assert_eq!(room_keys(owner), vec!["user:42", "user:42:tokens"]);
        assert_eq!(owner.payload["newBalance"], 120);
        assert!(owner.payload.get("ledgerEntryId").is_none());
        assert!(owner.payload.get("userId").is_none());

        assert_eq!(room_keys(operator), vec!["admin:user-management"]);
        assert_eq!(operator.payload["userId"], 42);
        assert_eq!(operator.payload["ledgerEntryId"], 9);
        assert_eq!(operator.payload["timestamp"], owner.payload["timestamp"]);
    }

    #[test]
    fn absent_optional_ids_are_omitted() {
        let tokens = validated(
            EventKind::UserTokensUpdated,
            json!({"userId": 3, "newBalance": 5, "previousBalance": 10,
                   "delta": -5, "reason": "redeem"}),
        );
        let messages = route(&tokens);
        let [_, operator] = messages.as_slice() else {
            panic!("expected two messages");
        };
        assert_eq!(operator.payload["userId"], 3);
        assert!(operator.payload.get("ledgerEntryId").is_none());

        let assistance = validated(
            EventKind::AssistanceRegistered,
            json!({"userId": 3, "gymId": 6}),
        );
        let messages = route(&assistance);
        let [msg] = messages.as_slice() else {
            panic!("expected one message");
        };
        assert!(msg.payload.get("assistanceId").is_none());

        let assistance = validated(
            EventKind::AssistanceRegistered,
            json!({"userId": 3, "gymId": 6, "assistanceId": 17}),
        );
        let messages = route(&assistance);
        let [msg] = messages.as_slice() else {
            panic!("expected one message");
        };
        assert_eq!(msg.payload["assistanceId"], 17);
    }

    #[test]
    fn data_change_broadcasts_with_action() {
        let event = validated(EventKind::GymCreated, json!({"id": 5, "name": "Iron Temple"}));
        let messages = route(&event);
        let [msg] = messages.as_slice() else {
            panic!("expected one message");
        };
        assert_eq!(msg.name, MessageName::DataGymsUpdated);
        assert_eq!(msg.destination, Destination::Everyone);
        assert_eq!(msg.payload["action"], "created");
        assert_eq!(msg.payload["data"]["name"], "Iron Temple");
    }

    #[test]
    fn status_reaches_owner_only_when_known() {
        let anonymous = validated(
            EventKind::UserStatusUpdated,
            json!({"accountId": 3, "is_active": false, "email": "x@y.z"}),
        );
        let messages = route(&anonymous);
        let [msg] = messages.as_slice() else {
            panic!("expected one message");
        };
        assert_eq!(room_keys(msg), vec!["admin:user-management"]);

        let owned = validated(
            EventKind::UserStatusUpdated,
            json!({"accountId": 3, "is_active": true, "email": "x@y.z", "userId": 8}),
        );
        let messages = route(&owned);
        let [msg] = messages.as_slice() else {
            panic!("expected one message");
        };
        assert_eq!(room_keys(msg), vec!["admin:user-management", "user:8"]);
        assert_eq!(msg.payload["is_active"], true);
    }

    #[test]
    fn producer_timestamp_is_kept() {
        let event = validated(
            EventKind::PresenceUpdated,
            json!({"gymId": 2, "currentCount": 11, "timestamp": "2026-03-01T10:00:00Z"}),
        );
        let messages = route(&event);
        let [msg] = messages.as_slice() else {
            panic!("expected one message");
        };
        assert_eq!(msg.payload["timestamp"], "2026-03-01T10:00:00Z");
    }

    #[test]
    fn rejected_gym_request_carries_reason() {
        let event = validated(
            EventKind::GymRequestRejected,
            json!({"requestId": 4, "reason": "duplicate"}),
        );
        let messages = route(&event);
        let [msg] = messages.as_slice() else {
            panic!("expected one message");
        };
        assert_eq!(msg.name, MessageName::GymRequestRejected);
        assert_eq!(room_keys(msg), vec!["admin:gym-requests"]);
        assert_eq!(msg.payload["reason"], "duplicate");
        assert!(msg.payload.get("request").is_none());
    }

    #[test]
    fn catalog_covers_every_kind_consistently() {
        assert_eq!(EVENT_CATALOG.len(), EventKind::ALL.len());
        for entry in EVENT_CATALOG.iter() {
            assert!(!entry.rooms.is_empty(), "{} has no rooms", entry.kind);
            assert!(!entry.required_fields.is_empty(), "{} has no fields", entry.kind);
        }
        let Some(tokens) = EVENT_CATALOG
            .iter()
            .find(|e| e.kind == EventKind::UserTokensUpdated)
        else {
            panic!("tokens entry missing");
        };
        assert_eq!(tokens.message, "user:tokens:updated");
        assert_eq!(tokens.rooms.len(), 3);
    }

    #[test]
    fn catalog_names_match_routed_names() {
        let samples = [
            (EventKind::NotificationCreated, json!({"userId": 1, "notification": {"id": 1}})),
            (EventKind::StreakMilestone, json!({"userId": 1, "milestone": 7, "currentStreak": 7, "message": "7 days"})),
            (EventKind::AdminStatsUpdated, json!({"stats": {"users": 10}})),
            (EventKind::SystemAnnouncement, json!({"message": "maintenance", "priority": "high"})),
            (EventKind::RoutineTemplateDeleted, json!({"id": 3})),
        ];
        for (kind, payload) in samples {
            for msg in route(&validated(kind, payload)) {
                assert_eq!(msg.name, message_name(kind), "{kind}");
            }
        }
    }
}

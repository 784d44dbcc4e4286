//! DTOs for the event ingest and introspection endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::domain::EventKind;
use crate::service::DispatchSnapshot;

/// Request body for `POST /api/v1/events`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PublishEventRequest {
    /// Event kind, e.g. `USER_TOKENS_UPDATED`.
    pub kind: EventKind,
    /// Kind-specific payload; validated before delivery.
    #[schema(value_type = Object)]
    pub payload: Value,
}

/// Response for an accepted event.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishEventResponse {
    /// Always `true`; the event was queued on the bus.
    pub accepted: bool,
    /// Id assigned to the envelope, as it appears in logs.
    pub event_id: uuid::Uuid,
}

/// Live gateway counters returned by `GET /api/v1/stats`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Open WebSocket connections.
    pub connections: usize,
    /// Rooms with at least one member.
    pub rooms: usize,
    /// Delivery tasks attached to the event bus.
    pub bus_receivers: usize,
    /// Dispatch bridge counters.
    pub dispatch: DispatchSnapshot,
}

//! Event ingest and introspection handlers.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{PublishEventRequest, PublishEventResponse, StatsResponse};
use crate::app_state::AppState;
use crate::domain::EventEnvelope;
use crate::error::{ErrorResponse, RealtimeError};
use crate::service::{CatalogEntry, EVENT_CATALOG};

/// Header carrying the shared ingest key.
pub const INTERNAL_KEY_HEADER: &str = "x-internal-key";

/// `POST /events` — Publish a domain event from an out-of-process producer.
///
/// The payload is validated asynchronously by the dispatch bridge; a 202
/// only means the event was queued.
///
/// # Errors
///
/// Returns [`RealtimeError::Unauthenticated`] when an ingest key is
/// configured and the request does not present it.
#[utoipa::path(
    post,
    path = "/api/v1/events",
    tag = "Events",
    summary = "Publish a domain event",
    description = "Queues an event on the internal bus. Invalid payloads are dropped by the dispatch bridge and never reach clients.",
    request_body = PublishEventRequest,
    responses(
        (status = 202, description = "Event queued", body = PublishEventResponse),
        (status = 401, description = "Missing or wrong internal key", body = ErrorResponse),
    )
)]
pub async fn publish_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PublishEventRequest>,
) -> Result<impl IntoResponse, RealtimeError> {
    if let Some(expected) = state.settings.internal_api_key.as_deref() {
        let presented = headers
            .get(INTERNAL_KEY_HEADER)
            .and_then(|value| value.to_str().ok());
        if presented != Some(expected) {
            return Err(RealtimeError::Unauthenticated(
                "internal key required".to_string(),
            ));
        }
    }

    let envelope = EventEnvelope::new(req.kind, req.payload);
    let event_id = envelope.event_id;
    let receivers = state.event_bus.publish_envelope(envelope);
    tracing::debug!(kind = %req.kind, %event_id, receivers, "event ingested");

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishEventResponse {
            accepted: true,
            event_id,
        }),
    ))
}

/// `GET /events/catalog` — Every event kind with its outbound message,
/// target rooms and required payload fields.
#[utoipa::path(
    get,
    path = "/api/v1/events/catalog",
    tag = "Events",
    summary = "Event catalog",
    responses(
        (status = 200, description = "Event catalog", body = Vec<CatalogEntry>),
    )
)]
pub async fn event_catalog() -> impl IntoResponse {
    Json(EVENT_CATALOG.as_slice())
}

/// `GET /stats` — Connection, room and dispatch counters.
#[utoipa::path(
    get,
    path = "/api/v1/stats",
    tag = "Events",
    summary = "Gateway statistics",
    responses(
        (status = 200, description = "Live counters", body = StatsResponse),
    )
)]
pub async fn gateway_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatsResponse {
        connections: state.hub.connection_count().await,
        rooms: state.hub.room_count().await,
        bus_receivers: state.event_bus.receiver_count(),
        dispatch: state.bridge.stats(),
    })
}

/// Event routes, mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(publish_event))
        .route("/events/catalog", get(event_catalog))
        .route("/stats", get(gateway_stats))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::build_app;
    use crate::config::RealtimeConfig;

    use super::*;

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let Ok(response) = build_app(state).oneshot(request).await else {
            panic!("router is infallible");
        };
        let status = response.status();
        let Ok(bytes) = to_bytes(response.into_body(), 1 << 20).await else {
            panic!("body should be readable");
        };
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn publish(body: &Value, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/api/v1/events").header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header(INTERNAL_KEY_HEADER, key);
        }
        let Ok(request) = builder.body(Body::from(body.to_string())) else {
            panic!("request should build");
        };
        request
    }

    #[tokio::test]
    async fn publish_is_accepted() {
        let state = AppState::from_config(RealtimeConfig::with_secret("s"));
        let (status, body) = send(
            state,
            publish(&json!({"kind": "GYM_CREATED", "payload": {"id": 1}}), None),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["accepted"], true);
        assert!(body["eventId"].is_string());
    }

    #[tokio::test]
    async fn publish_requires_configured_key() {
        let mut config = RealtimeConfig::with_secret("s");
        config.internal_api_key = Some("k3y".to_string());
        let state = AppState::from_config(config);
        let event = json!({"kind": "SYSTEM_ANNOUNCEMENT", "payload": {"message": "hi", "priority": "low"}});

        let (status, body) = send(state.clone(), publish(&event, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], 1001);

        let (status, _) = send(state.clone(), publish(&event, Some("wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(state, publish(&event, Some("k3y"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let state = AppState::from_config(RealtimeConfig::with_secret("s"));
        let (status, _) = send(
            state,
            publish(&json!({"kind": "POOL_CREATED", "payload": {}}), None),
        )
        .await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn catalog_lists_every_kind() {
        let state = AppState::from_config(RealtimeConfig::with_secret("s"));
        let Ok(request) = Request::get("/api/v1/events/catalog").body(Body::empty()) else {
            panic!("request should build");
        };
        let (status, body) = send(state, request).await;
        assert_eq!(status, StatusCode::OK);
        let Some(entries) = body.as_array() else {
            panic!("catalog is an array");
        };
        assert_eq!(entries.len(), crate::domain::EventKind::ALL.len());
    }

    #[tokio::test]
    async fn stats_start_at_zero() {
        let state = AppState::from_config(RealtimeConfig::with_secret("s"));
        let Ok(request) = Request::get("/api/v1/stats").body(Body::empty()) else {
            panic!("request should build");
        };
        let (status, body) = send(state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connections"], 0);
        assert_eq!(body["dispatch"]["droppedInvalid"], 0);
    }
}

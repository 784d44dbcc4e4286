//! # pulse-gateway
//!
//! Real-time event distribution for the gym app: turns business events
//! (check-ins, token balance changes, gym requests, catalog edits) into
//! authenticated, room-scoped WebSocket pushes.
//!
//! ## Architecture
//!
//! ```text
//! Producers (in-process, POST /api/v1/events)
//!     │
//!     ├── EventBus (domain/)          fire-and-forget broadcast
//!     │
//!     ├── DispatchBridge (service/)   validate → route → deliver
//!     │     ├── SchemaRegistry (domain/)
//!     │     └── RoomRouter (domain/)
//!     │
//!     ├── ConnectionHub (ws/)         rooms + per-connection queues
//!     │
//!     └── Clients (GET /ws)           Authenticator → SessionBinder
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the full HTTP router: REST API, `/ws` and (with the
/// `swagger-ui` feature) the API docs.
///
/// The request timeout only wraps REST routes; upgraded sockets live as
/// long as the client stays connected.
pub fn build_app(state: AppState) -> Router {
    let rest = api::build_router().layer(rest_timeout(state.settings.request_timeout()));

    let app = Router::new()
        .merge(rest)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    #[cfg(feature = "swagger-ui")]
    let app = app.merge(api::docs::docs_routes());

    app
}

/// Request timeout for REST routes; slow handlers are answered with 408.
fn rest_timeout(limit: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, limit)
}

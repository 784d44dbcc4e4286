//! Axum WebSocket upgrade handler.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::connection::run_connection;
use crate::app_state::AppState;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Bearer token for clients that cannot set an `Authorization` header.
    pub token: Option<String>,
}

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
///
/// A credential in the `Authorization` header (or `?token=`) is verified
/// before the upgrade; a bad one is answered with 401 and no socket is
/// opened. Without any credential the upgrade proceeds and the client must
/// send an `authenticate` command first.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Response {
    let credential = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or(params.token);

    let principal = match credential {
        Some(credential) => match state.authenticator.authenticate(Some(&credential)).await {
            Ok(principal) => Some(principal),
            Err(e) => {
                tracing::info!(error = %e, "ws upgrade refused");
                return e.into_response();
            }
        },
        None => None,
    };

    ws.on_upgrade(move |socket| run_connection(socket, state, principal))
        .into_response()
}

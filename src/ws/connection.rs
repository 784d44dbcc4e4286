//! WebSocket connection state machine.
//!
//! A connection goes through two phases:
//!
//! 1. **Handshake** — if the upgrade request carried no credential, the
//!    first frame must be an `authenticate` command, received and verified
//!    within the handshake timeout. Failure closes the socket with code
//!    1008 before the hub knows about it.
//! 2. **Session** — the connection is registered with the hub, bound to
//!    its personal room and acknowledged. The loop then multiplexes client
//!    commands, queued outbound frames and server pings until either side
//!    goes away; the hub entry is always closed afterwards.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::Instant;

use super::binder::SessionBinder;
use super::hub::ConnectionHub;
use super::messages::{WsCommand, WsMessage};
use crate::app_state::AppState;
use crate::auth::{Authenticator, Principal};
use crate::domain::{ConnectionId, MessageName};
use crate::error::RealtimeError;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Runs a connection from upgrade to close.
///
/// `principal` is `Some` when the upgrade request was already
/// authenticated from its header or query string.
pub async fn run_connection(socket: WebSocket, state: AppState, principal: Option<Principal>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let principal = match principal {
        Some(principal) => principal,
        None => match run_unauthenticated(&mut ws_tx, &mut ws_rx, &state.authenticator).await {
            Ok(principal) => principal,
            Err(e) => {
                tracing::info!(error = %e, "ws handshake rejected");
                reject(&mut ws_tx, &e).await;
                return;
            }
        },
    };

    serve(
        ws_tx,
        ws_rx,
        &state.hub,
        principal,
        state.settings.ping_interval(),
    )
    .await;
}

/// Waits for an in-band `authenticate` command and verifies it.
///
/// # Errors
///
/// Returns [`RealtimeError::Unauthenticated`] if the client sends anything
/// else first, disconnects, presents a bad token, or stays silent past the
/// handshake timeout.
pub async fn run_unauthenticated(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsStream,
    authenticator: &Authenticator,
) -> Result<Principal, RealtimeError> {
    let deadline = Instant::now() + authenticator.handshake_timeout();
    let first = tokio::time::timeout_at(deadline, first_text(ws_rx))
        .await
        .map_err(|_| RealtimeError::Unauthenticated("handshake timed out".to_string()))?
        .ok_or_else(|| RealtimeError::Unauthenticated("closed before authenticating".to_string()))?;

    let frame: WsMessage = serde_json::from_str(&first)
        .map_err(|_| RealtimeError::Unauthenticated("malformed handshake frame".to_string()))?;
    let WsCommand::Authenticate { token } = WsCommand::from_message(&frame)? else {
        return Err(RealtimeError::Unauthenticated(
            "first frame must be authenticate".to_string(),
        ));
    };

    let principal = authenticator
        .authenticate_before(Some(&token), deadline)
        .await?;
    let reply = WsMessage::response(frame.id, json!({ "authenticated": true }));
    if let Ok(message) = reply.to_frame() {
        let _ = ws_tx.send(message).await;
    }
    Ok(principal)
}

async fn first_text(ws_rx: &mut WsStream) -> Option<String> {
    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => return Some(text.as_str().to_owned()),
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

async fn reject(ws_tx: &mut WsSink, err: &RealtimeError) {
    if let Ok(message) = WsMessage::from_error("", err).to_frame() {
        let _ = ws_tx.send(message).await;
    }
    let _ = ws_tx
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: Utf8Bytes::from_static("authentication failed"),
        })))
        .await;
}

/// Registers, binds and drives an authenticated connection.
///
/// Whatever ends the session, every room membership of the connection is
/// removed before this returns.
pub async fn serve(
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    hub: &ConnectionHub,
    principal: Principal,
    ping_interval: Duration,
) {
    let (id, mut outbound) = hub.register(principal.clone()).await;

    match SessionBinder::bind(hub, id, &principal).await {
        Ok(ack) => {
            let sent = serde_json::to_value(&ack)
                .ok()
                .map(|payload| WsMessage::event(MessageName::ConnectionAck.as_str(), payload))
                .and_then(|frame| frame.to_frame().ok());
            match sent {
                Some(message) => {
                    if ws_tx.send(message).await.is_ok() {
                        session_loop(&mut ws_tx, &mut ws_rx, &mut outbound, hub, id, &principal, ping_interval)
                            .await;
                    } else {
                        tracing::debug!(connection_id = %id, "ack could not be sent");
                    }
                }
                None => tracing::debug!(connection_id = %id, "ack could not be encoded"),
            }
        }
        Err(e) => tracing::warn!(connection_id = %id, error = %e, "session binding failed"),
    }

    hub.close(id).await;
    tracing::info!(connection_id = %id, user_id = principal.user_id, "ws connection closed");
}

async fn session_loop(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsStream,
    outbound: &mut tokio::sync::mpsc::Receiver<Message>,
    hub: &ConnectionHub,
    id: ConnectionId,
    principal: &Principal,
    ping_interval: Duration,
) {
    let mut ping = tokio::time::interval(ping_interval);
    ping.tick().await;

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                let reply = match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_text_message(text.as_str(), hub, id, principal).await
                    }
                    Some(Ok(Message::Binary(_))) => {
                        WsMessage::error("", 400, "binary frames are not supported")
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %id, error = %e, "ws read error");
                        break;
                    }
                };
                match reply.to_frame() {
                    Ok(message) => {
                        if ws_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(connection_id = %id, error = %e, "reply could not be encoded"),
                }
            }
            frame = outbound.recv() => {
                let Some(message) = frame else { break };
                if ws_tx.send(message).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Handles a text frame from an authenticated client.
async fn handle_text_message(
    text: &str,
    hub: &ConnectionHub,
    id: ConnectionId,
    principal: &Principal,
) -> WsMessage {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error("", 400, "malformed JSON");
    };

    let command = match WsCommand::from_message(&msg) {
        Ok(command) => command,
        Err(e) => return WsMessage::from_error(msg.id, &e),
    };

    let result = match command {
        WsCommand::Subscribe { room } => SessionBinder::subscribe(hub, id, principal, &room).await,
        WsCommand::Unsubscribe { room } => {
            SessionBinder::unsubscribe(hub, id, principal, &room).await
        }
        WsCommand::Ping => return WsMessage::response(msg.id, json!({ "pong": true })),
        WsCommand::Authenticate { .. } => {
            return WsMessage::error(msg.id, 400, "connection is already authenticated");
        }
    };

    match result.and_then(|change| {
        serde_json::to_value(change).map_err(|e| RealtimeError::Internal(e.to_string()))
    }) {
        Ok(payload) => WsMessage::response(msg.id, payload),
        Err(e) => {
            tracing::debug!(connection_id = %id, error = %e, "room command refused");
            WsMessage::from_error(msg.id, &e)
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::domain::{Audience, RoomRouter};
    use crate::ws::messages::WsMessageType;

    async fn bound(principal: &Principal) -> (ConnectionHub, ConnectionId) {
        let hub = ConnectionHub::new(4);
        let (id, _rx) = hub.register(principal.clone()).await;
        let _ = SessionBinder::bind(&hub, id, principal).await;
        (hub, id)
    }

    #[tokio::test]
    async fn malformed_json_gets_400() {
        let principal = Principal::new(1, "a@b.c", vec![]);
        let (hub, id) = bound(&principal).await;
        let reply = handle_text_message("{not json", &hub, id, &principal).await;
        assert_eq!(reply.msg_type, WsMessageType::Error);
        assert_eq!(reply.payload["code"], 400);
    }

    #[tokio::test]
    async fn subscribe_reply_lists_rooms() {
        let principal = Principal::new(2, "b@b.c", vec![]);
        let (hub, id) = bound(&principal).await;
        let reply = handle_text_message(
            r#"{"id":"s1","type":"command","payload":{"command":"subscribe","room":"gym:5"}}"#,
            &hub,
            id,
            &principal,
        )
        .await;
        assert_eq!(reply.msg_type, WsMessageType::Response);
        assert_eq!(reply.id, "s1");
        assert_eq!(reply.payload["room"], "gym:5");
        assert_eq!(reply.payload["changed"], true);
        let Ok(gym) = RoomRouter::room(Audience::Gym(5)) else {
            panic!("gym room");
        };
        assert_eq!(hub.members(&gym).await, vec![id]);
    }

    #[tokio::test]
    async fn forbidden_subscribe_gets_403() {
        let principal = Principal::new(3, "c@b.c", vec![Role::User]);
        let (hub, id) = bound(&principal).await;
        let reply = handle_text_message(
            r#"{"id":"s2","type":"command","payload":{"command":"subscribe","room":"admin:stats"}}"#,
            &hub,
            id,
            &principal,
        )
        .await;
        assert_eq!(reply.msg_type, WsMessageType::Error);
        assert_eq!(reply.payload["code"], 403);
        assert_eq!(hub.room_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_room_gets_400() {
        let principal = Principal::new(3, "c@b.c", vec![]);
        let (hub, id) = bound(&principal).await;
        let reply = handle_text_message(
            r#"{"type":"command","payload":{"command":"subscribe","room":"lobby:1"}}"#,
            &hub,
            id,
            &principal,
        )
        .await;
        assert_eq!(reply.payload["code"], 400);
        assert_eq!(reply.payload["errorCode"], 2003);
    }

    #[tokio::test]
    async fn ping_and_repeat_authenticate() {
        let principal = Principal::new(4, "d@b.c", vec![]);
        let (hub, id) = bound(&principal).await;
        let pong = handle_text_message(
            r#"{"id":"p","type":"command","payload":{"command":"ping"}}"#,
            &hub,
            id,
            &principal,
        )
        .await;
        assert_eq!(pong.payload["pong"], true);

        let again = handle_text_message(
            r#"{"type":"command","payload":{"command":"authenticate","token":"x"}}"#,
            &hub,
            id,
            &principal,
        )
        .await;
        assert_eq!(again.msg_type, WsMessageType::Error);
    }
}

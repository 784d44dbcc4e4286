//! Gateway error types with HTTP status code mapping.
//!
//! [`RealtimeError`] is the central error type for the distribution layer.
//! Every variant maps to a numeric code and an HTTP status so REST handlers
//! and the upgrade handler can return it directly, while the WebSocket loop
//! reuses the same codes in `error` frames.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::{ConnectionId, EventKind};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "unauthenticated: missing credential"
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Errors raised by the real-time distribution layer.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status                  |
/// |-----------|---------------------|------------------------------|
/// | 1000–1999 | Handshake / access  | 401 Unauthorized / 403       |
/// | 2000–2999 | Request validation  | 400 Bad Request / 422        |
/// | 3000–3999 | Server / transport  | 404 / 500                    |
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// Handshake credential missing, malformed, expired or rejected.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Authenticated principal lacks the capability for the request.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A domain event payload failed schema validation.
    #[error("invalid payload for {kind}: {reason}")]
    InvalidPayload {
        /// Event kind whose schema rejected the payload.
        kind: EventKind,
        /// Why the payload was rejected.
        reason: String,
    },

    /// Room key or audience descriptor that the router does not know.
    #[error("unknown audience: {0}")]
    UnknownAudience(String),

    /// A single delivery to one connection failed.
    #[error("transport failure on connection {connection_id}: {reason}")]
    TransportFailure {
        /// Connection the frame could not be queued for.
        connection_id: ConnectionId,
        /// Why the frame was skipped.
        reason: String,
    },

    /// Connection is not (or no longer) registered with the hub.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RealtimeError {
    /// Builds an [`RealtimeError::InvalidPayload`] for `kind`.
    #[must_use]
    pub fn invalid_payload(kind: EventKind, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            kind,
            reason: reason.into(),
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Unauthenticated(_) => 1001,
            Self::Forbidden(_) => 1003,
            Self::InvalidRequest(_) => 2001,
            Self::InvalidPayload { .. } => 2002,
            Self::UnknownAudience(_) => 2003,
            Self::ConnectionNotFound(_) => 3004,
            Self::TransportFailure { .. } => 3002,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidRequest(_) | Self::UnknownAudience(_) => StatusCode::BAD_REQUEST,
            Self::InvalidPayload { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            Self::TransportFailure { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Builds the JSON body shared by HTTP responses and WS error frames.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.error_code(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for RealtimeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_body(),
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

//! Handshake authentication.
//!
//! The [`Authenticator`] turns the credential presented on the upgrade
//! request (or in the first frame) into a [`Principal`]. It does not touch
//! the hub; joining rooms is the session binder's job.

pub mod jwt;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::RealtimeError;

pub use jwt::JwtVerifier;

/// Capability held by a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular app user.
    User,
    /// Operator with access to admin topic rooms.
    Admin,
}

/// Authenticated identity bound to one connection for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Numeric user id.
    pub user_id: u64,
    /// Account email.
    pub email: String,
    /// Granted roles; never empty.
    pub roles: Vec<Role>,
}

impl Principal {
    /// Creates a principal, defaulting to [`Role::User`] when `roles` is empty.
    #[must_use]
    pub fn new(user_id: u64, email: impl Into<String>, granted: Vec<Role>) -> Self {
        let mut roles = Vec::with_capacity(granted.len().max(1));
        for role in granted {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        if roles.is_empty() {
            roles.push(Role::User);
        }
        Self {
            user_id,
            email: email.into(),
            roles,
        }
    }

    /// Whether the principal may use admin topic rooms.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// External credential-verification collaborator.
#[async_trait]
pub trait CredentialVerifier: Send + Sync + std::fmt::Debug {
    /// Verifies a raw bearer token (no `Bearer ` prefix).
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Unauthenticated`] for malformed, expired or
    /// otherwise rejected tokens.
    async fn verify(&self, token: &str) -> Result<Principal, RealtimeError>;
}

/// Validates handshake credentials within a bounded time.
#[derive(Debug, Clone)]
pub struct Authenticator {
    verifier: Arc<dyn CredentialVerifier>,
    timeout: Duration,
}

impl Authenticator {
    /// Creates an authenticator around `verifier`.
    #[must_use]
    pub fn new(verifier: Arc<dyn CredentialVerifier>, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }

    /// Upper bound for the whole handshake.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves `credential` to a principal.
    ///
    /// Accepts a bare token or an `Authorization`-style `Bearer <token>`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Unauthenticated`] when the credential is
    /// missing, rejected by the verifier, or verification exceeds the
    /// handshake timeout.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Principal, RealtimeError> {
        self.authenticate_before(credential, Instant::now() + self.timeout)
            .await
    }

    /// Resolves `credential` to a principal, giving up at `deadline`.
    ///
    /// Used when part of the handshake budget was already spent waiting for
    /// the credential itself.
    ///
    /// # Errors
    ///
    /// Same as [`Authenticator::authenticate`].
    pub async fn authenticate_before(
        &self,
        credential: Option<&str>,
        deadline: Instant,
    ) -> Result<Principal, RealtimeError> {
        let token = credential
            .map(str::trim)
            .map(|c| c.strip_prefix("Bearer ").unwrap_or(c).trim())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RealtimeError::Unauthenticated("missing credential".to_string()))?;

        match tokio::time::timeout_at(deadline, self.verifier.verify(token)).await {
            Ok(Ok(principal)) => {
                tracing::debug!(user_id = principal.user_id, "credential verified");
                Ok(principal)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RealtimeError::Unauthenticated(
                "credential verification timed out".to_string(),
            )),
        }
    }
}

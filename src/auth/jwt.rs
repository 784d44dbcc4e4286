//! HS256 JWT verification for the handshake.
//!
//! The API service issues session tokens signed with a shared secret; this
//! verifier checks the signature, expiry and (optionally) issuer and maps
//! the claims to a [`Principal`].

use std::fmt;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use super::{CredentialVerifier, Principal, Role};
use crate::error::RealtimeError;

/// Subject claim: issuers encode the user id either as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Subject {
    /// `"sub": 42`
    Numeric(u64),
    /// `"sub": "42"`
    Text(String),
}

impl Subject {
    fn user_id(&self) -> Option<u64> {
        let id = match self {
            Self::Numeric(id) => *id,
            Self::Text(raw) => raw.trim().parse().ok()?,
        };
        (id > 0).then_some(id)
    }
}

/// Claims carried by session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Subject,
    /// Account email.
    #[serde(default)]
    pub email: String,
    /// Role names (`"user"`, `"admin"`).
    #[serde(default)]
    pub roles: Vec<String>,
    /// Single-role form used by older tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Expiry (Unix seconds).
    pub exp: i64,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    fn into_principal(self) -> Result<Principal, RealtimeError> {
        let user_id = self.sub.user_id().ok_or_else(|| {
            RealtimeError::Unauthenticated("token subject is not a user id".to_string())
        })?;
        let roles = self
            .roles
            .iter()
            .chain(self.role.iter())
            .filter_map(|name| match name.to_ascii_lowercase().as_str() {
                "admin" => Some(Role::Admin),
                "user" => Some(Role::User),
                _ => None,
            })
            .collect();
        Ok(Principal::new(user_id, self.email, roles))
    }
}

/// [`CredentialVerifier`] backed by `jsonwebtoken`.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Creates a verifier for tokens signed with `secret`, optionally pinned
    /// to `issuer`.
    #[must_use]
    pub fn new(secret: &[u8], issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("issuer", &self.validation.iss)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, RealtimeError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token expired",
                ErrorKind::InvalidIssuer => "token issuer rejected",
                ErrorKind::InvalidSignature => "token signature invalid",
                _ => "token malformed",
            };
            tracing::debug!(error = %e, reason, "jwt rejected");
            RealtimeError::Unauthenticated(reason.to_string())
        })?;
        data.claims.into_principal()
    }
}

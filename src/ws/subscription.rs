//! Per-principal subscription policy.
//!
//! Decides which room keys a client may `subscribe` to or `unsubscribe`
//! from. The hub itself enforces nothing; every client-initiated join goes
//! through [`SubscriptionPolicy`] first.

use crate::auth::Principal;
use crate::domain::{Audience, RoomName, RoomRouter};
use crate::error::RealtimeError;

/// Stateless access rules for client room commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionPolicy;

impl SubscriptionPolicy {
    /// Parses `key` and checks that `principal` may join it.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::UnknownAudience`] for unparseable keys and
    /// [`RealtimeError::Forbidden`] when the principal lacks access.
    pub fn authorize_join(principal: &Principal, key: &str) -> Result<RoomName, RealtimeError> {
        let audience: Audience = key.parse()?;
        match audience {
            Audience::Gym(_) => {}
            Audience::User(id) | Audience::UserTokens(id) if id == principal.user_id => {}
            Audience::User(_) | Audience::UserTokens(_) => {
                return Err(RealtimeError::Forbidden(format!(
                    "{key} belongs to another user"
                )));
            }
            Audience::AdminTopic(_) if principal.is_admin() => {}
            Audience::AdminTopic(_) => {
                return Err(RealtimeError::Forbidden(format!("{key} requires admin role")));
            }
            Audience::Broadcast => {
                return Err(RealtimeError::UnknownAudience(key.to_string()));
            }
        }
        RoomRouter::room(audience)
    }

    /// Parses `key` and checks that `principal` may leave it.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::UnknownAudience`] for unparseable keys and
    /// [`RealtimeError::Forbidden`] for the personal room, which stays
    /// joined for the whole connection.
    pub fn authorize_leave(principal: &Principal, key: &str) -> Result<RoomName, RealtimeError> {
        let audience: Audience = key.parse()?;
        if audience == Audience::User(principal.user_id) {
            return Err(RealtimeError::Forbidden(
                "the personal room cannot be left".to_string(),
            ));
        }
        RoomRouter::room(audience)
    }
}

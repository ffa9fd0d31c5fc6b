//! External collaborator contracts.
//!
//! The engine never owns user records, password hashes, client
//! registrations or role assignments. It reaches them through these traits,
//! which an embedding application implements over its own storage.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::client::Client;

/// A user as resolved by the [`UserProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// User id.
    pub id: Uuid,

    /// Whether the user is currently suspended.
    pub suspended: bool,

    /// End of a time-bounded suspension.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub suspended_until: Option<OffsetDateTime>,
}

impl UserRecord {
    /// Creates an active (not suspended) user record.
    #[must_use]
    pub fn active(id: Uuid) -> Self {
        Self {
            id,
            suspended: false,
            suspended_until: None,
        }
    }

    /// Returns `true` if the user is suspended at `now`.
    ///
    /// A suspension with an end date in the past no longer applies.
    #[must_use]
    pub fn is_suspended_at(&self, now: OffsetDateTime) -> bool {
        self.suspended && self.suspended_until.is_none_or(|until| until > now)
    }
}

/// Resolves users.
#[async_trait]
pub trait UserProvider: Send + Sync {
    /// Resolves a user by login identifier.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if no such user exists.
    async fn resolve(&self, username: &str) -> AuthResult<UserRecord>;

    /// Returns `true` if the user is currently suspended.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if no such user exists.
    async fn is_suspended(&self, user_id: Uuid) -> AuthResult<bool>;
}

/// Verifies stored credentials.
#[async_trait]
pub trait PasswordProvider: Send + Sync {
    /// Returns `true` if `raw_password` matches the stored hash for
    /// `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored hash cannot be read.
    async fn verify(&self, owner_id: Uuid, raw_password: &str) -> AuthResult<bool>;

    /// Returns the stored hash for `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if nothing is stored for the owner.
    async fn get(&self, owner_id: Uuid) -> AuthResult<String>;
}

/// Resolves OAuth clients.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// Resolves a client by id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClientId` for a nil id, `ClientNotFound` if unknown.
    async fn resolve(&self, client_id: Uuid) -> AuthResult<Client>;
}

/// Supplies the role and group keys embedded in access tokens.
#[async_trait]
pub trait RoleGroupProvider: Send + Sync {
    /// Returns `(role_keys, group_keys)` for an identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn roles_and_groups_for(&self, identity_id: Uuid)
    -> AuthResult<(Vec<String>, Vec<String>)>;
}

/// The set of collaborators an [`Authenticator`](crate::Authenticator) needs.
#[derive(Clone)]
pub struct Providers {
    /// User lookup and suspension state.
    pub users: Arc<dyn UserProvider>,

    /// Password verification.
    pub passwords: Arc<dyn PasswordProvider>,

    /// Client resolution.
    pub clients: Arc<dyn ClientProvider>,

    /// Role and group keys for access-token claims.
    pub roles: Arc<dyn RoleGroupProvider>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_suspension_window() {
        let now = OffsetDateTime::now_utc();
        let mut user = UserRecord::active(Uuid::new_v4());
        assert!(!user.is_suspended_at(now));

        user.suspended = true;
        assert!(user.is_suspended_at(now));

        user.suspended_until = Some(now + Duration::hours(1));
        assert!(user.is_suspended_at(now));

        user.suspended_until = Some(now - Duration::hours(1));
        assert!(!user.is_suspended_at(now));
    }
}

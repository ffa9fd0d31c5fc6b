//! Refresh token domain type.
//!
//! A [`RefreshToken`] is one node of a rotation chain. Every node of a chain
//! shares the `trace_id` set at the root; `parent_id` points back to the node
//! it was rotated from and `rotated_id` points forward once it is superseded.
//!
//! # Lifecycle
//!
//! ```text
//! Active ──rotate──▶ Rotated
//!   │                   │
//!   ├──revoke──▶ Revoked ◀┘ (both may hold)
//!   └──time────▶ Expired
//! ```
//!
//! [`RefreshToken::is_active`] reports the first failing condition in the
//! order expired, rotated, revoked.
//!
//! # Security
//!
//! - The credential is 32 random bytes, never derived from other fields
//! - Only confidential clients may start a chain
//! - A node is rotated at most once and never reactivated

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::types::client::Client;
use crate::types::credential::CredentialHash;
use crate::types::identity::Identity;

/// A node in a refresh-token rotation chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    /// Unique identifier for this node.
    pub id: Uuid,

    /// Identifier shared by every node of one continuous login.
    pub trace_id: Uuid,

    /// Node this one was rotated from (`None` at the chain root).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,

    /// Node this one was rotated into, once superseded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotated_id: Option<Uuid>,

    /// Session issued together with this node.
    pub last_session_id: Uuid,

    /// Client this chain belongs to.
    pub client_id: Uuid,

    /// Who this chain belongs to.
    pub identity: Identity,

    /// The secret credential handed to the client.
    pub hash: CredentialHash,

    /// When this node was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When this node was rotated.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub rotated_at: Option<OffsetDateTime>,

    /// When this node was revoked.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub revoked_at: Option<OffsetDateTime>,

    /// When this node expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
}

impl RefreshToken {
    /// Creates the root node of a new chain.
    ///
    /// # Errors
    ///
    /// - `InvalidClient` if `client` is `None` or not confidential
    /// - `InvalidTraceId` if `trace_id` is nil
    /// - `InvalidExpiration` if `expire_at` is not in the future
    pub fn new_root(
        trace_id: Uuid,
        session_id: Uuid,
        client: Option<&Client>,
        identity: Identity,
        expire_at: OffsetDateTime,
    ) -> AuthResult<Self> {
        let client = client.ok_or_else(|| AuthError::invalid_client("client is not set"))?;
        if !client.confidential {
            return Err(AuthError::invalid_client(
                "refresh tokens are only issued to confidential clients",
            ));
        }
        if trace_id.is_nil() {
            return Err(AuthError::InvalidTraceId);
        }

        let now = OffsetDateTime::now_utc();
        if expire_at <= now {
            return Err(AuthError::invalid_expiration(format!(
                "expiration {expire_at} is in the past"
            )));
        }

        let token = Self {
            id: Uuid::new_v4(),
            trace_id,
            parent_id: None,
            rotated_id: None,
            last_session_id: session_id,
            client_id: client.id,
            identity,
            hash: CredentialHash::generate(),
            created_at: now,
            rotated_at: None,
            revoked_at: None,
            expire_at,
        };
        token.validate()?;
        Ok(token)
    }

    /// Builds the successor of this node without modifying it.
    ///
    /// The successor copies the trace id, client and identity, points back
    /// to `self` and carries a fresh credential. Marking `self` as rotated
    /// is the registry's job, in the same critical section that inserts the
    /// successor.
    #[must_use]
    pub fn successor(&self, session_id: Uuid, expire_at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            trace_id: self.trace_id,
            parent_id: Some(self.id),
            rotated_id: None,
            last_session_id: session_id,
            client_id: self.client_id,
            identity: self.identity,
            hash: CredentialHash::generate(),
            created_at: OffsetDateTime::now_utc(),
            rotated_at: None,
            revoked_at: None,
            expire_at,
        }
    }

    /// Checks the structural invariants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRefreshToken` if any required id is nil or the expiry
    /// is unset.
    pub fn validate(&self) -> AuthResult<()> {
        if self.id.is_nil() {
            return Err(AuthError::invalid_refresh_token("id is nil"));
        }
        if self.client_id.is_nil() {
            return Err(AuthError::invalid_refresh_token("client id is nil"));
        }
        if self.trace_id.is_nil() {
            return Err(AuthError::invalid_refresh_token("trace id is nil"));
        }
        if self.last_session_id.is_nil() {
            return Err(AuthError::invalid_refresh_token("last session id is nil"));
        }
        if self.expire_at == OffsetDateTime::UNIX_EPOCH {
            return Err(AuthError::invalid_refresh_token("expiry is unset"));
        }
        Ok(())
    }

    /// Returns `true` if this node has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expire_at
    }

    /// Returns `true` if this node has been superseded.
    #[must_use]
    pub fn is_rotated(&self) -> bool {
        self.rotated_id.is_some()
    }

    /// Returns `true` if this node has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Checks whether the node may be redeemed right now.
    ///
    /// # Errors
    ///
    /// Returns the first failing condition: `RefreshTokenExpired`,
    /// `RefreshTokenRotated`, then `RefreshTokenRevoked`.
    pub fn is_active(&self) -> AuthResult<()> {
        self.is_active_at(OffsetDateTime::now_utc())
    }

    /// Same as [`is_active`](Self::is_active) against an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`is_active`](Self::is_active).
    pub fn is_active_at(&self, now: OffsetDateTime) -> AuthResult<()> {
        if self.is_expired_at(now) {
            return Err(AuthError::RefreshTokenExpired);
        }
        if self.is_rotated() {
            return Err(AuthError::RefreshTokenRotated);
        }
        if self.is_revoked() {
            return Err(AuthError::RefreshTokenRevoked);
        }
        Ok(())
    }

    /// Marks this node as superseded by `successor_id`.
    ///
    /// # Errors
    ///
    /// Returns `RefreshTokenRotated` if it was already rotated.
    pub fn mark_rotated(&mut self, successor_id: Uuid) -> AuthResult<()> {
        if self.is_rotated() {
            return Err(AuthError::RefreshTokenRotated);
        }
        self.rotated_id = Some(successor_id);
        self.rotated_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    /// Revokes this node. Returns `false` if it was already revoked.
    pub fn revoke(&mut self) -> bool {
        if self.is_revoked() {
            return false;
        }
        self.revoked_at = Some(OffsetDateTime::now_utc());
        true
    }
}

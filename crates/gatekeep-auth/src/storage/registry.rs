//! Session and refresh-token registry trait.
//!
//! The registry is the single source of truth for whether a session,
//! refresh token or access-token JTI is currently usable. Every operation
//! that touches more than one index must be atomic: a session findable by
//! id but not by refresh-token hash is an invariant violation.
//!
//! # Security Considerations
//!
//! - Revocation must be atomic and immediate
//! - Rotation must be linearizable per chain: of two concurrent rotations
//!   of the same node, exactly one succeeds
//! - Blacklisted JTIs are kept until their natural expiry, never longer

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::types::credential::CredentialHash;
use crate::types::refresh_token::RefreshToken;
use crate::types::session::{RevocationReason, Session};

/// Key used to find a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLookup {
    /// Session id.
    Id(Uuid),
    /// JTI of the session's access token.
    AccessToken(Uuid),
    /// Credential of the refresh token issued with the session.
    RefreshTokenHash(CredentialHash),
}

/// Key used to find a refresh-token node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenLookup {
    /// Node id.
    Id(Uuid),
    /// Presented credential.
    Hash(CredentialHash),
}

/// Counts of entries evicted by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Blacklisted JTIs past their expiry.
    pub revoked_access_tokens: usize,
    /// Sessions past expiry plus grace.
    pub sessions: usize,
    /// Refresh-token nodes past expiry plus grace.
    pub refresh_tokens: usize,
}

impl SweepStats {
    /// Total number of evicted entries.
    #[must_use]
    pub fn total(&self) -> usize {
        self.revoked_access_tokens + self.sessions + self.refresh_tokens
    }
}

/// Storage trait for sessions, refresh-token chains and the JTI blacklist.
///
/// # Implementations
///
/// - [`MemoryRegistry`](super::MemoryRegistry) - in-process reference backend
///
/// A durable backend must offer the same atomicity per call, typically by
/// running each method in one database transaction.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Registers a session and, optionally, the refresh-token node issued
    /// with it.
    ///
    /// # Arguments
    ///
    /// * `session` - The session to index by id, access token and identity
    /// * `refresh_token` - Node to insert and index by hash
    ///
    /// # Errors
    ///
    /// Returns `InvalidSession` / `InvalidRefreshToken` if validation fails
    /// or the two do not reference each other. Nothing is stored on error.
    async fn put_session(
        &self,
        session: Session,
        refresh_token: Option<RefreshToken>,
    ) -> AuthResult<()>;

    /// Finds a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` on a miss.
    async fn get_session(&self, lookup: SessionLookup) -> AuthResult<Session>;

    /// Removes a session from every index.
    ///
    /// If the session was revoked and has not expired yet, its JTI is
    /// blacklisted until the session's expiry.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if no such session exists.
    async fn delete_session(&self, id: Uuid) -> AuthResult<Session>;

    /// Revokes a session, blacklists its access token and revokes the
    /// refresh-token node issued with it, in one step.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or `SessionAlreadyRevoked`.
    async fn revoke_session(
        &self,
        id: Uuid,
        reason: RevocationReason,
        note: Option<String>,
    ) -> AuthResult<Session>;

    /// Lists the sessions of one identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_sessions(&self, identity_id: Uuid) -> AuthResult<Vec<Session>>;

    /// Blacklists an access-token JTI until `expire_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn put_revoked_access_token(&self, jti: Uuid, expire_at: OffsetDateTime)
    -> AuthResult<()>;

    /// Returns `true` if the JTI is blacklisted and the entry has not expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn is_revoked(&self, jti: Uuid) -> AuthResult<bool>;

    /// Removes a JTI from the blacklist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_revoked_access_item(&self, jti: Uuid) -> AuthResult<()>;

    /// Finds a refresh-token node.
    ///
    /// # Errors
    ///
    /// Returns `RefreshTokenNotFound` on a miss.
    async fn get_refresh_token(&self, lookup: RefreshTokenLookup) -> AuthResult<RefreshToken>;

    /// Rotates `current_id` into `successor` and registers `session`.
    ///
    /// Within one critical section this re-checks that the current node is
    /// active, marks it rotated, inserts the successor and registers the
    /// new session.
    ///
    /// # Errors
    ///
    /// - `RefreshTokenNotFound` if the current node is gone
    /// - `RefreshTokenExpired` / `RefreshTokenRotated` / `RefreshTokenRevoked`
    ///   if it is no longer active
    /// - `InvalidSession` / `InvalidRefreshToken` for malformed input
    async fn rotate_refresh_token(
        &self,
        current_id: Uuid,
        successor: RefreshToken,
        session: Session,
    ) -> AuthResult<()>;

    /// Revokes one refresh-token node.
    ///
    /// # Errors
    ///
    /// Returns `RefreshTokenNotFound` if no such node exists.
    async fn revoke_refresh_token(&self, id: Uuid) -> AuthResult<RefreshToken>;

    /// Revokes every node sharing `trace_id`. Returns how many were newly
    /// revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_refresh_chain(&self, trace_id: Uuid) -> AuthResult<usize>;

    /// Evicts expired state: blacklist entries past expiry, sessions and
    /// refresh-token nodes past expiry plus `grace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn sweep_expired(&self, now: OffsetDateTime, grace: Duration) -> AuthResult<SweepStats>;

    /// Claims the single reaper slot. Returns `false` if already claimed.
    fn claim_reaper(&self) -> bool;

    /// Releases the reaper slot.
    fn release_reaper(&self);
}

//! Authenticated session domain type.
//!
//! A [`Session`] is created for every issued access token. Its id doubles as
//! the access token's `jti`, so revoking the session and blacklisting the
//! token are the same key.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::types::identity::Identity;

/// Transport-level metadata captured by the caller for each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    /// Remote address.
    pub ip: IpAddr,

    /// `User-Agent` header value, verbatim.
    pub user_agent: String,
}

impl RequestMetadata {
    /// Creates request metadata.
    #[must_use]
    pub fn new(ip: IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            ip,
            user_agent: user_agent.into(),
        }
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            user_agent: String::new(),
        }
    }
}

/// Why a session was revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    /// The user logged out.
    Logout,
    /// The session outlived its expiry and was closed.
    Expiry,
    /// An administrator or the system revoked it.
    System,
    /// The client asked for revocation.
    Client,
}

impl RevocationReason {
    /// Returns the reason as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::Expiry => "expiry",
            Self::System => "system",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a session came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    /// Direct login with credentials.
    Credentials,
    /// Redemption of a refresh token.
    RefreshToken,
}

/// Revocation details recorded on a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revocation {
    /// Why the session was revoked.
    pub reason: RevocationReason,

    /// Free-form note supplied by the revoker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// When the session was revoked.
    #[serde(with = "time::serde::rfc3339")]
    pub revoked_at: OffsetDateTime,
}

/// An authenticated session bound to one identity and one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session id, equal to the access token's `jti`.
    pub id: Uuid,

    /// Client the session was issued to.
    pub client_id: Uuid,

    /// Who the session belongs to.
    pub identity: Identity,

    /// Remote address at creation.
    pub ip: IpAddr,

    /// User agent at creation.
    pub user_agent: String,

    /// How the session was created.
    pub origin: SessionOrigin,

    /// Refresh-token node issued alongside this session, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_id: Option<Uuid>,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the session was obtained through a refresh.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub refreshed_at: Option<OffsetDateTime>,

    /// Set once, by [`Session::revoke`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation: Option<Revocation>,

    /// When the session (and its access token) expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
}

impl Session {
    /// Creates a new, unrevoked session.
    #[must_use]
    pub fn new(
        id: Uuid,
        client_id: Uuid,
        identity: Identity,
        meta: &RequestMetadata,
        origin: SessionOrigin,
        expire_at: OffsetDateTime,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            client_id,
            identity,
            ip: meta.ip,
            user_agent: meta.user_agent.clone(),
            origin,
            refresh_token_id: None,
            created_at: now,
            refreshed_at: (origin == SessionOrigin::RefreshToken).then_some(now),
            revocation: None,
            expire_at,
        }
    }

    /// Links the refresh-token node issued with this session.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token_id: Uuid) -> Self {
        self.refresh_token_id = Some(refresh_token_id);
        self
    }

    /// Checks the structural invariants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSession` if the id or identity id is nil, the expiry
    /// is unset, or the identity itself is malformed.
    pub fn validate(&self) -> AuthResult<()> {
        if self.id.is_nil() {
            return Err(AuthError::invalid_session("session id is nil"));
        }
        if self.expire_at == OffsetDateTime::UNIX_EPOCH {
            return Err(AuthError::invalid_session("session expiry is unset"));
        }
        if self.identity.id.is_nil() {
            return Err(AuthError::invalid_session("session identity id is nil"));
        }
        self.identity
            .validate()
            .map_err(|e| AuthError::invalid_session(e.to_string()))
    }

    /// Revokes the session. One-way.
    ///
    /// # Errors
    ///
    /// Returns `SessionAlreadyRevoked` if the session was revoked before.
    pub fn revoke(&mut self, reason: RevocationReason, note: Option<String>) -> AuthResult<()> {
        if self.revocation.is_some() {
            return Err(AuthError::SessionAlreadyRevoked);
        }
        self.revocation = Some(Revocation {
            reason,
            note,
            revoked_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    /// Returns `true` if the session has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revocation.is_some()
    }

    /// Returns the revocation reason, if revoked.
    #[must_use]
    pub fn revocation_reason(&self) -> Option<RevocationReason> {
        self.revocation.as_ref().map(|r| r.reason)
    }

    /// Returns `true` if the session has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expire_at
    }

    /// Returns `true` if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if the session is neither revoked nor expired.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_revoked() && !self.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn test_session() -> Session {
        Session::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Identity::user(Uuid::new_v4()).unwrap(),
            &RequestMetadata::new("10.0.0.1".parse().unwrap(), "test-agent/1.0"),
            SessionOrigin::Credentials,
            OffsetDateTime::now_utc() + Duration::minutes(15),
        )
    }

    #[test]
    fn test_new_session_is_active() {
        let session = test_session();
        assert!(session.validate().is_ok());
        assert!(session.is_active());
        assert!(session.refreshed_at.is_none());
        assert_eq!(session.user_agent, "test-agent/1.0");
    }

    #[test]
    fn test_refresh_origin_sets_refreshed_at() {
        let session = Session::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Identity::user(Uuid::new_v4()).unwrap(),
            &RequestMetadata::default(),
            SessionOrigin::RefreshToken,
            OffsetDateTime::now_utc() + Duration::minutes(15),
        );
        assert!(session.refreshed_at.is_some());
    }

    #[test]
    fn test_revoke_is_one_way() {
        let mut session = test_session();
        session
            .revoke(RevocationReason::Logout, Some("user clicked logout".into()))
            .unwrap();
        assert!(session.is_revoked());
        assert_eq!(session.revocation_reason(), Some(RevocationReason::Logout));

        let err = session.revoke(RevocationReason::System, None).unwrap_err();
        assert!(matches!(err, AuthError::SessionAlreadyRevoked));
        // First reason is kept.
        assert_eq!(session.revocation_reason(), Some(RevocationReason::Logout));
    }

    #[test]
    fn test_validate_rejects_nil_id() {
        let mut session = test_session();
        session.id = Uuid::nil();
        assert!(matches!(
            session.validate(),
            Err(AuthError::InvalidSession { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unset_expiry() {
        let mut session = test_session();
        session.expire_at = OffsetDateTime::UNIX_EPOCH;
        assert!(session.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_identity() {
        let mut session = test_session();
        session.identity = Identity::none();
        assert!(session.validate().is_err());
    }

    #[test]
    fn test_expiry() {
        let mut session = test_session();
        session.expire_at = OffsetDateTime::now_utc() - Duration::seconds(1);
        assert!(session.is_expired());
        assert!(!session.is_active());
    }

    #[test]
    fn test_serialization() {
        let session = test_session();
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"origin\":\"credentials\""));
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, session.id);
        assert_eq!(parsed.identity, session.identity);
    }
}

//! In-memory registry backend.
//!
//! All indices live in one [`RegistryState`] behind a single
//! `tokio::sync::RwLock`, so each trait call updates them as one unit.
//! Readers run concurrently; writers (including the reaper sweep) are
//! exclusive for the duration of one call.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::registry::{RefreshTokenLookup, Registry, SessionLookup, SweepStats};
use crate::types::credential::CredentialHash;
use crate::types::refresh_token::RefreshToken;
use crate::types::session::{RevocationReason, Session};

#[derive(Debug, Default)]
struct RegistryState {
    sessions: HashMap<Uuid, Session>,
    /// JTI -> session id. Identical keys today; kept separate so a backend
    /// may decouple the two.
    by_access_token: HashMap<Uuid, Uuid>,
    by_refresh_hash: HashMap<CredentialHash, Uuid>,
    by_identity: HashMap<Uuid, HashSet<Uuid>>,
    /// Refresh-token arena, addressed by node id.
    tokens: HashMap<Uuid, RefreshToken>,
    token_by_hash: HashMap<CredentialHash, Uuid>,
    /// JTI -> natural expiry of the revoked access token.
    blacklist: HashMap<Uuid, OffsetDateTime>,
}

impl RegistryState {
    fn check_new_session(
        &self,
        session: &Session,
        refresh_token: Option<&RefreshToken>,
    ) -> AuthResult<()> {
        session.validate()?;
        if self.sessions.contains_key(&session.id) {
            return Err(AuthError::invalid_session("session is already registered"));
        }
        match (refresh_token, session.refresh_token_id) {
            (None, None) => Ok(()),
            (Some(token), Some(token_id)) => {
                token.validate()?;
                if token.id != token_id || token.last_session_id != session.id {
                    return Err(AuthError::invalid_session(
                        "session and refresh token do not reference each other",
                    ));
                }
                if self.tokens.contains_key(&token.id)
                    || self.token_by_hash.contains_key(&token.hash)
                {
                    return Err(AuthError::invalid_refresh_token(
                        "refresh token is already registered",
                    ));
                }
                Ok(())
            }
            (None, Some(_)) => Err(AuthError::invalid_session(
                "session references a refresh token that was not supplied",
            )),
            (Some(_), None) => Err(AuthError::invalid_session(
                "refresh token supplied for a session that does not reference it",
            )),
        }
    }

    /// Inserts a pre-validated session and token.
    fn insert(&mut self, session: Session, refresh_token: Option<RefreshToken>) {
        if let Some(token) = refresh_token {
            self.by_refresh_hash.insert(token.hash, session.id);
            self.token_by_hash.insert(token.hash, token.id);
            self.tokens.insert(token.id, token);
        }
        self.by_access_token.insert(session.id, session.id);
        self.by_identity
            .entry(session.identity.id)
            .or_default()
            .insert(session.id);
        self.sessions.insert(session.id, session);
    }

    fn remove_session(&mut self, id: Uuid) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.by_access_token.remove(&session.id);
        if let Some(hash) = session
            .refresh_token_id
            .and_then(|token_id| self.tokens.get(&token_id))
            .map(|token| token.hash)
        {
            self.by_refresh_hash.remove(&hash);
        }
        if let Some(ids) = self.by_identity.get_mut(&session.identity.id) {
            ids.remove(&session.id);
            if ids.is_empty() {
                self.by_identity.remove(&session.identity.id);
            }
        }
        Some(session)
    }

    fn blacklist_until(&mut self, jti: Uuid, expire_at: OffsetDateTime, now: OffsetDateTime) {
        if expire_at > now {
            self.blacklist.insert(jti, expire_at);
        }
    }
}

/// An expiry that overflows with the grace window added is never reached.
fn past_grace(expire_at: OffsetDateTime, grace: Duration, now: OffsetDateTime) -> bool {
    expire_at.checked_add(grace).is_some_and(|t| t <= now)
}

/// In-process [`Registry`] implementation.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: RwLock<RegistryState>,
    reaper_claimed: AtomicBool,
}

impl MemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn put_session(
        &self,
        session: Session,
        refresh_token: Option<RefreshToken>,
    ) -> AuthResult<()> {
        let mut state = self.state.write().await;
        state.check_new_session(&session, refresh_token.as_ref())?;
        state.insert(session, refresh_token);
        Ok(())
    }

    async fn get_session(&self, lookup: SessionLookup) -> AuthResult<Session> {
        let state = self.state.read().await;
        let id = match lookup {
            SessionLookup::Id(id) => Some(id),
            SessionLookup::AccessToken(jti) => state.by_access_token.get(&jti).copied(),
            SessionLookup::RefreshTokenHash(hash) => state.by_refresh_hash.get(&hash).copied(),
        };
        id.and_then(|id| state.sessions.get(&id))
            .cloned()
            .ok_or(AuthError::SessionNotFound)
    }

    async fn delete_session(&self, id: Uuid) -> AuthResult<Session> {
        let now = OffsetDateTime::now_utc();
        let mut state = self.state.write().await;
        let session = state.remove_session(id).ok_or(AuthError::SessionNotFound)?;
        if session.is_revoked() {
            state.blacklist_until(session.id, session.expire_at, now);
        }
        Ok(session)
    }

    async fn revoke_session(
        &self,
        id: Uuid,
        reason: RevocationReason,
        note: Option<String>,
    ) -> AuthResult<Session> {
        let now = OffsetDateTime::now_utc();
        let mut state = self.state.write().await;
        let session = state.sessions.get_mut(&id).ok_or(AuthError::SessionNotFound)?;
        session.revoke(reason, note)?;
        let session = session.clone();

        state.blacklist_until(session.id, session.expire_at, now);
        if let Some(token) = session
            .refresh_token_id
            .and_then(|token_id| state.tokens.get_mut(&token_id))
        {
            token.revoke();
        }
        Ok(session)
    }

    async fn list_sessions(&self, identity_id: Uuid) -> AuthResult<Vec<Session>> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .by_identity
            .get(&identity_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.sessions.get(id))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn put_revoked_access_token(
        &self,
        jti: Uuid,
        expire_at: OffsetDateTime,
    ) -> AuthResult<()> {
        let now = OffsetDateTime::now_utc();
        self.state.write().await.blacklist_until(jti, expire_at, now);
        Ok(())
    }

    async fn is_revoked(&self, jti: Uuid) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        let state = self.state.read().await;
        Ok(state.blacklist.get(&jti).is_some_and(|exp| *exp > now))
    }

    async fn delete_revoked_access_item(&self, jti: Uuid) -> AuthResult<()> {
        self.state.write().await.blacklist.remove(&jti);
        Ok(())
    }

    async fn get_refresh_token(&self, lookup: RefreshTokenLookup) -> AuthResult<RefreshToken> {
        let state = self.state.read().await;
        let id = match lookup {
            RefreshTokenLookup::Id(id) => Some(id),
            RefreshTokenLookup::Hash(hash) => state.token_by_hash.get(&hash).copied(),
        };
        id.and_then(|id| state.tokens.get(&id))
            .cloned()
            .ok_or(AuthError::RefreshTokenNotFound)
    }

    async fn rotate_refresh_token(
        &self,
        current_id: Uuid,
        successor: RefreshToken,
        session: Session,
    ) -> AuthResult<()> {
        let now = OffsetDateTime::now_utc();
        let mut state = self.state.write().await;

        let current = state
            .tokens
            .get(&current_id)
            .ok_or(AuthError::RefreshTokenNotFound)?;
        current.is_active_at(now)?;
        if successor.parent_id != Some(current_id) || successor.trace_id != current.trace_id {
            return Err(AuthError::invalid_refresh_token(
                "successor does not continue the presented chain",
            ));
        }
        state.check_new_session(&session, Some(&successor))?;

        let successor_id = successor.id;
        if let Some(current) = state.tokens.get_mut(&current_id) {
            current.mark_rotated(successor_id)?;
        }
        state.insert(session, Some(successor));
        Ok(())
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> AuthResult<RefreshToken> {
        let mut state = self.state.write().await;
        let token = state
            .tokens
            .get_mut(&id)
            .ok_or(AuthError::RefreshTokenNotFound)?;
        token.revoke();
        Ok(token.clone())
    }

    async fn revoke_refresh_chain(&self, trace_id: Uuid) -> AuthResult<usize> {
        let mut state = self.state.write().await;
        Ok(state
            .tokens
            .values_mut()
            .filter(|t| t.trace_id == trace_id)
            .map(RefreshToken::revoke)
            .filter(|newly| *newly)
            .count())
    }

    async fn sweep_expired(&self, now: OffsetDateTime, grace: Duration) -> AuthResult<SweepStats> {
        let mut state = self.state.write().await;
        let mut stats = SweepStats::default();

        let before = state.blacklist.len();
        state.blacklist.retain(|_, expire_at| *expire_at > now);
        stats.revoked_access_tokens = before - state.blacklist.len();

        let expired_sessions: Vec<Uuid> = state
            .by_identity
            .values()
            .flatten()
            .filter(|id| {
                state
                    .sessions
                    .get(id)
                    .is_none_or(|s| past_grace(s.expire_at, grace, now))
            })
            .copied()
            .collect();
        for id in expired_sessions {
            if state.remove_session(id).is_some() {
                stats.sessions += 1;
            }
        }

        let expired_tokens: Vec<(Uuid, CredentialHash)> = state
            .tokens
            .values()
            .filter(|t| past_grace(t.expire_at, grace, now))
            .map(|t| (t.id, t.hash))
            .collect();
        for (id, hash) in expired_tokens {
            state.tokens.remove(&id);
            state.token_by_hash.remove(&hash);
            state.by_refresh_hash.remove(&hash);
            stats.refresh_tokens += 1;
        }

        Ok(stats)
    }

    fn claim_reaper(&self) -> bool {
        self.reaper_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release_reaper(&self) {
        self.reaper_claimed.store(false, Ordering::Release);
    }
}

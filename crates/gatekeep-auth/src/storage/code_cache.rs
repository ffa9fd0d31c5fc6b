//! One-time authorization-code storage.
//!
//! An authorization code maps to the PKCE challenge it was issued against
//! and the token pair it unlocks. Codes are single use: [`take`] removes the
//! entry whether or not the caller's verifier turns out to match.
//!
//! [`take`]: AuthorizationCodeCache::take

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::pkce::PkceChallenge;
use crate::types::token_pair::TokenPair;

/// What an authorization code is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationCodeEntry {
    /// Challenge the verifier must satisfy.
    pub challenge: PkceChallenge,

    /// Token pair released on a successful exchange.
    pub token_pair: TokenPair,
}

/// Key-value store for authorization codes with TTL and atomic take.
///
/// Satisfied equally by an in-process cache or a networked one.
#[async_trait]
pub trait AuthorizationCodeCache: Send + Sync {
    /// Stores an entry under `code` for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be stored.
    async fn put(&self, code: String, entry: AuthorizationCodeEntry, ttl: Duration)
    -> AuthResult<()>;

    /// Removes and returns the entry for `code`.
    ///
    /// # Errors
    ///
    /// Returns `AuthorizationCodeNotFound` if the code is unknown or expired.
    async fn take(&self, code: &str) -> AuthResult<AuthorizationCodeEntry>;

    /// Drops expired entries. Returns how many were removed.
    ///
    /// Default implementation is a no-op (for backends with native TTL).
    fn cleanup_expired(&self) -> usize {
        0
    }
}

struct CachedCode {
    entry: AuthorizationCodeEntry,
    expires_at: Instant,
}

/// In-process [`AuthorizationCodeCache`] backed by `DashMap`.
#[derive(Default)]
pub struct MemoryCodeCache {
    entries: DashMap<String, CachedCode>,
    evictions: AtomicU64,
}

impl MemoryCodeCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries dropped because they expired.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AuthorizationCodeCache for MemoryCodeCache {
    async fn put(
        &self,
        code: String,
        entry: AuthorizationCodeEntry,
        ttl: Duration,
    ) -> AuthResult<()> {
        let expires_at = Instant::now().checked_add(ttl).ok_or_else(|| {
            AuthError::invalid_expiration("authorization code lifetime is out of range")
        })?;
        self.entries.insert(code, CachedCode { entry, expires_at });
        Ok(())
    }

    async fn take(&self, code: &str) -> AuthResult<AuthorizationCodeEntry> {
        let (_, cached) = self
            .entries
            .remove(code)
            .ok_or(AuthError::AuthorizationCodeNotFound)?;
        if cached.expires_at <= Instant::now() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            return Err(AuthError::AuthorizationCodeNotFound);
        }
        Ok(cached.entry)
    }

    fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.entries.retain(|_, cached| {
            if cached.expires_at <= now {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> AuthorizationCodeEntry {
        AuthorizationCodeEntry {
            challenge: PkceChallenge::new("verifier", "plain").unwrap(),
            token_pair: TokenPair::new("a.b.c".into(), Some("ff".repeat(32))),
        }
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let cache = MemoryCodeCache::new();
        cache
            .put("code-1".into(), entry(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.take("code-1").await.unwrap(), entry());
        assert!(matches!(
            cache.take("code-1").await,
            Err(AuthError::AuthorizationCodeNotFound)
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_code() {
        let cache = MemoryCodeCache::new();
        assert!(matches!(
            cache.take("nope").await,
            Err(AuthError::AuthorizationCodeNotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_code_not_returned() {
        let cache = MemoryCodeCache::new();
        cache.put("code".into(), entry(), Duration::ZERO).await.unwrap();
        assert!(matches!(
            cache.take("code").await,
            Err(AuthError::AuthorizationCodeNotFound)
        ));
        assert_eq!(cache.evictions(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_rejected() {
        let cache = MemoryCodeCache::new();
        assert!(matches!(
            cache
                .put("code".into(), entry(), Duration::from_secs(u64::MAX))
                .await,
            Err(AuthError::InvalidExpiration { .. })
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let cache = MemoryCodeCache::new();
        cache.put("old".into(), entry(), Duration::ZERO).await.unwrap();
        cache
            .put("fresh".into(), entry(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.take("fresh").await.is_ok());
    }
}

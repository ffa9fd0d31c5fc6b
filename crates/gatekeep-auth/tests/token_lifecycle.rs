//! End-to-end token lifecycle tests against the in-memory backends.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use gatekeep_auth::{
    AuthConfig, AuthError, AuthResult, Authenticator, Client, ClientProvider, CredentialHash,
    JwtService, MemoryCodeCache, MemoryRegistry, PasswordProvider, PkceChallenge, PkceVerifier,
    Providers, Reaper, RefreshToken, RefreshTokenLookup, RequestMetadata, RevocationReason,
    RoleGroupProvider, SessionLookup, SigningKeyPair, TokenPair, UserProvider, UserRecord,
};
use time::OffsetDateTime;
use uuid::Uuid;

// ============================================================================
// Fixtures
// ============================================================================

fn signing_key() -> SigningKeyPair {
    static KEY: OnceLock<SigningKeyPair> = OnceLock::new();
    KEY.get_or_init(|| SigningKeyPair::generate().unwrap())
        .clone()
}

/// In-memory user, password, client and role directory.
#[derive(Default)]
struct Directory {
    users: RwLock<HashMap<String, UserRecord>>,
    passwords: RwLock<HashMap<Uuid, String>>,
    clients: RwLock<HashMap<Uuid, Client>>,
}

impl Directory {
    fn add_user(&self, username: &str, password: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.users
            .write()
            .unwrap()
            .insert(username.to_string(), UserRecord::active(id));
        self.passwords
            .write()
            .unwrap()
            .insert(id, password.to_string());
        id
    }

    fn add_client(&self, client: Client) {
        self.clients.write().unwrap().insert(client.id, client);
    }

    fn suspend(&self, username: &str) {
        if let Some(user) = self.users.write().unwrap().get_mut(username) {
            user.suspended = true;
        }
    }
}

#[async_trait::async_trait]
impl UserProvider for Directory {
    async fn resolve(&self, username: &str) -> AuthResult<UserRecord> {
        self.users
            .read()
            .unwrap()
            .get(username)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn is_suspended(&self, user_id: Uuid) -> AuthResult<bool> {
        self.users
            .read()
            .unwrap()
            .values()
            .find(|u| u.id == user_id)
            .map(|u| u.is_suspended_at(OffsetDateTime::now_utc()))
            .ok_or(AuthError::UserNotFound)
    }
}

#[async_trait::async_trait]
impl PasswordProvider for Directory {
    async fn verify(&self, owner_id: Uuid, raw_password: &str) -> AuthResult<bool> {
        Ok(self
            .passwords
            .read()
            .unwrap()
            .get(&owner_id)
            .is_some_and(|p| p == raw_password))
    }

    async fn get(&self, owner_id: Uuid) -> AuthResult<String> {
        self.passwords
            .read()
            .unwrap()
            .get(&owner_id)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }
}

#[async_trait::async_trait]
impl ClientProvider for Directory {
    async fn resolve(&self, client_id: Uuid) -> AuthResult<Client> {
        self.clients
            .read()
            .unwrap()
            .get(&client_id)
            .copied()
            .ok_or(AuthError::ClientNotFound)
    }
}

#[async_trait::async_trait]
impl RoleGroupProvider for Directory {
    async fn roles_and_groups_for(
        &self,
        _identity_id: Uuid,
    ) -> AuthResult<(Vec<String>, Vec<String>)> {
        Ok((vec!["admin".to_string()], vec!["ops".to_string()]))
    }
}

struct Harness {
    auth: Arc<Authenticator>,
    directory: Arc<Directory>,
    client: Client,
    user_id: Uuid,
}

fn harness_with(config: AuthConfig) -> Harness {
    let directory = Arc::new(Directory::default());
    let user_id = directory.add_user("alice", "hunter2");
    let client = Client::confidential(Uuid::new_v4());
    directory.add_client(client);

    let providers = Providers {
        users: directory.clone(),
        passwords: directory.clone(),
        clients: directory.clone(),
        roles: directory.clone(),
    };
    let jwt = JwtService::new(signing_key(), config.issuer.clone());
    let auth = Authenticator::new(
        config,
        jwt,
        Arc::new(MemoryRegistry::new()),
        Arc::new(MemoryCodeCache::new()),
        providers,
    )
    .unwrap();

    Harness {
        auth: Arc::new(auth),
        directory,
        client,
        user_id,
    }
}

fn harness() -> Harness {
    harness_with(AuthConfig::default())
}

fn meta() -> RequestMetadata {
    RequestMetadata::new("203.0.113.7".parse().unwrap(), "lifecycle-test/1.0")
}

async fn refresh_node(auth: &Authenticator, presented: &str) -> RefreshToken {
    let hash = CredentialHash::from_hex(presented).unwrap();
    auth.registry()
        .get_refresh_token(RefreshTokenLookup::Hash(hash))
        .await
        .unwrap()
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_binds_session_identity_and_jti() {
    let h = harness();
    let client = h.auth.resolve_client(h.client.id).await.unwrap();

    let (session, pair) = h
        .auth
        .login_with_password(&client, "alice", "hunter2", &meta())
        .await
        .unwrap();

    assert_eq!(session.identity.id, h.user_id);
    assert_eq!(session.client_id, client.id);
    assert_eq!(session.user_agent, "lifecycle-test/1.0");

    let claims = h.auth.validate_access_token(&pair.access_token).await.unwrap();
    assert_eq!(claims.jti, session.id);
    assert_eq!(claims.uid, h.user_id);
    assert_eq!(claims.roles, vec!["admin".to_string()]);
    assert_eq!(claims.groups, vec!["ops".to_string()]);

    // Findable under every index.
    let registry = h.auth.registry();
    let refresh = CredentialHash::from_hex(pair.refresh_token.as_deref().unwrap()).unwrap();
    for lookup in [
        SessionLookup::Id(session.id),
        SessionLookup::AccessToken(session.id),
        SessionLookup::RefreshTokenHash(refresh),
    ] {
        assert_eq!(registry.get_session(lookup).await.unwrap().id, session.id);
    }
    assert_eq!(h.auth.list_sessions(h.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_public_client_never_gets_refresh_token() {
    let h = harness();
    let public = Client::public(Uuid::new_v4());
    let identity = h
        .auth
        .authenticate_user_by_password("alice", "hunter2", &meta())
        .await
        .unwrap();

    let (session, pair) = h
        .auth
        .create_session_with_refresh_token("corr-1", Uuid::new_v4(), &public, identity, &meta())
        .await
        .unwrap();
    assert!(pair.refresh_token.is_none());
    assert!(session.refresh_token_id.is_none());
}

#[tokio::test]
async fn test_nil_trace_id_registers_nothing() {
    let h = harness();
    let identity = h
        .auth
        .authenticate_user_by_password("alice", "hunter2", &meta())
        .await
        .unwrap();

    let err = h
        .auth
        .create_session_with_refresh_token("corr-2", Uuid::nil(), &h.client, identity, &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidTraceId));
    assert!(h.auth.list_sessions(h.user_id).await.unwrap().is_empty());
}

// ============================================================================
// Rotation
// ============================================================================

#[tokio::test]
async fn test_rotation_links_chain() {
    let h = harness();
    let (_, p1) = h
        .auth
        .login_with_password(&h.client, "alice", "hunter2", &meta())
        .await
        .unwrap();
    let r1 = p1.refresh_token.clone().unwrap();

    let (s2, p2) = h
        .auth
        .authenticate_user_by_refresh_token(&h.client, &r1, &meta())
        .await
        .unwrap();
    let r2 = p2.refresh_token.clone().unwrap();
    assert_ne!(p1, p2);

    let t0 = refresh_node(&h.auth, &r1).await;
    let t1 = refresh_node(&h.auth, &r2).await;
    assert!(matches!(t0.is_active(), Err(AuthError::RefreshTokenRotated)));
    assert!(t1.is_active().is_ok());
    assert_eq!(t1.parent_id, Some(t0.id));
    assert_eq!(t0.rotated_id, Some(t1.id));
    assert_eq!(t1.trace_id, t0.trace_id);
    assert_eq!(s2.refresh_token_id, Some(t1.id));
    assert_eq!(t1.last_session_id, s2.id);

    // The superseded session stays registered.
    assert_eq!(h.auth.list_sessions(h.user_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_rotation_is_single_use() {
    let h = harness();
    let (_, p1) = h
        .auth
        .login_with_password(&h.client, "alice", "hunter2", &meta())
        .await
        .unwrap();
    let r1 = p1.refresh_token.unwrap();

    h.auth
        .authenticate_user_by_refresh_token(&h.client, &r1, &meta())
        .await
        .unwrap();
    let err = h
        .auth
        .authenticate_user_by_refresh_token(&h.client, &r1, &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::RefreshTokenRotated));
    assert!(err.is_token_reuse());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rotation_exactly_one_wins() {
    let h = harness();
    let (_, p1) = h
        .auth
        .login_with_password(&h.client, "alice", "hunter2", &meta())
        .await
        .unwrap();
    let r1 = p1.refresh_token.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let auth = Arc::clone(&h.auth);
            let client = h.client;
            let r1 = r1.clone();
            tokio::spawn(async move {
                auth.authenticate_user_by_refresh_token(&client, &r1, &meta())
                    .await
            })
        })
        .collect();

    let mut wins = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => wins += 1,
            Err(e) => assert!(e.is_token_reuse(), "unexpected error: {e}"),
        }
    }
    assert_eq!(wins, 1);
    // One login session plus exactly one rotated session.
    assert_eq!(h.auth.list_sessions(h.user_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_suspended_user_cannot_redeem() {
    let h = harness();
    let (_, p1) = h
        .auth
        .login_with_password(&h.client, "alice", "hunter2", &meta())
        .await
        .unwrap();
    let r1 = p1.refresh_token.unwrap();

    h.directory.suspend("alice");
    let err = h
        .auth
        .authenticate_user_by_refresh_token(&h.client, &r1, &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserSuspended));

    // Nothing new was registered and the node was not consumed.
    assert_eq!(h.auth.list_sessions(h.user_id).await.unwrap().len(), 1);
    assert!(refresh_node(&h.auth, &r1).await.is_active().is_ok());
}

#[tokio::test]
async fn test_reuse_cascade_when_configured() {
    let h = harness_with(AuthConfig {
        revoke_chain_on_reuse: true,
        ..AuthConfig::default()
    });
    let (_, p1) = h
        .auth
        .login_with_password(&h.client, "alice", "hunter2", &meta())
        .await
        .unwrap();
    let r1 = p1.refresh_token.unwrap();
    let (_, p2) = h
        .auth
        .authenticate_user_by_refresh_token(&h.client, &r1, &meta())
        .await
        .unwrap();
    let r2 = p2.refresh_token.unwrap();

    assert!(matches!(
        h.auth
            .authenticate_user_by_refresh_token(&h.client, &r1, &meta())
            .await,
        Err(AuthError::RefreshTokenRotated)
    ));
    assert!(refresh_node(&h.auth, &r2).await.is_revoked());
}

// ============================================================================
// Revocation
// ============================================================================

#[tokio::test]
async fn test_revoke_session_revokes_refresh_token_and_jti() {
    let h = harness();
    let (session, pair) = h
        .auth
        .login_with_password(&h.client, "alice", "hunter2", &meta())
        .await
        .unwrap();
    let refresh = pair.refresh_token.unwrap();

    let revoked = h
        .auth
        .revoke_session(session.id, RevocationReason::Client, Some("device lost".into()))
        .await
        .unwrap();
    assert_eq!(revoked.revocation_reason(), Some(RevocationReason::Client));

    assert!(matches!(
        refresh_node(&h.auth, &refresh).await.is_active(),
        Err(AuthError::RefreshTokenRevoked)
    ));
    assert!(h.auth.registry().is_revoked(session.id).await.unwrap());
    assert!(matches!(
        h.auth.validate_access_token(&pair.access_token).await,
        Err(AuthError::AccessTokenRevoked)
    ));
    assert!(matches!(
        h.auth
            .authenticate_user_by_refresh_token(&h.client, &refresh, &meta())
            .await,
        Err(AuthError::RefreshTokenRevoked)
    ));

    assert!(matches!(
        h.auth
            .revoke_session(session.id, RevocationReason::Logout, None)
            .await,
        Err(AuthError::SessionAlreadyRevoked)
    ));
}

#[tokio::test]
async fn test_full_rotation_scenario() {
    let h = harness();
    let (_, p1) = h
        .auth
        .login_with_password(&h.client, "alice", "hunter2", &meta())
        .await
        .unwrap();
    let r1 = p1.refresh_token.clone().unwrap();

    let (_, p2) = h
        .auth
        .authenticate_user_by_refresh_token(&h.client, &r1, &meta())
        .await
        .unwrap();
    assert_ne!(p1, p2);
    let root = refresh_node(&h.auth, &r1).await;
    assert!(root.is_active().is_err());

    // Explicitly revoke the chain root.
    let root = h.auth.registry().revoke_refresh_token(root.id).await.unwrap();
    assert!(root.is_revoked() && root.is_rotated());

    // Rotated is reported before Revoked.
    let err = h
        .auth
        .authenticate_user_by_refresh_token(&h.client, &r1, &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::RefreshTokenRotated));
    assert!(err.is_token_reuse());

    // The already-issued successor is unaffected.
    let (_, p3) = h
        .auth
        .authenticate_user_by_refresh_token(&h.client, p2.refresh_token.as_deref().unwrap(), &meta())
        .await
        .unwrap();
    assert!(p3.has_refresh_token());
}

// ============================================================================
// Authorization codes
// ============================================================================

#[tokio::test]
async fn test_pkce_exchange_round() {
    let h = harness();
    let verifier = PkceVerifier::generate();
    let challenge = PkceChallenge::from_verifier(&verifier);
    let pair = TokenPair::new("access".into(), Some("refresh".into()));

    let code = h
        .auth
        .create_authorization_code(challenge.as_str(), "S256", pair.clone())
        .await
        .unwrap();
    let exchanged = h
        .auth
        .exchange_authorization_code(&code, verifier.as_str())
        .await
        .unwrap();
    assert_eq!(exchanged, pair);

    assert!(matches!(
        h.auth
            .exchange_authorization_code(&code, verifier.as_str())
            .await,
        Err(AuthError::AuthorizationCodeNotFound)
    ));
}

#[tokio::test]
async fn test_pkce_failure_burns_code() {
    let h = harness();
    let verifier = PkceVerifier::generate();
    let challenge = PkceChallenge::from_verifier(&verifier);

    assert!(matches!(
        h.auth.exchange_authorization_code("", "anything").await,
        Err(AuthError::AuthorizationCodeNotFound)
    ));

    let code = h
        .auth
        .create_authorization_code(
            challenge.as_str(),
            "s256",
            TokenPair::new("access".into(), None),
        )
        .await
        .unwrap();
    assert!(matches!(
        h.auth
            .exchange_authorization_code(&code, "wrong-verifier")
            .await,
        Err(AuthError::CodeChallengeVerificationFailed)
    ));
    assert!(matches!(
        h.auth
            .exchange_authorization_code(&code, verifier.as_str())
            .await,
        Err(AuthError::AuthorizationCodeNotFound)
    ));
}

#[tokio::test]
async fn test_plain_challenge() {
    let h = harness();
    let code = h
        .auth
        .create_authorization_code("plain-verifier", "plain", TokenPair::new("a".into(), None))
        .await
        .unwrap();
    assert!(
        h.auth
            .exchange_authorization_code(&code, "plain-verifier")
            .await
            .is_ok()
    );
}

// ============================================================================
// Reaper
// ============================================================================

#[tokio::test]
async fn test_reaper_sweeps_expired_state() {
    let h = harness();
    let (session, pair) = h
        .auth
        .login_with_password(&h.client, "alice", "hunter2", &meta())
        .await
        .unwrap();
    h.auth
        .revoke_session(session.id, RevocationReason::System, None)
        .await
        .unwrap();

    let reaper = Reaper::new(Arc::clone(h.auth.registry()), h.auth.config().session_grace());

    // Nothing has expired yet.
    let stats = reaper.run_once(OffsetDateTime::now_utc()).await.unwrap();
    assert_eq!(stats.total(), 0);

    // Past every lifetime plus the grace window.
    let later = OffsetDateTime::now_utc() + time::Duration::days(31);
    let stats = reaper.run_once(later).await.unwrap();
    assert_eq!(stats.revoked_access_tokens, 1);
    assert_eq!(stats.sessions, 1);
    assert_eq!(stats.refresh_tokens, 1);

    assert!(h.auth.list_sessions(h.user_id).await.unwrap().is_empty());
    assert!(!h.auth.registry().is_revoked(session.id).await.unwrap());
    let hash = CredentialHash::from_hex(pair.refresh_token.as_deref().unwrap()).unwrap();
    assert!(matches!(
        h.auth
            .registry()
            .get_refresh_token(RefreshTokenLookup::Hash(hash))
            .await,
        Err(AuthError::RefreshTokenNotFound)
    ));
}

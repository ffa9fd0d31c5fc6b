//! The authentication orchestrator.
//!
//! [`Authenticator`] composes the registry, the JWT service, the
//! authorization-code cache and the external providers into the public
//! operations: password login, refresh-token rotation, session revocation,
//! access-token issuance and validation, and the PKCE code exchange.
//!
//! Every operation either registers its full result or nothing: tokens are
//! minted before the registry is touched, and the registry commits each
//! session (with its refresh-token node) in one call.
//!
//! # Usage
//!
//! ```ignore
//! use gatekeep_auth::{AuthConfig, Authenticator};
//!
//! let auth = Authenticator::from_config(config, registry, codes, providers)?;
//! let (session, pair) = auth.login_with_password(&client, "alice", "secret", &meta).await?;
//! let (next, rotated) = auth
//!     .authenticate_user_by_refresh_token(&client, pair.refresh_token.as_deref().unwrap_or_default(), &meta)
//!     .await?;
//! ```

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::oauth::pkce::PkceChallenge;
use crate::providers::Providers;
use crate::reaper::{Reaper, ReaperHandle};
use crate::storage::{
    AuthorizationCodeCache, AuthorizationCodeEntry, RefreshTokenLookup, Registry,
};
use crate::token::jwt::{AccessTokenClaims, Jwks, JwtService};
use crate::types::{
    Client, CredentialHash, Identity, RefreshToken, RequestMetadata, RevocationReason, Session,
    SessionOrigin, TokenPair,
};

/// Number of random bytes in an authorization code.
const AUTHORIZATION_CODE_BYTES: usize = 32;

/// Authentication and token-lifecycle engine.
pub struct Authenticator {
    config: AuthConfig,
    jwt: JwtService,
    registry: Arc<dyn Registry>,
    codes: Arc<dyn AuthorizationCodeCache>,
    providers: Providers,
}

impl Authenticator {
    /// Creates an authenticator around an existing JWT service.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the configuration is invalid.
    pub fn new(
        config: AuthConfig,
        jwt: JwtService,
        registry: Arc<dyn Registry>,
        codes: Arc<dyn AuthorizationCodeCache>,
        providers: Providers,
    ) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::internal(e.to_string()))?;
        Ok(Self {
            config,
            jwt,
            registry,
            codes,
            providers,
        })
    }

    /// Creates an authenticator whose signing key comes from
    /// `config.signing`, generating an ephemeral key if none is configured.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the configuration or the key material is invalid.
    pub fn from_config(
        config: AuthConfig,
        registry: Arc<dyn Registry>,
        codes: Arc<dyn AuthorizationCodeCache>,
        providers: Providers,
    ) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::internal(e.to_string()))?;
        let key_pair = config.signing.key_pair()?;
        if config.signing.private_key_pem.is_none() && config.signing.public_key_pem.is_none() {
            info!(kid = %key_pair.kid, "Generated ephemeral signing key");
        }
        let jwt = JwtService::new(key_pair, config.issuer.clone());
        Self::new(config, jwt, registry, codes, providers)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Returns the registry backend.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Public keys for verifying issued access tokens.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        self.jwt.jwks()
    }

    /// Starts the background reaper for this authenticator's registry and
    /// code cache, using the configured interval and grace period.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if a reaper is already running for the registry.
    pub fn start_reaper(&self) -> AuthResult<ReaperHandle> {
        Reaper::new(Arc::clone(&self.registry), self.config.session_grace())
            .with_code_cache(Arc::clone(&self.codes))
            .start(self.config.reaper_interval)
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    /// Resolves a client through the client provider.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClientId` for a nil id, `ClientNotFound` if unknown.
    pub async fn resolve_client(&self, client_id: Uuid) -> AuthResult<Client> {
        if client_id.is_nil() {
            return Err(AuthError::InvalidClientId);
        }
        self.providers.clients.resolve(client_id).await
    }

    /// Verifies a username and password.
    ///
    /// Suspension is checked before the password is compared.
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailed` for an empty username or password, or a
    ///   password mismatch
    /// - `UserNotFound` if the user does not exist
    /// - `UserSuspended` if the user is suspended
    pub async fn authenticate_user_by_password(
        &self,
        username: &str,
        raw_password: &str,
        meta: &RequestMetadata,
    ) -> AuthResult<Identity> {
        if username.is_empty() {
            return Err(AuthError::AuthenticationFailed);
        }

        let user = self.providers.users.resolve(username).await?;
        if user.is_suspended_at(OffsetDateTime::now_utc()) {
            warn!(user_id = %user.id, ip = %meta.ip, "Login attempt by suspended user");
            return Err(AuthError::UserSuspended);
        }

        if raw_password.is_empty() || !self.providers.passwords.verify(user.id, raw_password).await? {
            debug!(user_id = %user.id, ip = %meta.ip, "Password mismatch");
            return Err(AuthError::AuthenticationFailed);
        }

        Identity::user(user.id)
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Issues an access token and, for confidential clients, the root of a
    /// new refresh-token chain, and registers the session.
    ///
    /// # Arguments
    ///
    /// * `correlation_id` - Caller-supplied id carried into the logs
    /// * `trace_id` - Id of the new refresh-token chain
    /// * `client` - Client the session is issued to
    /// * `identity` - Who the session belongs to
    /// * `meta` - Request metadata recorded on the session
    ///
    /// # Errors
    ///
    /// - `InvalidClientId` / `InvalidIdentity` for malformed input
    /// - `InvalidTraceId` / `InvalidExpiration` from the chain root
    /// - role-provider or signing errors; nothing is registered on failure
    pub async fn create_session_with_refresh_token(
        &self,
        correlation_id: &str,
        trace_id: Uuid,
        client: &Client,
        identity: Identity,
        meta: &RequestMetadata,
    ) -> AuthResult<(Session, TokenPair)> {
        client.validate()?;
        identity.validate()?;
        if identity.is_none() {
            return Err(AuthError::invalid_identity("session requires an identity"));
        }

        let now = OffsetDateTime::now_utc();
        let session_id = Uuid::new_v4();
        let expire_at = expiry_after(now, self.config.access_token_ttl())?;
        let refresh_expire_at = expiry_after(now, self.config.refresh_token_ttl())?;
        let access_token = self
            .mint_access_token(session_id, &identity, now, expire_at)
            .await?;

        let mut session = Session::new(
            session_id,
            client.id,
            identity,
            meta,
            SessionOrigin::Credentials,
            expire_at,
        );
        let refresh_token = if client.confidential {
            let root = RefreshToken::new_root(
                trace_id,
                session_id,
                Some(client),
                identity,
                refresh_expire_at,
            )?;
            session = session.with_refresh_token(root.id);
            Some(root)
        } else {
            None
        };

        let pair = TokenPair::new(access_token, refresh_token.as_ref().map(|t| t.hash.to_hex()));
        self.registry
            .put_session(session.clone(), refresh_token)
            .await?;

        info!(
            correlation_id = %correlation_id,
            session_id = %session.id,
            client_id = %client.id,
            identity = %identity,
            refresh = pair.refresh_token.is_some(),
            "Session created"
        );
        Ok((session, pair))
    }

    /// Redeems a refresh token: rotates its chain node and issues a new
    /// session and token pair.
    ///
    /// The previous session is left in place; its refresh token is now
    /// rotated.
    ///
    /// # Errors
    ///
    /// - `InvalidRefreshToken` if the credential is malformed
    /// - `RefreshTokenNotFound` if it is unknown
    /// - `InvalidClient` if it was issued to a different client
    /// - `RefreshTokenExpired` / `RefreshTokenRotated` / `RefreshTokenRevoked`
    ///   if the node is no longer active
    /// - `UserSuspended` if the user was suspended since the token was issued
    pub async fn authenticate_user_by_refresh_token(
        &self,
        client: &Client,
        presented: &str,
        meta: &RequestMetadata,
    ) -> AuthResult<(Session, TokenPair)> {
        let hash = CredentialHash::from_hex(presented)?;
        let current = self
            .registry
            .get_refresh_token(RefreshTokenLookup::Hash(hash))
            .await?;

        if current.client_id != client.id {
            warn!(
                trace_id = %current.trace_id,
                token_id = %current.id,
                client_id = %client.id,
                "Refresh token presented by a different client"
            );
            return Err(AuthError::invalid_client(
                "refresh token was issued to another client",
            ));
        }

        if let Err(err) = current.is_active() {
            return Err(self.on_inactive_refresh_token(&current, err).await);
        }

        let identity = current.identity;
        if identity.is_user() && self.providers.users.is_suspended(identity.id).await? {
            warn!(
                trace_id = %current.trace_id,
                user_id = %identity.id,
                "Refresh token redeemed by suspended user"
            );
            return Err(AuthError::UserSuspended);
        }

        let now = OffsetDateTime::now_utc();
        let session_id = Uuid::new_v4();
        let expire_at = expiry_after(now, self.config.access_token_ttl())?;
        let refresh_expire_at = expiry_after(now, self.config.refresh_token_ttl())?;
        let access_token = self
            .mint_access_token(session_id, &identity, now, expire_at)
            .await?;

        let successor = current.successor(session_id, refresh_expire_at);
        let session = Session::new(
            session_id,
            current.client_id,
            identity,
            meta,
            SessionOrigin::RefreshToken,
            expire_at,
        )
        .with_refresh_token(successor.id);
        let pair = TokenPair::new(access_token, Some(successor.hash.to_hex()));
        let successor_id = successor.id;

        if let Err(err) = self
            .registry
            .rotate_refresh_token(current.id, successor, session.clone())
            .await
        {
            // Lost a race against another redemption of the same node.
            if err.is_token_reuse() {
                return Err(self.on_inactive_refresh_token(&current, err).await);
            }
            return Err(err);
        }

        info!(
            trace_id = %current.trace_id,
            parent_id = %current.id,
            token_id = %successor_id,
            session_id = %session.id,
            "Refresh token rotated"
        );
        Ok((session, pair))
    }

    /// Logs an inactive refresh token and applies the reuse policy.
    /// Returns the error to hand back to the caller.
    async fn on_inactive_refresh_token(&self, token: &RefreshToken, err: AuthError) -> AuthError {
        if !err.is_token_reuse() {
            debug!(trace_id = %token.trace_id, token_id = %token.id, reason = %err, "Refresh token inactive");
            return err;
        }

        warn!(
            trace_id = %token.trace_id,
            token_id = %token.id,
            reason = %err,
            "Refresh token reuse detected"
        );
        if matches!(err, AuthError::RefreshTokenRotated) && self.config.revoke_chain_on_reuse {
            match self.registry.revoke_refresh_chain(token.trace_id).await {
                Ok(revoked) => {
                    warn!(trace_id = %token.trace_id, revoked, "Revoked refresh token chain");
                }
                Err(e) => return e,
            }
        }
        err
    }

    /// Revokes a session, its access token and its refresh-token node.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or `SessionAlreadyRevoked`.
    pub async fn revoke_session(
        &self,
        session_id: Uuid,
        reason: RevocationReason,
        note: Option<String>,
    ) -> AuthResult<Session> {
        let session = self
            .registry
            .revoke_session(session_id, reason, note)
            .await?;
        info!(session_id = %session.id, reason = %reason, "Session revoked");
        Ok(session)
    }

    /// Revokes a session for logout and removes it from the registry. The
    /// access token stays blacklisted until it would have expired.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or `SessionAlreadyRevoked`.
    pub async fn logout(&self, session_id: Uuid) -> AuthResult<()> {
        self.revoke_session(session_id, RevocationReason::Logout, None)
            .await?;
        self.registry.delete_session(session_id).await?;
        Ok(())
    }

    /// Lists the sessions of one identity.
    ///
    /// # Errors
    ///
    /// Returns the registry's error.
    pub async fn list_sessions(&self, identity_id: Uuid) -> AuthResult<Vec<Session>> {
        self.registry.list_sessions(identity_id).await
    }

    // ------------------------------------------------------------------------
    // Access tokens
    // ------------------------------------------------------------------------

    /// Signs an access token for `identity` with the given JTI and expiry.
    ///
    /// # Errors
    ///
    /// Returns role-provider errors, `NilPrivateKey` for a verify-only key,
    /// or `Internal` if signing fails.
    pub async fn generate_access_token(
        &self,
        jti: Uuid,
        identity: &Identity,
        expire_at: OffsetDateTime,
    ) -> AuthResult<String> {
        self.mint_access_token(jti, identity, OffsetDateTime::now_utc(), expire_at)
            .await
    }

    async fn mint_access_token(
        &self,
        jti: Uuid,
        identity: &Identity,
        issued_at: OffsetDateTime,
        expire_at: OffsetDateTime,
    ) -> AuthResult<String> {
        let (roles, groups) = self
            .providers
            .roles
            .roles_and_groups_for(identity.id)
            .await?;
        let claims = AccessTokenClaims::new(self.jwt.issuer(), jti, identity, issued_at, expire_at)
            .with_roles_and_groups(roles, groups);
        Ok(self.jwt.encode(&claims)?)
    }

    /// Verifies an access token's signature, algorithm, issuer and expiry.
    ///
    /// Does not consult the blacklist; see
    /// [`validate_access_token`](Self::validate_access_token).
    ///
    /// # Errors
    ///
    /// Returns `InvalidAccessToken` if verification fails.
    pub fn claims_from_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        Ok(self.jwt.decode::<AccessTokenClaims>(token)?.claims)
    }

    /// Verifies an access token and rejects it if its JTI is blacklisted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAccessToken` or `AccessTokenRevoked`.
    pub async fn validate_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let claims = self.claims_from_token(token)?;
        if self.registry.is_revoked(claims.jti).await? {
            debug!(jti = %claims.jti, "Access token revoked");
            return Err(AuthError::AccessTokenRevoked);
        }
        Ok(claims)
    }

    // ------------------------------------------------------------------------
    // Authorization codes
    // ------------------------------------------------------------------------

    /// Binds a token pair to a new one-time code protected by a PKCE
    /// challenge.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCodeChallenge` for an empty challenge or method, or
    /// an unsupported method.
    pub async fn create_authorization_code(
        &self,
        challenge: &str,
        method: &str,
        token_pair: TokenPair,
    ) -> AuthResult<String> {
        let challenge = PkceChallenge::new(challenge, method)?;

        let mut bytes = [0u8; AUTHORIZATION_CODE_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let code = URL_SAFE_NO_PAD.encode(bytes);

        self.codes
            .put(
                code.clone(),
                AuthorizationCodeEntry {
                    challenge,
                    token_pair,
                },
                self.config.authorization_code_lifetime,
            )
            .await?;
        debug!("Authorization code issued");
        Ok(code)
    }

    /// Redeems a one-time code. The code is consumed whether or not the
    /// verifier matches.
    ///
    /// # Errors
    ///
    /// - `AuthorizationCodeNotFound` if the code is empty, unknown, expired
    ///   or already used
    /// - `CodeChallengeVerificationFailed` if the verifier does not match
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        verifier: &str,
    ) -> AuthResult<TokenPair> {
        if code.is_empty() {
            return Err(AuthError::AuthorizationCodeNotFound);
        }

        let entry = self.codes.take(code).await?;
        if let Err(e) = entry.challenge.verify(verifier) {
            warn!(method = %entry.challenge.method(), "PKCE verification failed, code discarded");
            return Err(e.into());
        }
        Ok(entry.token_pair)
    }

    // ------------------------------------------------------------------------
    // Convenience
    // ------------------------------------------------------------------------

    /// Verifies a password and opens a session under a fresh trace id.
    ///
    /// # Errors
    ///
    /// See [`authenticate_user_by_password`](Self::authenticate_user_by_password)
    /// and [`create_session_with_refresh_token`](Self::create_session_with_refresh_token).
    pub async fn login_with_password(
        &self,
        client: &Client,
        username: &str,
        raw_password: &str,
        meta: &RequestMetadata,
    ) -> AuthResult<(Session, TokenPair)> {
        let identity = self
            .authenticate_user_by_password(username, raw_password, meta)
            .await?;
        let trace_id = Uuid::new_v4();
        self.create_session_with_refresh_token(&trace_id.to_string(), trace_id, client, identity, meta)
            .await
    }
}

fn expiry_after(now: OffsetDateTime, ttl: time::Duration) -> AuthResult<OffsetDateTime> {
    now.checked_add(ttl)
        .ok_or_else(|| AuthError::invalid_expiration(format!("lifetime {ttl} is out of range")))
}

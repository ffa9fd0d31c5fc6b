//! # gatekeep-auth
//!
//! Authentication and token-lifecycle engine for the Gatekeep identity
//! provider.
//!
//! This crate provides:
//! - Password authentication against pluggable user and password providers
//! - Sessions paired with short-lived RS256 access tokens
//! - Refresh-token chains with single-use rotation and reuse detection
//! - PKCE-protected one-time authorization codes
//! - An in-memory registry with a JTI blacklist and a background reaper
//!
//! ## Modules
//!
//! - [`authenticator`] - The orchestrator exposing every public operation
//! - [`config`] - Lifetimes, reuse policy and signing key configuration
//! - [`oauth`] - PKCE challenges and verifiers
//! - [`token`] - Access-token claims, signing and JWKS
//! - [`storage`] - Registry and authorization-code cache traits and backends
//! - [`reaper`] - Background eviction of expired state
//! - [`providers`] - Contracts for user, password, client and role lookup
//! - [`types`] - Sessions, refresh-token nodes, identities and clients

pub mod authenticator;
pub mod config;
pub mod error;
pub mod oauth;
pub mod providers;
pub mod reaper;
pub mod storage;
pub mod token;
pub mod types;

pub use authenticator::Authenticator;
pub use config::{AuthConfig, ConfigError, SigningConfig};
pub use error::{AuthError, ErrorKind};
pub use oauth::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};
pub use providers::{
    ClientProvider, PasswordProvider, Providers, RoleGroupProvider, UserProvider, UserRecord,
};
pub use reaper::{Reaper, ReaperHandle};
pub use storage::{
    AuthorizationCodeCache, AuthorizationCodeEntry, MemoryCodeCache, MemoryRegistry,
    RefreshTokenLookup, Registry, SessionLookup, SweepStats,
};
pub use token::{AccessTokenClaims, Jwk, Jwks, JwtError, JwtService, SigningKeyPair};
pub use types::{
    Client, CredentialHash, Identity, IdentityKind, RefreshToken, RequestMetadata, Revocation,
    RevocationReason, Session, SessionOrigin, TokenPair,
};

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

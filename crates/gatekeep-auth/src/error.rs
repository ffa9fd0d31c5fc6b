//! Authentication and token-lifecycle error types.
//!
//! Every failure the engine can report is a variant of [`AuthError`]. The
//! variants are precise so that logs and callers can tell a reused refresh
//! token apart from an expired one, while [`AuthError::public_message`] gives
//! the transport layer a generic string that leaks nothing.

use std::fmt;

use crate::oauth::pkce::PkceError;
use crate::token::jwt::JwtError;

/// Errors that can occur during authentication and token lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The identity reference is malformed (kind/id mismatch).
    #[error("Invalid identity: {message}")]
    InvalidIdentity {
        /// Description of why the identity is invalid.
        message: String,
    },

    /// The client is missing or not allowed to perform this operation.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The client identifier is nil or malformed.
    #[error("Invalid client id")]
    InvalidClientId,

    /// The client provider has no such client.
    #[error("Client not found")]
    ClientNotFound,

    /// A refresh-token chain was started without a trace id.
    #[error("Invalid trace id")]
    InvalidTraceId,

    /// An expiration timestamp is zero or already in the past.
    #[error("Invalid expiration: {message}")]
    InvalidExpiration {
        /// Description of why the expiration is invalid.
        message: String,
    },

    /// A session failed its structural validation.
    #[error("Invalid session: {message}")]
    InvalidSession {
        /// Description of the violated invariant.
        message: String,
    },

    /// A refresh token failed its structural validation or could not be parsed.
    #[error("Invalid refresh token: {message}")]
    InvalidRefreshToken {
        /// Description of the violated invariant.
        message: String,
    },

    /// No session matches the lookup.
    #[error("Session not found")]
    SessionNotFound,

    /// The session was already revoked.
    #[error("Session already revoked")]
    SessionAlreadyRevoked,

    /// No refresh token matches the presented credential.
    #[error("Refresh token not found")]
    RefreshTokenNotFound,

    /// The refresh token is past its expiration.
    #[error("Refresh token expired")]
    RefreshTokenExpired,

    /// The refresh token was already rotated into a successor.
    #[error("Refresh token already rotated")]
    RefreshTokenRotated,

    /// The refresh token was explicitly revoked.
    #[error("Refresh token revoked")]
    RefreshTokenRevoked,

    /// The identity provider has no such user.
    #[error("User not found")]
    UserNotFound,

    /// The user is currently suspended.
    #[error("User suspended")]
    UserSuspended,

    /// The supplied credentials did not match.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The access token is malformed, badly signed, or expired.
    #[error("Invalid access token: {message}")]
    InvalidAccessToken {
        /// Description of why the token was rejected.
        message: String,
    },

    /// The access token is well formed but its JTI is blacklisted.
    #[error("Access token revoked")]
    AccessTokenRevoked,

    /// The signing key has no private half.
    #[error("Private key is not set")]
    NilPrivateKey,

    /// The PKCE challenge is empty or uses an unsupported method.
    #[error("Invalid code challenge: {message}")]
    InvalidCodeChallenge {
        /// Description of why the challenge is invalid.
        message: String,
    },

    /// The authorization code is empty, unknown, expired or already used.
    #[error("Authorization code not found")]
    AuthorizationCodeNotFound,

    /// The code verifier does not match the stored challenge.
    #[error("Code challenge verification failed")]
    CodeChallengeVerificationFailed,

    /// An error occurred in a storage backend or external collaborator.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidIdentity` error.
    #[must_use]
    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidExpiration` error.
    #[must_use]
    pub fn invalid_expiration(message: impl Into<String>) -> Self {
        Self::InvalidExpiration {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidSession` error.
    #[must_use]
    pub fn invalid_session(message: impl Into<String>) -> Self {
        Self::InvalidSession {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRefreshToken` error.
    #[must_use]
    pub fn invalid_refresh_token(message: impl Into<String>) -> Self {
        Self::InvalidRefreshToken {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidAccessToken` error.
    #[must_use]
    pub fn invalid_access_token(message: impl Into<String>) -> Self {
        Self::InvalidAccessToken {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidCodeChallenge` error.
    #[must_use]
    pub fn invalid_code_challenge(message: impl Into<String>) -> Self {
        Self::InvalidCodeChallenge {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if a refresh token was presented after it stopped
    /// being usable through rotation or revocation.
    ///
    /// Callers treat this as a possible theft signal.
    #[must_use]
    pub fn is_token_reuse(&self) -> bool {
        matches!(self, Self::RefreshTokenRotated | Self::RefreshTokenRevoked)
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Internal)
    }

    /// Returns the error kind for logging/monitoring purposes.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound
            | Self::RefreshTokenNotFound
            | Self::UserNotFound
            | Self::ClientNotFound
            | Self::AuthorizationCodeNotFound => ErrorKind::NotFound,
            Self::InvalidIdentity { .. }
            | Self::InvalidClient { .. }
            | Self::InvalidClientId
            | Self::InvalidTraceId
            | Self::InvalidExpiration { .. }
            | Self::InvalidRefreshToken { .. }
            | Self::InvalidCodeChallenge { .. } => ErrorKind::InvalidInput,
            Self::SessionAlreadyRevoked
            | Self::RefreshTokenRotated
            | Self::CodeChallengeVerificationFailed => ErrorKind::StateConflict,
            Self::AuthenticationFailed
            | Self::UserSuspended
            | Self::RefreshTokenExpired
            | Self::RefreshTokenRevoked
            | Self::InvalidAccessToken { .. }
            | Self::AccessTokenRevoked => ErrorKind::Unauthorized,
            Self::InvalidSession { .. }
            | Self::NilPrivateKey
            | Self::Storage { .. }
            | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns the message safe to show at the transport boundary.
    ///
    /// Unknown user, wrong password, suspended user and any refresh-token
    /// failure all collapse into the same string.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Internal => "server error",
            ErrorKind::InvalidInput => "invalid request",
            ErrorKind::NotFound
            | ErrorKind::StateConflict
            | ErrorKind::Unauthorized => "unauthorized",
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidClient { .. } | Self::InvalidClientId | Self::ClientNotFound => {
                "invalid_client"
            }
            Self::RefreshTokenNotFound
            | Self::RefreshTokenExpired
            | Self::RefreshTokenRotated
            | Self::RefreshTokenRevoked
            | Self::AuthorizationCodeNotFound
            | Self::CodeChallengeVerificationFailed
            | Self::AuthenticationFailed
            | Self::UserNotFound
            | Self::UserSuspended => "invalid_grant",
            Self::InvalidAccessToken { .. } | Self::AccessTokenRevoked => "invalid_token",
            Self::InvalidIdentity { .. }
            | Self::InvalidTraceId
            | Self::InvalidExpiration { .. }
            | Self::InvalidRefreshToken { .. }
            | Self::InvalidCodeChallenge { .. }
            | Self::SessionNotFound
            | Self::SessionAlreadyRevoked => "invalid_request",
            Self::InvalidSession { .. }
            | Self::NilPrivateKey
            | Self::Storage { .. }
            | Self::Internal { .. } => "server_error",
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::NilPrivateKey => Self::NilPrivateKey,
            JwtError::EncodingError { message }
            | JwtError::KeyGenerationError { message }
            | JwtError::InvalidKey { message } => Self::Internal { message },
            other => Self::invalid_access_token(other.to_string()),
        }
    }
}

impl From<PkceError> for AuthError {
    fn from(err: PkceError) -> Self {
        match err {
            PkceError::VerificationFailed => Self::CodeChallengeVerificationFailed,
            other => Self::invalid_code_challenge(other.to_string()),
        }
    }
}

/// Error taxonomy shared by every [`AuthError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A user, session, refresh token or authorization code is absent.
    NotFound,
    /// Nil ids, empty credentials, malformed challenges.
    InvalidInput,
    /// Already revoked, already rotated, challenge mismatch.
    StateConflict,
    /// Authentication failed, user suspended, token inactive.
    Unauthorized,
    /// Signing failures and invariant violations.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::InvalidInput => write!(f, "invalid_input"),
            Self::StateConflict => write!(f, "state_conflict"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

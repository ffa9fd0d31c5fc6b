//! PKCE (Proof Key for Code Exchange) implementation
//!
//! Implements RFC 7636 with both the `S256` and `plain` methods. A stored
//! [`PkceChallenge`] carries its method, and [`PkceChallenge::verify`]
//! recomputes the challenge from the presented verifier and compares it in
//! constant time.
//!
//! # Example
//!
//! ```
//! use gatekeep_auth::oauth::{PkceChallenge, PkceChallengeMethod, PkceVerifier};
//!
//! // Client generates a verifier and challenge
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//! assert_eq!(challenge.method(), PkceChallengeMethod::S256);
//!
//! // Server stores the challenge, later verifies the raw verifier
//! let stored = PkceChallenge::new(challenge.as_str(), "S256").unwrap();
//! assert!(stored.verify(verifier.as_str()).is_ok());
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains invalid characters.
    #[error("Invalid verifier characters: must be URL-safe base64 ([A-Za-z0-9-._~])")]
    InvalidVerifierCharacters,

    /// Challenge string is empty.
    #[error("Code challenge is empty")]
    EmptyChallenge,

    /// Challenge method is empty.
    #[error("Code challenge method is empty")]
    EmptyMethod,

    /// S256 challenge is not valid base64url.
    #[error("Invalid challenge format: must be valid base64url")]
    InvalidChallengeFormat,

    /// Unsupported challenge method.
    #[error("Unsupported challenge method: {0}")]
    UnsupportedMethod(String),

    /// PKCE verification failed (verifier doesn't match challenge).
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Create an `InvalidVerifierLength` error.
    #[must_use]
    pub fn invalid_verifier_length(len: usize) -> Self {
        Self::InvalidVerifierLength(len)
    }

    /// Create an `UnsupportedMethod` error.
    #[must_use]
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod(method.into())
    }

    /// Returns `true` if this is a verifier validation error.
    #[must_use]
    pub fn is_verifier_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidVerifierLength(_) | Self::InvalidVerifierCharacters
        )
    }

    /// Returns `true` if this is a challenge validation error.
    #[must_use]
    pub fn is_challenge_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyChallenge
                | Self::EmptyMethod
                | Self::InvalidChallengeFormat
                | Self::UnsupportedMethod(_)
        )
    }

    /// Returns `true` if this is a verification failure.
    #[must_use]
    pub fn is_verification_error(&self) -> bool {
        matches!(self, Self::VerificationFailed)
    }
}

// =============================================================================
// PKCE Challenge Method
// =============================================================================

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PkceChallengeMethod {
    /// `BASE64URL(SHA256(verifier))`.
    #[default]
    #[serde(rename = "S256", alias = "s256")]
    S256,
    /// The challenge is the verifier itself.
    #[serde(rename = "plain")]
    Plain,
}

impl PkceChallengeMethod {
    /// Parse challenge method from string.
    ///
    /// Method names are matched case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `EmptyMethod` for an empty string and `UnsupportedMethod` for
    /// anything other than `S256` or `plain`.
    pub fn parse(method: &str) -> Result<Self, PkceError> {
        if method.is_empty() {
            return Err(PkceError::EmptyMethod);
        }
        if method.eq_ignore_ascii_case("s256") {
            Ok(Self::S256)
        } else if method.eq_ignore_ascii_case("plain") {
            Ok(Self::Plain)
        } else {
            Err(PkceError::unsupported_method(method))
        }
    }

    /// Get the method as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// PKCE Verifier
// =============================================================================

/// PKCE code verifier.
///
/// A high-entropy random string over `[A-Za-z0-9-._~]`, 43 to 128
/// characters long (RFC 7636 §4.1). Used by clients and tests; the server
/// side verifies whatever string it is handed.
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Create a new verifier from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Length is not between 43 and 128 characters
    /// - Contains characters other than `[A-Za-z0-9-._~]`
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();
        if !(43..=128).contains(&len) {
            return Err(PkceError::invalid_verifier_length(len));
        }
        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }
        Ok(Self(verifier))
    }

    /// Generate a cryptographically random verifier.
    ///
    /// Generates 32 random bytes and encodes them as base64url (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let bytes: [u8; 32] = rng.r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Get the verifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PkceVerifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// PKCE Challenge
// =============================================================================

/// A stored PKCE challenge and the method used to produce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    challenge: String,
    method: PkceChallengeMethod,
}

impl PkceChallenge {
    /// Create a challenge received from a client.
    ///
    /// # Errors
    ///
    /// - `EmptyChallenge` / `EmptyMethod` for empty inputs
    /// - `UnsupportedMethod` for an unknown method
    /// - `InvalidChallengeFormat` if an S256 challenge is not base64url
    pub fn new(challenge: impl Into<String>, method: &str) -> Result<Self, PkceError> {
        let challenge = challenge.into();
        if challenge.is_empty() {
            return Err(PkceError::EmptyChallenge);
        }
        let method = PkceChallengeMethod::parse(method)?;
        if method == PkceChallengeMethod::S256 && URL_SAFE_NO_PAD.decode(&challenge).is_err() {
            return Err(PkceError::InvalidChallengeFormat);
        }
        Ok(Self { challenge, method })
    }

    /// Create an S256 challenge from a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        Self {
            challenge: s256(verifier.as_str()),
            method: PkceChallengeMethod::S256,
        }
    }

    /// Verify that a raw verifier matches this challenge.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::VerificationFailed` if the verifier doesn't match.
    pub fn verify(&self, verifier: &str) -> Result<(), PkceError> {
        let computed = match self.method {
            PkceChallengeMethod::S256 => s256(verifier),
            PkceChallengeMethod::Plain => verifier.to_owned(),
        };
        if bool::from(computed.as_bytes().ct_eq(self.challenge.as_bytes())) {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    /// Get the challenge as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.challenge
    }

    /// Get the challenge method.
    #[must_use]
    pub fn method(&self) -> PkceChallengeMethod {
        self.method
    }
}

/// `BASE64URL(SHA256(ASCII(verifier)))`.
fn s256(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

// =============================================================================
// Tests
// =============================================================================

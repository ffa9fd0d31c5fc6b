//! JWT access token generation and validation.
//!
//! Access tokens are RS256-signed JWTs. The algorithm is pinned on both
//! sides: [`JwtService::decode`] builds its `Validation` for RS256 only, so a
//! token signed with any other algorithm (including `none` or an HMAC
//! confusion attempt) is rejected.
//!
//! ## Example
//!
//! ```ignore
//! use gatekeep_auth::token::jwt::{JwtService, SigningKeyPair};
//!
//! let key_pair = SigningKeyPair::generate()?;
//! let jwt_service = JwtService::new(key_pair, "https://id.example.com");
//!
//! let token = jwt_service.encode(&claims)?;
//! let token_data = jwt_service.decode::<AccessTokenClaims>(&token)?;
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::identity::{Identity, IdentityKind};

/// The only algorithm this service signs with or accepts.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

const RSA_KEY_BITS: usize = 2048;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// The key pair has no private half.
    #[error("Private key is not set")]
    NilPrivateKey,

    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a validation error (expired, invalid signature, etc.).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired
                | Self::InvalidSignature
                | Self::InvalidClaims { .. }
                | Self::DecodingError { .. }
        )
    }

    /// Returns `true` if this is a key-related error.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::NilPrivateKey | Self::KeyGenerationError { .. } | Self::InvalidKey { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::decoding_error(err.to_string()),
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                Self::invalid_key(err.to_string())
            }
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

// ============================================================================
// Token Claims
// ============================================================================

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    /// Issuer.
    pub iss: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// JWT ID, equal to the session id.
    pub jti: Uuid,

    /// Identity id.
    pub uid: Uuid,

    /// Identity kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<IdentityKind>,

    /// Role keys from the role/group provider.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Group keys from the role/group provider.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl AccessTokenClaims {
    /// Creates claims for `identity`, valid from `issued_at` to `expire_at`.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        jti: Uuid,
        identity: &Identity,
        issued_at: OffsetDateTime,
        expire_at: OffsetDateTime,
    ) -> Self {
        Self {
            iss: issuer.into(),
            iat: issued_at.unix_timestamp(),
            exp: expire_at.unix_timestamp(),
            jti,
            uid: identity.id,
            kind: identity.kind,
            roles: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Sets the role and group keys.
    #[must_use]
    pub fn with_roles_and_groups(mut self, roles: Vec<String>, groups: Vec<String>) -> Self {
        self.roles = roles;
        self.groups = groups;
        self
    }

    /// Rebuilds the identity the token was issued for.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.uid,
            kind: self.kind,
        }
    }
}

// ============================================================================
// JWKS Types
// ============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

/// JSON Web Key (RSA public key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, always "RSA".
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use ("sig" for signing).
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url encoded).
    pub n: String,

    /// RSA exponent (base64url encoded).
    pub e: String,
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// An RSA key pair for RS256 signing.
///
/// A verify-only pair (see [`SigningKeyPair::from_public_pem`]) can decode
/// tokens but fails [`encoding_key`](Self::encoding_key) with
/// [`JwtError::NilPrivateKey`].
#[derive(Clone)]
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    n: Vec<u8>,
    e: Vec<u8>,

    /// When the key was loaded or created.
    pub created_at: OffsetDateTime,
}

impl SigningKeyPair {
    /// Generates a new ephemeral RSA-2048 key pair.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate() -> Result<Self, JwtError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Self::from_pem(Uuid::new_v4().to_string(), &private_pem, &public_pem)
    }

    /// Loads a key pair from PEM strings.
    ///
    /// # Arguments
    /// * `kid` - Key ID
    /// * `private_pem` - PEM-encoded RSA private key (PKCS#1 or PKCS#8)
    /// * `public_pem` - PEM-encoded RSA public key (SPKI)
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid.
    pub fn from_pem(
        kid: impl Into<String>,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, JwtError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let mut pair = Self::from_public_pem(kid, public_pem)?;
        pair.encoding_key = Some(encoding_key);
        Ok(pair)
    }

    /// Loads a verify-only key from a PEM public key.
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid.
    pub fn from_public_pem(kid: impl Into<String>, public_pem: &str) -> Result<Self, JwtError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let public_key = RsaPublicKey::from_public_key_pem(public_pem)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid: kid.into(),
            encoding_key: None,
            decoding_key,
            n: public_key.n().to_bytes_be(),
            e: public_key.e().to_bytes_be(),
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Returns the private signing key.
    ///
    /// # Errors
    /// Returns `NilPrivateKey` for a verify-only pair.
    pub fn encoding_key(&self) -> Result<&EncodingKey, JwtError> {
        self.encoding_key.as_ref().ok_or(JwtError::NilPrivateKey)
    }

    /// Returns the public verification key.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Returns `true` if this pair can sign.
    #[must_use]
    pub fn can_sign(&self) -> bool {
        self.encoding_key.is_some()
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: self.kid.clone(),
            use_: "sig".to_string(),
            alg: "RS256".to_string(),
            n: URL_SAFE_NO_PAD.encode(&self.n),
            e: URL_SAFE_NO_PAD.encode(&self.e),
        }
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("can_sign", &self.can_sign())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// JWT Service
// ============================================================================

/// Service for encoding and decoding JWT tokens.
///
/// This service is thread-safe (`Send + Sync`) and can be shared across
/// async tasks.
#[derive(Debug)]
pub struct JwtService {
    signing_key: SigningKeyPair,
    issuer: String,
}

impl JwtService {
    /// Creates a new JWT service.
    ///
    /// # Arguments
    /// * `signing_key` - The key pair to use for signing/verification
    /// * `issuer` - The issuer claim value
    #[must_use]
    pub fn new(signing_key: SigningKeyPair, issuer: impl Into<String>) -> Self {
        Self {
            signing_key,
            issuer: issuer.into(),
        }
    }

    /// Creates a service backed by a freshly generated key.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn ephemeral(issuer: impl Into<String>) -> Result<Self, JwtError> {
        Ok(Self::new(SigningKeyPair::generate()?, issuer))
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    /// Returns `NilPrivateKey` for a verify-only key, or an encoding error.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let key = self.signing_key.encoding_key()?;
        let mut header = Header::new(SIGNING_ALGORITHM);
        header.kid = Some(self.signing_key.kid.clone());

        encode(&header, claims, key).map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Decodes and validates a JWT string.
    ///
    /// # Errors
    /// Returns an error if the signature, algorithm, issuer or expiry is invalid.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<TokenData<T>, JwtError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.validate_exp = true;
        validation.validate_aud = false;

        decode(token, self.signing_key.decoding_key(), &validation).map_err(JwtError::from)
    }

    /// Returns the current signing key ID.
    #[must_use]
    pub fn current_kid(&self) -> &str {
        &self.signing_key.kid
    }

    /// Returns the issuer URL.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the signing key.
    #[must_use]
    pub fn signing_key(&self) -> &SigningKeyPair {
        &self.signing_key
    }

    /// Returns the JWKS containing the public key.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: vec![self.signing_key.to_jwk()],
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

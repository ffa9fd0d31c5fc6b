//! Refresh-token credential values.
//!
//! A [`CredentialHash`] is the secret half of a refresh token: 32 random
//! bytes, handed to the client as lowercase hex and looked up by value.
//! Equality is constant-time.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;

use crate::AuthResult;
use crate::error::AuthError;

/// Length in bytes of a credential hash.
pub const CREDENTIAL_HASH_LEN: usize = 32;

/// Fixed-length random refresh-token secret.
#[derive(Clone, Copy)]
pub struct CredentialHash([u8; CREDENTIAL_HASH_LEN]);

impl CredentialHash {
    /// Generates a fresh random credential from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; CREDENTIAL_HASH_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; CREDENTIAL_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Decodes from a byte slice of exactly [`CREDENTIAL_HASH_LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRefreshToken` on a length mismatch.
    pub fn from_slice(bytes: &[u8]) -> AuthResult<Self> {
        let array: [u8; CREDENTIAL_HASH_LEN] = bytes.try_into().map_err(|_| {
            AuthError::invalid_refresh_token(format!(
                "credential must be {CREDENTIAL_HASH_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Decodes from a hex string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRefreshToken` if the string is not valid hex of the
    /// right length.
    pub fn from_hex(value: &str) -> AuthResult<Self> {
        let bytes = hex::decode(value)
            .map_err(|e| AuthError::invalid_refresh_token(format!("malformed credential: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// Encodes as lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; CREDENTIAL_HASH_LEN] {
        &self.0
    }
}

impl PartialEq for CredentialHash {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for CredentialHash {}

impl Hash for CredentialHash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

// Never print the secret itself.
impl fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialHash(..)")
    }
}

impl FromStr for CredentialHash {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for CredentialHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CredentialHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_hex_length() {
        let hash = CredentialHash::generate();
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_uniqueness() {
        let a = CredentialHash::generate();
        let b = CredentialHash::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_parse() {
        let hash = CredentialHash::generate();
        let parsed: CredentialHash = hash.to_hex().parse().unwrap();
        assert_eq!(parsed, hash);
        assert_eq!(parsed.as_bytes(), hash.as_bytes());
    }

    #[test]
    fn test_malformed_hex_rejected() {
        assert!(matches!(
            CredentialHash::from_hex("not-hex"),
            Err(AuthError::InvalidRefreshToken { .. })
        ));
        assert!(matches!(
            CredentialHash::from_hex("abcd"),
            Err(AuthError::InvalidRefreshToken { .. })
        ));
        assert!(CredentialHash::from_hex("").is_err());
    }

    #[test]
    fn test_from_slice_length() {
        assert!(CredentialHash::from_slice(&[0u8; 31]).is_err());
        assert!(CredentialHash::from_slice(&[7u8; 32]).is_ok());
    }

    #[test]
    fn test_debug_hides_secret() {
        let hash = CredentialHash::from_bytes([0xab; 32]);
        assert!(!format!("{hash:?}").contains("abab"));
    }
}

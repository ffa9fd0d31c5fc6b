//! OAuth 2.0 client reference.
//!
//! Client registration and persistence live outside this crate; the engine
//! only needs to know who the client is and whether it can keep a secret.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;

/// A resolved OAuth client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Client id.
    pub id: Uuid,

    /// Whether this is a confidential client.
    /// Only confidential clients receive refresh tokens.
    pub confidential: bool,
}

impl Client {
    /// Creates a confidential client reference.
    #[must_use]
    pub fn confidential(id: Uuid) -> Self {
        Self {
            id,
            confidential: true,
        }
    }

    /// Creates a public (non-confidential) client reference.
    #[must_use]
    pub fn public(id: Uuid) -> Self {
        Self {
            id,
            confidential: false,
        }
    }

    /// Checks that the client id is set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClientId` if the id is nil.
    pub fn validate(&self) -> AuthResult<()> {
        if self.id.is_nil() {
            return Err(AuthError::InvalidClientId);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let id = Uuid::new_v4();
        assert!(Client::confidential(id).confidential);
        assert!(!Client::public(id).confidential);
    }

    #[test]
    fn test_nil_id_rejected() {
        assert!(matches!(
            Client::public(Uuid::nil()).validate(),
            Err(AuthError::InvalidClientId)
        ));
    }
}

//! Identity references.
//!
//! An [`Identity`] names who a session or refresh token belongs to. It is a
//! plain `(kind, id)` pair with no behavior beyond validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;

/// The kind of principal an [`Identity`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// A human user.
    User,
    /// A machine service account.
    Service,
    /// A delegated application (client acting on its own behalf).
    Application,
}

impl IdentityKind {
    /// Returns the kind as a lowercase string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Service => "service",
            Self::Application => "application",
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tagged reference to a principal.
///
/// A kind-less identity must carry the nil id and a kinded one must not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Principal id.
    pub id: Uuid,

    /// Principal kind, `None` only for the empty identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<IdentityKind>,
}

impl Identity {
    /// Creates an identity of the given kind.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentity` if `id` is nil.
    pub fn new(kind: IdentityKind, id: Uuid) -> AuthResult<Self> {
        let identity = Self {
            id,
            kind: Some(kind),
        };
        identity.validate()?;
        Ok(identity)
    }

    /// Creates a user identity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentity` if `id` is nil.
    pub fn user(id: Uuid) -> AuthResult<Self> {
        Self::new(IdentityKind::User, id)
    }

    /// Creates a service identity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentity` if `id` is nil.
    pub fn service(id: Uuid) -> AuthResult<Self> {
        Self::new(IdentityKind::Service, id)
    }

    /// Creates an application identity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentity` if `id` is nil.
    pub fn application(id: Uuid) -> AuthResult<Self> {
        Self::new(IdentityKind::Application, id)
    }

    /// The empty identity: no kind, nil id.
    #[must_use]
    pub fn none() -> Self {
        Self {
            id: Uuid::nil(),
            kind: None,
        }
    }

    /// Returns `true` for the empty identity.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.kind.is_none()
    }

    /// Returns `true` if this identity names a user.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.kind == Some(IdentityKind::User)
    }

    /// Checks the kind/id invariant.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentity` if a kinded identity has a nil id or a
    /// kind-less identity has a non-nil id.
    pub fn validate(&self) -> AuthResult<()> {
        match (self.kind, self.id.is_nil()) {
            (None, true) | (Some(_), false) => Ok(()),
            (None, false) => Err(AuthError::invalid_identity(
                "identity without kind must have a nil id",
            )),
            (Some(kind), true) => Err(AuthError::invalid_identity(format!(
                "{kind} identity must have a non-nil id"
            ))),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind}/{}", self.id),
            None => write!(f, "none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_identity() {
        let id = Uuid::new_v4();
        let identity = Identity::user(id).unwrap();
        assert_eq!(identity.id, id);
        assert!(identity.is_user());
        assert!(!identity.is_none());
        assert_eq!(identity.to_string(), format!("user/{id}"));
    }

    #[test]
    fn test_nil_id_rejected() {
        let err = Identity::service(Uuid::nil()).unwrap_err();
        assert!(matches!(err, AuthError::InvalidIdentity { .. }));
    }

    #[test]
    fn test_none_identity_is_valid() {
        let identity = Identity::none();
        assert!(identity.validate().is_ok());
        assert!(identity.is_none());
        assert_eq!(identity.to_string(), "none");
    }

    #[test]
    fn test_kindless_identity_with_id_rejected() {
        let identity = Identity {
            id: Uuid::new_v4(),
            kind: None,
        };
        assert!(matches!(
            identity.validate(),
            Err(AuthError::InvalidIdentity { .. })
        ));
    }

    #[test]
    fn test_serialization() {
        let identity = Identity::application(Uuid::new_v4()).unwrap();
        let json = serde_json::to_string(&identity).unwrap();
        assert!(json.contains("\"kind\":\"application\""));

        let parsed: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, identity);
    }
}

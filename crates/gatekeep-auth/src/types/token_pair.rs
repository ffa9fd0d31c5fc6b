//! Token pair returned to clients.

use serde::{Deserialize, Serialize};

/// An access token plus, for confidential clients, a refresh credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Signed RS256 JWT.
    pub access_token: String,

    /// Hex-encoded refresh credential. Absent for public clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenPair {
    /// Creates a token pair.
    #[must_use]
    pub fn new(access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    /// Returns `true` if a non-empty refresh token is present.
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_skipped_when_absent() {
        let pair = TokenPair::new("a.b.c".into(), None);
        let json = serde_json::to_string(&pair).unwrap();
        assert_eq!(json, r#"{"accessToken":"a.b.c"}"#);
        assert!(!pair.has_refresh_token());
    }

    #[test]
    fn test_empty_refresh_token_is_absent() {
        let pair = TokenPair::new("a.b.c".into(), Some(String::new()));
        assert!(!pair.has_refresh_token());
    }
}

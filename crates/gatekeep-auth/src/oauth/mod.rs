//! Authorization-code grant support.
//!
//! - [`pkce`] - RFC 7636 challenges and verifiers

pub mod pkce;

pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};

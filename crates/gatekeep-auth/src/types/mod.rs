//! Domain types shared across the engine.
//!
//! ## Domain Types
//!
//! - [`Identity`] - Tagged reference to a principal
//! - [`Client`] - Resolved OAuth client
//! - [`CredentialHash`] - Refresh-token secret
//! - [`Session`] - Authenticated session, keyed by access-token JTI
//! - [`RefreshToken`] - Rotation-chain node
//! - [`TokenPair`] - Access token plus optional refresh credential

pub mod client;
pub mod credential;
pub mod identity;
pub mod refresh_token;
pub mod session;
pub mod token_pair;

pub use client::Client;
pub use credential::{CREDENTIAL_HASH_LEN, CredentialHash};
pub use identity::{Identity, IdentityKind};
pub use refresh_token::RefreshToken;
pub use session::{RequestMetadata, Revocation, RevocationReason, Session, SessionOrigin};
pub use token_pair::TokenPair;

//! Access token signing and verification.

pub mod jwt;

pub use jwt::{AccessTokenClaims, Jwk, Jwks, JwtError, JwtService, SIGNING_ALGORITHM, SigningKeyPair};

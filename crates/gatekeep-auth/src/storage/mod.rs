//! Storage traits and in-memory backends.
//!
//! - [`Registry`] - sessions, refresh-token chains and the JTI blacklist
//! - [`AuthorizationCodeCache`] - one-time authorization codes
//!
//! # Implementations
//!
//! - [`MemoryRegistry`] - single-lock in-process registry
//! - [`MemoryCodeCache`] - `DashMap` TTL cache

pub mod code_cache;
pub mod memory;
pub mod registry;

pub use code_cache::{AuthorizationCodeCache, AuthorizationCodeEntry, MemoryCodeCache};
pub use memory::MemoryRegistry;
pub use registry::{RefreshTokenLookup, Registry, SessionLookup, SweepStats};

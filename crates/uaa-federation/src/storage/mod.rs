//! Storage traits the federation core depends on.
//!
//! # Implementations
//!
//! Implementations are provided by the surrounding service (user management
//! backend); tests use in-memory implementations.

pub mod user;

pub use user::{LocalUser, UserLookup};

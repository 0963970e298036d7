//! Shared identifier types.

pub mod tenant;

pub use tenant::{ClientKey, TenantKey};

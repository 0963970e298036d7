//! Tenant and IDP client identifiers.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque tenant identifier.
///
/// Tenant keys are case-insensitive; they are normalised to upper case on
/// construction so `"acme"` and `"ACME"` address the same tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TenantKey(String);

impl TenantKey {
    /// Creates a tenant key, normalising it to upper case.
    #[must_use]
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(key.as_ref().trim().to_uppercase())
    }

    /// Returns the normalised key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TenantKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TenantKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<TenantKey> for String {
    fn from(value: TenantKey) -> Self {
        value.0
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one IDP client configuration within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientKey(String);

impl ClientKey {
    /// Creates a client key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClientKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ClientKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

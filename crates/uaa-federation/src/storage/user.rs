//! Local user lookup.
//!
//! The federation core never creates users. It resolves a verified external
//! identity (for example an e-mail address) to an existing local account
//! through the [`UserLookup`] collaborator, which is implemented by the
//! user-management backend of the surrounding service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::types::TenantKey;

// =============================================================================
// Local User
// =============================================================================

/// A local user account that a federated identity maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    /// Unique identifier of the user within its tenant.
    pub id: String,

    /// Login name, used as the principal of issued tokens.
    pub login: String,

    /// Granted authorities (roles), copied onto the authenticated principal.
    #[serde(default)]
    pub authorities: Vec<String>,

    /// Whether the account is active.
    ///
    /// Inactive users cannot authenticate.
    pub active: bool,
}

impl LocalUser {
    /// Creates an active user without authorities.
    #[must_use]
    pub fn new(id: impl Into<String>, login: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            login: login.into(),
            authorities: Vec::new(),
            active: true,
        }
    }

    /// Adds an authority.
    #[must_use]
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authorities.push(authority.into());
        self
    }

    /// Sets whether the account is active.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Returns `true` if the user account is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

// =============================================================================
// User Lookup Trait
// =============================================================================

/// Resolves verified external identities to local users.
///
/// # Example
///
/// ```ignore
/// use uaa_federation::storage::UserLookup;
///
/// async fn example(users: &impl UserLookup, tenant: &TenantKey) {
///     if let Some(user) = users.find_by_identity(tenant, "jane@acme.com").await? {
///         println!("Found user: {}", user.login);
///     }
/// }
/// ```
#[async_trait]
pub trait UserLookup: Send + Sync {
    /// Find a user of `tenant` by the value of a verified identity claim.
    ///
    /// Returns `None` if no local user carries that identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_identity(
        &self,
        tenant: &TenantKey,
        identity: &str,
    ) -> AuthResult<Option<LocalUser>>;
}

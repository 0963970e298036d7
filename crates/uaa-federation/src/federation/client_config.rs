//! IDP client configuration model.
//!
//! A tenant's federation configuration arrives in two halves that are
//! delivered independently by the configuration distribution service:
//!
//! - the **public** half (`settings-public.yml`): tenant-wide settings and the
//!   non-secret part of each IDP client (client id, issuer, claim mapping)
//! - the **private** half (`idp-config.yml`): client secrets and other
//!   sensitive fields
//!
//! Both halves are keyed by the client `key`. A [`FederationClientConfig`]
//! pairs them and is only usable once both are present.
//!
//! # Document Format
//!
//! ```yaml
//! # settings-public.yml
//! config:
//!   directLogin: true
//!   jwksSourceType: config
//!   clients:
//!     - key: auth0_main
//!       clientId: cid1
//!       issuer: https://acme.auth0.com/
//!       claimsMapping:
//!         userIdentityAttribute: email
//!
//! # idp-config.yml
//! config:
//!   clients:
//!     - key: auth0_main
//!       clientSecret: secret
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::IngestError;
use crate::types::ClientKey;

// =============================================================================
// Public half
// =============================================================================

/// Non-secret half of an IDP client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicClientConfig {
    /// Client key, unique within the tenant.
    pub key: ClientKey,

    /// OAuth client id registered at the IDP.
    pub client_id: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Issuer identifier the IDP puts into the `iss` claim.
    pub issuer: String,

    /// JWKS endpoint of the IDP (used by the remote JWKS source).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_endpoint: Option<String>,

    /// Requested scopes.
    #[serde(default)]
    pub scope: Vec<String>,

    /// How external claims map onto local identity attributes.
    #[serde(default)]
    pub claims_mapping: ClaimsMapping,

    /// Fields not modelled explicitly (endpoints, UI hints, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PublicClientConfig {
    /// Creates a public client config with the mandatory fields.
    #[must_use]
    pub fn new(
        key: impl Into<ClientKey>,
        client_id: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            client_id: client_id.into(),
            name: None,
            issuer: issuer.into(),
            jwks_endpoint: None,
            scope: Vec::new(),
            claims_mapping: ClaimsMapping::default(),
            extra: BTreeMap::new(),
        }
    }

    /// Sets the JWKS endpoint.
    #[must_use]
    pub fn with_jwks_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.jwks_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the claim holding the user identity.
    #[must_use]
    pub fn with_identity_attribute(mut self, claim: impl Into<String>) -> Self {
        self.claims_mapping.user_identity_attribute = Some(claim.into());
        self
    }

    /// Returns `true` if `issuer` names this client's IDP.
    ///
    /// A single trailing slash is ignored on both sides.
    #[must_use]
    pub fn matches_issuer(&self, issuer: &str) -> bool {
        normalize_issuer(&self.issuer) == normalize_issuer(issuer)
    }
}

/// Mapping of external token claims onto local identity attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimsMapping {
    /// Claim whose value identifies the local user (e.g. `email`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_identity_attribute: Option<String>,

    /// Claim holding the user's first name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name_attribute: Option<String>,

    /// Claim holding the user's last name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name_attribute: Option<String>,
}

/// Tenant-wide, non-client-specific federation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSettings {
    /// Whether the login page should redirect straight to the only IDP.
    #[serde(default)]
    pub direct_login: bool,

    /// Where the tenant's signing keys are published.
    #[serde(default)]
    pub jwks_source_type: JwksSourceType,
}

/// Where a tenant's IDP signing keys come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JwksSourceType {
    /// Raw JWKS documents delivered through the configuration service.
    #[default]
    Config,
    /// Each client's `jwksEndpoint`, fetched over HTTPS.
    Remote,
}

impl fmt::Display for JwksSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

// =============================================================================
// Private half
// =============================================================================

/// Secret half of an IDP client configuration.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateClientConfig {
    /// Client key, unique within the tenant.
    pub key: ClientKey,

    /// OAuth client secret registered at the IDP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Other sensitive fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PrivateClientConfig {
    /// Creates a private client config with a secret.
    #[must_use]
    pub fn new(key: impl Into<ClientKey>, client_secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            client_secret: Some(client_secret.into()),
            extra: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for PrivateClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateClientConfig")
            .field("key", &self.key)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// Paired config
// =============================================================================

/// Pairing of both halves of one IDP client's configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FederationClientConfig {
    /// Client key.
    pub key: ClientKey,

    /// Public half, once observed.
    pub public: Option<PublicClientConfig>,

    /// Private half, once observed.
    pub private: Option<PrivateClientConfig>,
}

impl FederationClientConfig {
    /// Creates an empty pairing for `key`.
    #[must_use]
    pub fn new(key: ClientKey) -> Self {
        Self {
            key,
            public: None,
            private: None,
        }
    }

    /// Returns `true` when both halves are present.
    #[must_use]
    pub fn is_applicable(&self) -> bool {
        self.public.is_some() && self.private.is_some()
    }

    /// Returns `true` when neither half is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.public.is_none() && self.private.is_none()
    }

    /// Returns the configured issuer, if the public half is present.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.public.as_ref().map(|p| p.issuer.as_str())
    }

    /// Returns the IDP client id, if the public half is present.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.public.as_ref().map(|p| p.client_id.as_str())
    }
}

// =============================================================================
// Document parsing
// =============================================================================

/// Parsed content of a public settings document.
#[derive(Debug, Clone, Default)]
pub(crate) struct PublicDocument {
    pub settings: PublicSettings,
    pub clients: Vec<PublicClientConfig>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    config: Option<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicBody {
    #[serde(flatten)]
    settings: PublicSettings,
    clients: Option<Vec<serde_yaml::Value>>,
}

#[derive(Deserialize)]
struct PrivateBody {
    clients: Option<Vec<serde_yaml::Value>>,
}

/// Parses a public settings document.
///
/// An empty document is a valid, explicitly empty configuration. Client
/// entries that cannot be parsed are skipped with a warning.
pub(crate) fn parse_public_document(text: &str) -> Result<PublicDocument, IngestError> {
    let Some(body) = parse_envelope::<PublicBody>(text)? else {
        return Ok(PublicDocument::default());
    };

    Ok(PublicDocument {
        settings: body.settings,
        clients: parse_clients(body.clients.unwrap_or_default()),
    })
}

/// Parses a private IDP configuration document.
pub(crate) fn parse_private_document(text: &str) -> Result<Vec<PrivateClientConfig>, IngestError> {
    let Some(body) = parse_envelope::<PrivateBody>(text)? else {
        return Ok(Vec::new());
    };

    Ok(parse_clients(body.clients.unwrap_or_default()))
}

fn parse_envelope<T: DeserializeOwned>(text: &str) -> Result<Option<T>, IngestError> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let envelope: Option<Envelope<T>> = serde_yaml::from_str(text)?;
    Ok(envelope.and_then(|e| e.config))
}

fn parse_clients<T: DeserializeOwned>(entries: Vec<serde_yaml::Value>) -> Vec<T> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_yaml::from_value::<T>(entry) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping malformed IDP client entry");
                None
            }
        })
        .collect()
}

pub(crate) fn normalize_issuer(issuer: &str) -> &str {
    issuer.strip_suffix('/').unwrap_or(issuer)
}

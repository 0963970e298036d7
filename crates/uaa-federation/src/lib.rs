//! # uaa-federation
//!
//! Tenant-scoped external identity provider federation for the UAA.
//!
//! This crate provides:
//! - Merging of independently delivered IDP client configuration halves
//! - A lazily populated, tenant-scoped JWKS cache of RSA verifiers
//! - The `idp_token` grant exchanging external tokens for local ones
//!
//! ## Overview
//!
//! Everything is keyed by an explicit [`TenantKey`]; the crate never resolves
//! the current tenant itself. Configuration arrives from the configuration
//! distribution service through [`federation::ConfigListener`]s, user lookup
//! and local token minting are delegated to the surrounding service.
//!
//! ## Modules
//!
//! - [`config`] - Federation configuration
//! - [`federation`] - Config ingestion, JWKS cache and token exchange
//! - [`oauth`] - Token endpoint request/response types
//! - [`storage`] - User lookup collaborator
//! - [`token`] - Local token issuance collaborator
//! - [`types`] - Tenant and client identifiers

pub mod config;
pub mod error;
pub mod federation;
pub mod oauth;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{ConfigError, FederationConfig};
pub use error::{AuthError, ErrorCategory};
pub use federation::{
    ConfigIngestor, ConfigJwksSource, ConfigListener, ConfigListeners, FederationClientConfig,
    IdpAuthenticationToken, IdpError, JwksCache, JwksError, JwksSource, RemoteJwksSource,
    TenantJwksSource, TokenExchanger,
};
pub use oauth::{TokenError, TokenErrorCode, TokenRequest, TokenResponse};
pub use storage::{LocalUser, UserLookup};
pub use token::TokenIssuer;
pub use types::{ClientKey, TenantKey};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use uaa_federation::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{ConfigError, ExchangeConfig, FederationConfig, IngestConfig, JwksCacheConfig};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::federation::{
        ConfigIngestor, ConfigJwksSource, ConfigListener, ConfigListeners, FederationClientConfig,
        IdpAuthenticationToken, IdpError, JwksCache, JwksError, JwksSource, PrivateClientConfig,
        PublicClientConfig, PublicSettings, RawJwks, RemoteJwksSource, TenantJwksSource,
        TokenExchanger,
    };
    pub use crate::oauth::{
        IDP_TOKEN_GRANT_TYPE, TOKEN_PARAM, TokenError, TokenErrorCode, TokenRequest, TokenResponse,
    };
    pub use crate::storage::{LocalUser, UserLookup};
    pub use crate::token::TokenIssuer;
    pub use crate::types::{ClientKey, TenantKey};
}

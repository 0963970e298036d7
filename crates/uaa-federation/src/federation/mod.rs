//! External identity provider federation.
//!
//! This module merges per-tenant IDP client configuration, caches the IDPs'
//! signing keys and exchanges externally issued tokens for local ones.
//!
//! # Components
//!
//! - [`ConfigIngestor`] - Merges the public and private configuration halves
//! - [`JwksCache`] - Tenant-scoped cache of RSA signature verifiers
//! - [`TokenExchanger`] - The `idp_token` grant
//!
//! # Wiring
//!
//! ```ignore
//! use std::sync::Arc;
//! use uaa_federation::federation::*;
//!
//! let ingestor = Arc::new(ConfigIngestor::new(&config.ingest)?);
//! let config_jwks = Arc::new(ConfigJwksSource::new(&config.ingest)?);
//! let remote_jwks = Arc::new(RemoteJwksSource::new(ingestor.clone(), config.jwks.clone())?);
//! let source = TenantJwksSource::new(ingestor.clone(), config_jwks.clone(), remote_jwks);
//! let jwks = Arc::new(JwksCache::new(Arc::new(source), config.jwks.clone()));
//!
//! let listeners = ConfigListeners::new().with(ingestor.clone()).with(config_jwks);
//! let exchanger = TokenExchanger::new(ingestor, jwks, users, issuer, config.exchange.clone());
//! ```

pub mod client_config;
pub mod error;
pub mod exchange;
pub mod ingestor;
pub mod jwk;
pub mod jwks;
pub mod listener;
pub mod path;
pub mod source;

pub use client_config::{
    ClaimsMapping, FederationClientConfig, JwksSourceType, PrivateClientConfig,
    PublicClientConfig, PublicSettings,
};
pub use error::{IdpError, IngestError};
pub use exchange::{IdpAuthenticationToken, TokenExchanger};
pub use ingestor::{AllClientConfigs, ConfigIngestor, ConfigProcessingState, TenantClientConfigs};
pub use jwk::{
    Claims, JwkDefinition, JwkDefinitionHolder, JwkError, KeyType, KeyUse, RsaJwkDefinition,
    SignatureVerifier,
};
pub use jwks::{JwksCache, JwksCacheEntry, JwksError};
pub use listener::{ConfigListener, ConfigListeners};
pub use path::{PathMatch, PathTemplate};
pub use source::{ConfigJwksSource, JwksSource, RawJwks, RemoteJwksSource, TenantJwksSource};

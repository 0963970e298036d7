//! Raw JWKS sources.
//!
//! A [`JwksSource`] returns every raw JWK Set document currently known for a
//! tenant. The cache parses them; sources only move bytes.
//!
//! - [`ConfigJwksSource`] - documents pushed by the configuration service
//! - [`RemoteJwksSource`] - each client's `jwksEndpoint`, fetched over HTTPS
//! - [`TenantJwksSource`] - picks one of the above per tenant from its
//!   public settings

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use url::Url;

use super::client_config::JwksSourceType;
use super::ingestor::ConfigIngestor;
use super::jwks::JwksError;
use super::listener::ConfigListener;
use super::path::PathTemplate;
use crate::config::{ConfigError, IngestConfig, JwksCacheConfig};
use crate::types::{ClientKey, TenantKey};

/// One raw JWK Set document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawJwks {
    /// Client whose keys the document holds.
    pub client_key: ClientKey,
    /// The JSON document.
    pub document: String,
}

/// Storage of raw JWK Set documents per tenant.
#[async_trait]
pub trait JwksSource: Send + Sync {
    /// Returns all raw JWKS documents currently known for `tenant`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    async fn fetch_raw_jwks(&self, tenant: &TenantKey) -> Result<Vec<RawJwks>, JwksError>;
}

// =============================================================================
// Config-delivered documents
// =============================================================================

/// JWKS documents delivered through the configuration service.
pub struct ConfigJwksSource {
    template: PathTemplate,
    documents: DashMap<TenantKey, BTreeMap<ClientKey, String>>,
}

impl ConfigJwksSource {
    /// Creates a source watching the configured JWKS path template.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is invalid.
    pub fn new(config: &IngestConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            template: PathTemplate::compile(&config.jwks_path)?,
            documents: DashMap::new(),
        })
    }

    /// Stores the document at `path`. Empty documents remove it.
    pub fn store(&self, path: &str, document: &str) {
        let Some((tenant, client)) = self.locate(path) else {
            return;
        };

        if document.trim().is_empty() {
            self.remove(&tenant, &client);
            return;
        }

        self.documents
            .entry(tenant.clone())
            .or_default()
            .insert(client.clone(), document.to_string());
        tracing::debug!(tenant = %tenant, client = %client, "Stored JWKS document");
    }

    /// Number of documents stored for `tenant`.
    #[must_use]
    pub fn document_count(&self, tenant: &TenantKey) -> usize {
        self.documents.get(tenant).map_or(0, |docs| docs.len())
    }

    fn locate(&self, path: &str) -> Option<(TenantKey, ClientKey)> {
        let m = self.template.matches(path)?;
        Some((m.tenant, m.client?))
    }

    fn remove(&self, tenant: &TenantKey, client: &ClientKey) {
        if let Some(mut docs) = self.documents.get_mut(tenant) {
            docs.remove(client);
        }
        self.documents.remove_if(tenant, |_, docs| docs.is_empty());
        tracing::debug!(tenant = %tenant, client = %client, "Removed JWKS document");
    }
}

#[async_trait]
impl JwksSource for ConfigJwksSource {
    async fn fetch_raw_jwks(&self, tenant: &TenantKey) -> Result<Vec<RawJwks>, JwksError> {
        let Some(docs) = self.documents.get(tenant) else {
            return Ok(Vec::new());
        };

        Ok(docs
            .iter()
            .map(|(client_key, document)| RawJwks {
                client_key: client_key.clone(),
                document: document.clone(),
            })
            .collect())
    }
}

impl ConfigListener for ConfigJwksSource {
    fn name(&self) -> &str {
        "idp-jwks"
    }

    fn is_listening_configuration(&self, path: &str) -> bool {
        self.template.is_match(path)
    }

    fn on_refresh(&self, path: &str, document: &str) {
        self.store(path, document);
    }

    fn on_remove(&self, path: &str) {
        if let Some((tenant, client)) = self.locate(path) {
            self.remove(&tenant, &client);
        }
    }
}

// =============================================================================
// Remote endpoints
// =============================================================================

/// Fetches JWKS documents from the `jwksEndpoint` of each applicable client.
///
/// # Security Considerations
///
/// - Only HTTPS URIs are allowed (configurable for testing)
/// - HTTP timeouts prevent hanging on slow endpoints
/// - Response size is limited
pub struct RemoteJwksSource {
    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,
    /// Client configurations providing the endpoints.
    ingestor: Arc<ConfigIngestor>,
    /// Configuration.
    config: JwksCacheConfig,
}

impl RemoteJwksSource {
    /// Creates a remote source.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(ingestor: Arc<ConfigIngestor>, config: JwksCacheConfig) -> Result<Self, JwksError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| JwksError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            ingestor,
            config,
        })
    }

    /// Fetches one JWKS document.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The URI is invalid or not HTTPS (unless `allow_http` is configured)
    /// - The HTTP request fails or returns a non-success status
    /// - The response exceeds the size limit or is not UTF-8
    pub async fn fetch(&self, endpoint: &str) -> Result<String, JwksError> {
        let jwks_uri = Url::parse(endpoint).map_err(|e| JwksError::InvalidUrl(e.to_string()))?;
        self.validate_scheme(&jwks_uri)?;

        tracing::debug!("Fetching JWKS from {}", jwks_uri);

        let response = self
            .http_client
            .get(jwks_uri.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to fetch JWKS from {}: {}", jwks_uri, e);
                JwksError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpError(response.status().as_u16()));
        }

        let max_size = self.config.max_response_size;
        if let Some(len) = response.content_length()
            && len as usize > max_size
        {
            return Err(JwksError::ResponseTooLarge { max_size });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| JwksError::NetworkError(e.to_string()))?;
        if body.len() > max_size {
            return Err(JwksError::ResponseTooLarge { max_size });
        }

        String::from_utf8(body.to_vec()).map_err(|e| JwksError::ParseError(e.to_string()))
    }

    /// Validates that the URI uses an allowed scheme.
    fn validate_scheme(&self, uri: &Url) -> Result<(), JwksError> {
        match uri.scheme() {
            "https" => Ok(()),
            "http" if self.config.allow_http => Ok(()),
            _ => Err(JwksError::InvalidScheme),
        }
    }
}

#[async_trait]
impl JwksSource for RemoteJwksSource {
    /// Fetches every applicable client's endpoint.
    ///
    /// A failing endpoint is skipped; the error is returned only if no
    /// endpoint could be fetched at all.
    async fn fetch_raw_jwks(&self, tenant: &TenantKey) -> Result<Vec<RawJwks>, JwksError> {
        let Some(configs) = self.ingestor.get_idp_client_configs_by_tenant_key(tenant) else {
            return Ok(Vec::new());
        };

        let mut documents = Vec::new();
        let mut last_error = None;

        for config in configs.values() {
            let Some(endpoint) = config
                .public
                .as_ref()
                .and_then(|p| p.jwks_endpoint.as_deref())
            else {
                continue;
            };

            match self.fetch(endpoint).await {
                Ok(document) => documents.push(RawJwks {
                    client_key: config.key.clone(),
                    document,
                }),
                Err(e) => {
                    tracing::warn!(
                        tenant = %tenant,
                        client = %config.key,
                        error = %e,
                        "Skipping unreachable JWKS endpoint"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if documents.is_empty() => Err(e),
            _ => Ok(documents),
        }
    }
}

// =============================================================================
// Per-tenant dispatch
// =============================================================================

/// Chooses the JWKS source per tenant from its `jwksSourceType` setting.
///
/// Tenants without public settings use the config-delivered source.
pub struct TenantJwksSource {
    ingestor: Arc<ConfigIngestor>,
    config_source: Arc<dyn JwksSource>,
    remote_source: Arc<dyn JwksSource>,
}

impl TenantJwksSource {
    /// Creates a dispatching source.
    #[must_use]
    pub fn new(
        ingestor: Arc<ConfigIngestor>,
        config_source: Arc<dyn JwksSource>,
        remote_source: Arc<dyn JwksSource>,
    ) -> Self {
        Self {
            ingestor,
            config_source,
            remote_source,
        }
    }

    /// Returns the source type configured for `tenant`.
    #[must_use]
    pub fn source_type(&self, tenant: &TenantKey) -> JwksSourceType {
        self.ingestor
            .get_idp_public_config_by_tenant_key(tenant)
            .map(|settings| settings.jwks_source_type)
            .unwrap_or_default()
    }
}

#[async_trait]
impl JwksSource for TenantJwksSource {
    async fn fetch_raw_jwks(&self, tenant: &TenantKey) -> Result<Vec<RawJwks>, JwksError> {
        let source_type = self.source_type(tenant);
        tracing::trace!(tenant = %tenant, source = %source_type, "Selecting JWKS source");

        match source_type {
            JwksSourceType::Config => self.config_source.fetch_raw_jwks(tenant).await,
            JwksSourceType::Remote => self.remote_source.fetch_raw_jwks(tenant).await,
        }
    }
}

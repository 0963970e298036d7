//! Per-tenant IDP client configuration ingestion.
//!
//! The public and private halves of a tenant's federation configuration
//! arrive independently, in any order, possibly repeated and possibly
//! concurrently. [`ConfigIngestor`] stages them per tenant and publishes the
//! subset of clients for which both halves are known.
//!
//! # Publishing Rules
//!
//! After every accepted document the tenant's applicable set is recomputed:
//!
//! - **non-empty**: published as one immutable snapshot (atomic swap)
//! - **empty, both halves observed**: the published configuration is removed
//!   and the tenant's processing state is reset
//! - **empty otherwise**: the published configuration is left untouched
//!
//! A delivered document is authoritative for its half: clients missing from
//! it lose that half. The staged working set is kept across publishes so an
//! update of one half is re-merged with the last known other half.
//!
//! # Concurrency
//!
//! Writers for one tenant are serialised on the tenant's staging entry;
//! different tenants proceed in parallel. Readers load the published snapshot
//! without locking and never observe a half-applied update.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;

use super::client_config::{
    FederationClientConfig, PrivateClientConfig, PublicClientConfig, PublicDocument,
    PublicSettings, normalize_issuer, parse_private_document, parse_public_document,
};
use super::error::IngestError;
use super::listener::ConfigListener;
use super::path::PathTemplate;
use crate::config::{ConfigError, IngestConfig};
use crate::types::{ClientKey, TenantKey};

/// Applicable client configurations of one tenant, keyed by client key.
pub type TenantClientConfigs = HashMap<ClientKey, FederationClientConfig>;

/// Published snapshot of every tenant's applicable client configurations.
pub type AllClientConfigs = HashMap<TenantKey, Arc<TenantClientConfigs>>;

/// Tracks which halves of a tenant's configuration have been observed since
/// the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigProcessingState {
    /// A public settings document was observed.
    pub public_seen: bool,
    /// A private IDP configuration document was observed.
    pub private_seen: bool,
}

impl ConfigProcessingState {
    /// Returns `true` once both halves have been observed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.public_seen && self.private_seen
    }
}

#[derive(Debug, Default)]
struct TenantStaging {
    clients: HashMap<ClientKey, FederationClientConfig>,
    state: ConfigProcessingState,
}

/// Merges the two configuration halves of every tenant into applicable
/// federation client configurations.
pub struct ConfigIngestor {
    public_template: PathTemplate,
    private_template: PathTemplate,
    staging: DashMap<TenantKey, TenantStaging>,
    published: ArcSwap<AllClientConfigs>,
    public_settings: ArcSwap<HashMap<TenantKey, Arc<PublicSettings>>>,
}

impl ConfigIngestor {
    /// Creates an ingestor watching the configured path templates.
    ///
    /// # Errors
    ///
    /// Returns an error if a path template is invalid.
    pub fn new(config: &IngestConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            public_template: PathTemplate::compile(&config.public_settings_path)?,
            private_template: PathTemplate::compile(&config.idp_config_path)?,
            staging: DashMap::new(),
            published: ArcSwap::from_pointee(HashMap::new()),
            public_settings: ArcSwap::from_pointee(HashMap::new()),
        })
    }

    /// Returns `true` if `path` matches the public or private template.
    #[must_use]
    pub fn is_listening_configuration(&self, path: &str) -> bool {
        self.public_template.is_match(path) || self.private_template.is_match(path)
    }

    /// Handles the initial delivery of a document.
    pub fn on_init(&self, path: &str, document: &str) {
        self.on_refresh(path, document);
    }

    /// Handles a changed document.
    ///
    /// A document that cannot be parsed is logged and ignored; previously
    /// published state is retained.
    pub fn on_refresh(&self, path: &str, document: &str) {
        if let Err(e) = self.apply(path, document) {
            tracing::warn!(path, error = %e, "Ignoring IDP configuration update");
        }
    }

    /// Handles a deleted document as an explicitly empty half.
    pub fn on_remove(&self, path: &str) {
        self.on_refresh(path, "");
    }

    fn apply(&self, path: &str, document: &str) -> Result<(), IngestError> {
        if let Some(m) = self.public_template.matches(path) {
            let parsed = parse_public_document(document)?;
            self.apply_public(&m.tenant, parsed);
            Ok(())
        } else if let Some(m) = self.private_template.matches(path) {
            let parsed = parse_private_document(document)?;
            self.apply_private(&m.tenant, parsed);
            Ok(())
        } else {
            Err(IngestError::UnknownPath(path.to_string()))
        }
    }

    fn apply_public(&self, tenant: &TenantKey, document: PublicDocument) {
        let mut staging = self.staging.entry(tenant.clone()).or_default();

        let incoming = document.clients.into_iter().map(|c| (c.key.clone(), c));
        merge_half(&mut staging.clients, incoming, public_slot);
        staging.state.public_seen = true;

        tracing::debug!(
            tenant = %tenant,
            staged = staging.clients.len(),
            "Staged public IDP configuration"
        );

        self.store_settings(tenant, document.settings);
        self.publish(tenant, &mut staging);
    }

    fn apply_private(&self, tenant: &TenantKey, clients: Vec<PrivateClientConfig>) {
        let mut staging = self.staging.entry(tenant.clone()).or_default();

        let incoming = clients.into_iter().map(|c| (c.key.clone(), c));
        merge_half(&mut staging.clients, incoming, private_slot);
        staging.state.private_seen = true;

        tracing::debug!(
            tenant = %tenant,
            staged = staging.clients.len(),
            "Staged private IDP configuration"
        );

        self.publish(tenant, &mut staging);
    }

    fn store_settings(&self, tenant: &TenantKey, settings: PublicSettings) {
        let settings = Arc::new(settings);
        self.public_settings.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(tenant.clone(), Arc::clone(&settings));
            next
        });
    }

    /// Recomputes and publishes the tenant's applicable set.
    ///
    /// Must be called with the tenant's staging entry held.
    fn publish(&self, tenant: &TenantKey, staging: &mut TenantStaging) {
        let applicable: TenantClientConfigs = staging
            .clients
            .iter()
            .filter(|(_, config)| config.is_applicable())
            .map(|(key, config)| (key.clone(), config.clone()))
            .collect();

        if !applicable.is_empty() {
            warn_shared_issuers(tenant, &applicable);
            let count = applicable.len();
            let snapshot = Arc::new(applicable);
            self.published.rcu(|current| {
                let mut next = (**current).clone();
                next.insert(tenant.clone(), Arc::clone(&snapshot));
                next
            });
            tracing::info!(tenant = %tenant, clients = count, "Published IDP client configuration");
        } else if staging.state.is_complete() {
            self.published.rcu(|current| {
                let mut next = (**current).clone();
                next.remove(tenant);
                next
            });
            *staging = TenantStaging::default();
            tracing::info!(tenant = %tenant, "Removed IDP client configuration");
        } else {
            tracing::debug!(
                tenant = %tenant,
                state = ?staging.state,
                "IDP client configuration still loading"
            );
        }
    }

    /// Returns the applicable client configurations of `tenant`.
    #[must_use]
    pub fn get_idp_client_configs_by_tenant_key(
        &self,
        tenant: &TenantKey,
    ) -> Option<Arc<TenantClientConfigs>> {
        self.published.load().get(tenant).cloned()
    }

    /// Returns the applicable client configurations of every tenant.
    #[must_use]
    pub fn get_all_idp_client_configs(&self) -> Arc<AllClientConfigs> {
        self.published.load_full()
    }

    /// Returns the tenant-wide settings from the last public document.
    #[must_use]
    pub fn get_idp_public_config_by_tenant_key(
        &self,
        tenant: &TenantKey,
    ) -> Option<Arc<PublicSettings>> {
        self.public_settings.load().get(tenant).cloned()
    }

    /// Finds the applicable client of `tenant` whose issuer is `issuer`.
    ///
    /// If several clients share the issuer, the one with the smallest client
    /// key is returned.
    #[must_use]
    pub fn find_client_by_issuer(
        &self,
        tenant: &TenantKey,
        issuer: &str,
    ) -> Option<FederationClientConfig> {
        let configs = self.get_idp_client_configs_by_tenant_key(tenant)?;
        configs
            .values()
            .filter(|config| {
                config
                    .public
                    .as_ref()
                    .is_some_and(|p| p.matches_issuer(issuer))
            })
            .min_by(|a, b| a.key.cmp(&b.key))
            .cloned()
    }

    /// Returns which halves of `tenant`'s configuration have been observed.
    #[must_use]
    pub fn processing_state(&self, tenant: &TenantKey) -> ConfigProcessingState {
        self.staging
            .get(tenant)
            .map(|s| s.state)
            .unwrap_or_default()
    }
}

impl ConfigListener for ConfigIngestor {
    fn name(&self) -> &str {
        "idp-config"
    }

    fn is_listening_configuration(&self, path: &str) -> bool {
        ConfigIngestor::is_listening_configuration(self, path)
    }

    fn on_refresh(&self, path: &str, document: &str) {
        ConfigIngestor::on_refresh(self, path, document);
    }

    fn on_remove(&self, path: &str) {
        ConfigIngestor::on_remove(self, path);
    }
}

fn warn_shared_issuers(tenant: &TenantKey, configs: &TenantClientConfigs) {
    let mut by_issuer: HashMap<&str, Vec<&ClientKey>> = HashMap::new();
    for config in configs.values() {
        if let Some(issuer) = config.issuer() {
            by_issuer
                .entry(normalize_issuer(issuer))
                .or_default()
                .push(&config.key);
        }
    }

    for (issuer, mut clients) in by_issuer {
        if clients.len() > 1 {
            clients.sort();
            tracing::warn!(
                tenant = %tenant,
                issuer,
                clients = ?clients,
                selected = %clients[0],
                "Several IDP clients share an issuer"
            );
        }
    }
}

fn public_slot(config: &mut FederationClientConfig) -> &mut Option<PublicClientConfig> {
    &mut config.public
}

fn private_slot(config: &mut FederationClientConfig) -> &mut Option<PrivateClientConfig> {
    &mut config.private
}

/// Replaces one half of every staged client with the incoming document.
///
/// Later duplicates of a key win. Clients left with neither half are dropped.
fn merge_half<T>(
    clients: &mut HashMap<ClientKey, FederationClientConfig>,
    incoming: impl Iterator<Item = (ClientKey, T)>,
    slot: fn(&mut FederationClientConfig) -> &mut Option<T>,
) {
    let incoming: HashMap<ClientKey, T> = incoming.collect();

    for (key, config) in clients.iter_mut() {
        if !incoming.contains_key(key) {
            *slot(config) = None;
        }
    }

    for (key, half) in incoming {
        let config = clients
            .entry(key.clone())
            .or_insert_with(|| FederationClientConfig::new(key));
        *slot(config) = Some(half);
    }

    clients.retain(|_, config| !config.is_empty());
}

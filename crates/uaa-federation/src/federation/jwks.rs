//! Tenant-scoped JWKS caching.
//!
//! This module resolves signature verifiers by key id for a tenant, backed by
//! the raw JWK Set documents a [`JwksSource`] knows for that tenant.
//!
//! # Overview
//!
//! - [`JwksCache`] - Lazily populated per-tenant cache of RSA verifiers
//! - [`JwksCacheEntry`] - Immutable key id → verifier map of one tenant
//! - [`JwksError`] - Error types for JWKS operations
//!
//! # Reload Semantics
//!
//! A lookup first reads the tenant's current entry without locking. On a
//! miss it takes the tenant's reload lock and checks whether another caller
//! replaced the entry in the meantime; only if not does it fetch **all** of
//! the tenant's documents, rebuild the entry and swap it in atomically.
//! Concurrent misses for one tenant therefore cause a single reload.
//!
//! Keys that cannot be used (unsupported type, encryption keys, malformed
//! components) are skipped individually; the rest of the batch still loads.
//!
//! # Example
//!
//! ```ignore
//! use uaa_federation::federation::JwksCache;
//!
//! let cache = JwksCache::new(source, JwksCacheConfig::default());
//! match cache.get_definition_load_if_necessary(&tenant, "key-1").await? {
//!     Some(holder) => holder.verifier.verify(token, leeway)?,
//!     None => return Err(IdpError::UnknownSigningKey("key-1".into())),
//! };
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::jwk::{JwkDefinition, JwkDefinitionHolder, parse_jwk_set};
use super::source::{JwksSource, RawJwks};
use crate::config::JwksCacheConfig;
use crate::types::{ClientKey, TenantKey};

/// Errors that can occur during JWKS operations.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// A network error occurred while fetching a JWKS.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The JWKS response could not be read.
    #[error("Failed to parse JWKS: {0}")]
    ParseError(String),

    /// The JWKS URI is not a valid URL.
    #[error("Invalid JWKS URL: {0}")]
    InvalidUrl(String),

    /// The JWKS URI scheme is not allowed (must be HTTPS in production).
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },

    /// The raw JWKS storage failed.
    #[error("JWKS source error: {0}")]
    Source(String),

    /// Reloading the tenant's keys did not finish in time.
    #[error("JWKS reload timed out")]
    Timeout,
}

/// Immutable set of usable signing keys of one tenant.
///
/// Keys are grouped by key id; several clients of the tenant may publish the
/// same key id, each keeping its own holder.
#[derive(Debug, Default)]
pub struct JwksCacheEntry {
    keys: HashMap<String, Vec<Arc<JwkDefinitionHolder>>>,
}

impl JwksCacheEntry {
    /// Returns the first published key with id `kid`, whichever client owns it.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<Arc<JwkDefinitionHolder>> {
        self.keys.get(kid).and_then(|holders| holders.first()).cloned()
    }

    /// Returns the key with id `kid` published by `client`.
    #[must_use]
    pub fn get_for_client(&self, client: &ClientKey, kid: &str) -> Option<Arc<JwkDefinitionHolder>> {
        self.keys
            .get(kid)?
            .iter()
            .find(|holder| holder.client_key == *client)
            .cloned()
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.values().map(Vec::len).sum()
    }

    /// Returns `true` if the tenant has no usable keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the distinct ids of all keys.
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    fn insert(&mut self, tenant: &TenantKey, holder: JwkDefinitionHolder) {
        let holders = self.keys.entry(holder.key_id().to_string()).or_default();
        match holders
            .iter_mut()
            .find(|existing| existing.client_key == holder.client_key)
        {
            Some(existing) => {
                tracing::debug!(
                    tenant = %tenant,
                    client = %holder.client_key,
                    kid = holder.key_id(),
                    "Duplicate key id within client, last wins"
                );
                *existing = Arc::new(holder);
            }
            None => holders.push(Arc::new(holder)),
        }
    }

    fn build(tenant: &TenantKey, documents: Vec<RawJwks>) -> Self {
        let mut entry = Self::default();

        for raw in documents {
            let definitions = match parse_jwk_set(&raw.document) {
                Ok(definitions) => definitions,
                Err(e) => {
                    tracing::warn!(
                        tenant = %tenant,
                        client = %raw.client_key,
                        error = %e,
                        "Skipping unreadable JWK Set"
                    );
                    continue;
                }
            };

            for definition in definitions {
                let rsa = match definition {
                    Ok(JwkDefinition::Rsa(rsa)) if rsa.is_signing_key() => rsa,
                    Ok(JwkDefinition::Rsa(rsa)) => {
                        tracing::debug!(tenant = %tenant, kid = %rsa.key_id, "Skipping encryption key");
                        continue;
                    }
                    Ok(JwkDefinition::Unsupported { key_id, key_type }) => {
                        tracing::debug!(
                            tenant = %tenant,
                            kid = key_id.as_deref().unwrap_or("-"),
                            key_type = %key_type,
                            "Skipping unsupported key type"
                        );
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(
                            tenant = %tenant,
                            client = %raw.client_key,
                            error = %e,
                            "Skipping malformed JWK"
                        );
                        continue;
                    }
                };

                let kid = rsa.key_id.clone();
                match JwkDefinitionHolder::new(raw.client_key.clone(), rsa) {
                    Ok(holder) => entry.insert(tenant, holder),
                    Err(e) => {
                        tracing::warn!(
                            tenant = %tenant,
                            client = %raw.client_key,
                            kid = %kid,
                            error = %e,
                            "Skipping JWK without usable verifier"
                        );
                    }
                }
            }
        }

        entry
    }
}

/// In-memory, tenant-scoped cache of JWK verifiers.
///
/// # Features
///
/// - Lock-free lookups against an immutable per-tenant entry
/// - Full reload of a tenant's keys on miss, coalesced per tenant
/// - Reload bounded by a configurable timeout
/// - Manual invalidation
pub struct JwksCache {
    /// Raw JWKS documents per tenant.
    source: Arc<dyn JwksSource>,
    /// Published entries by tenant.
    entries: ArcSwap<HashMap<TenantKey, Arc<JwksCacheEntry>>>,
    /// Reload locks by tenant.
    locks: DashMap<TenantKey, Arc<Mutex<()>>>,
    /// Number of reloads started.
    reloads: AtomicU64,
    /// Configuration.
    config: JwksCacheConfig,
}

impl JwksCache {
    /// Creates an empty cache backed by `source`.
    #[must_use]
    pub fn new(source: Arc<dyn JwksSource>, config: JwksCacheConfig) -> Self {
        Self {
            source,
            entries: ArcSwap::from_pointee(HashMap::new()),
            locks: DashMap::new(),
            reloads: AtomicU64::new(0),
            config,
        }
    }

    /// Gets the key `kid` of `tenant`, reloading the tenant's keys on miss.
    ///
    /// If several clients publish `kid`, the first one is returned; use
    /// [`get_client_definition_load_if_necessary`](Self::get_client_definition_load_if_necessary)
    /// to verify a token of a known client.
    ///
    /// Returns `Ok(None)` if the key is still unknown after a reload; the
    /// caller must treat that as a verification failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the reload fails or times out. The previous entry
    /// is kept in that case.
    pub async fn get_definition_load_if_necessary(
        &self,
        tenant: &TenantKey,
        kid: &str,
    ) -> Result<Option<Arc<JwkDefinitionHolder>>, JwksError> {
        self.lookup(tenant, kid, |entry| entry.get(kid)).await
    }

    /// Gets the key `kid` published by `client` of `tenant`, reloading the
    /// tenant's keys on miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the reload fails or times out.
    pub async fn get_client_definition_load_if_necessary(
        &self,
        tenant: &TenantKey,
        client: &ClientKey,
        kid: &str,
    ) -> Result<Option<Arc<JwkDefinitionHolder>>, JwksError> {
        self.lookup(tenant, kid, |entry| entry.get_for_client(client, kid))
            .await
    }

    async fn lookup<F>(
        &self,
        tenant: &TenantKey,
        kid: &str,
        find: F,
    ) -> Result<Option<Arc<JwkDefinitionHolder>>, JwksError>
    where
        F: Fn(&JwksCacheEntry) -> Option<Arc<JwkDefinitionHolder>>,
    {
        let observed = self.entry(tenant);
        if let Some(holder) = observed.as_deref().and_then(&find) {
            tracing::trace!(tenant = %tenant, kid, "JWKS cache hit");
            return Ok(Some(holder));
        }

        let lock = self.tenant_lock(tenant);
        let _guard = lock.lock().await;

        // A missing entry (never loaded or invalidated meanwhile) always reloads.
        if let Some(current) = self.entry(tenant)
            && !observed
                .as_ref()
                .is_some_and(|observed| Arc::ptr_eq(observed, &current))
        {
            tracing::trace!(tenant = %tenant, kid, "JWKS reloaded by concurrent caller");
            return Ok(find(&*current));
        }

        tracing::debug!(tenant = %tenant, kid, "JWKS cache miss, reloading tenant keys");
        let entry = self.reload(tenant).await?;
        Ok(find(&*entry))
    }

    /// Returns the tenant's current entry without loading.
    #[must_use]
    pub fn entry(&self, tenant: &TenantKey) -> Option<Arc<JwksCacheEntry>> {
        self.entries.load().get(tenant).cloned()
    }

    /// Invalidates the tenant's entry.
    ///
    /// The next lookup for the tenant reloads its keys.
    pub fn invalidate(&self, tenant: &TenantKey) {
        self.entries.rcu(|current| {
            let mut next = (**current).clone();
            next.remove(tenant);
            next
        });
        tracing::debug!(tenant = %tenant, "Invalidated JWKS cache");
    }

    /// Clears all entries.
    pub fn clear(&self) {
        self.entries.store(Arc::new(HashMap::new()));
        tracing::debug!("Cleared JWKS cache");
    }

    /// Returns the number of cached tenants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    /// Returns `true` if no tenant is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// Returns the number of reloads started so far.
    #[must_use]
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    fn tenant_lock(&self, tenant: &TenantKey) -> Arc<Mutex<()>> {
        self.locks.entry(tenant.clone()).or_default().value().clone()
    }

    /// Fetches the tenant's documents and replaces its entry.
    ///
    /// Must be called with the tenant's reload lock held.
    async fn reload(&self, tenant: &TenantKey) -> Result<Arc<JwksCacheEntry>, JwksError> {
        self.reloads.fetch_add(1, Ordering::Relaxed);

        let documents =
            tokio::time::timeout(self.config.reload_timeout, self.source.fetch_raw_jwks(tenant))
                .await
                .map_err(|_| {
                    tracing::warn!(
                        tenant = %tenant,
                        timeout = ?self.config.reload_timeout,
                        "JWKS reload timed out"
                    );
                    JwksError::Timeout
                })?
                .inspect_err(|e| {
                    tracing::warn!(tenant = %tenant, error = %e, "Failed to fetch tenant JWKS");
                })?;

        let document_count = documents.len();
        let entry = Arc::new(JwksCacheEntry::build(tenant, documents));

        self.entries.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(tenant.clone(), Arc::clone(&entry));
            next
        });

        tracing::info!(
            tenant = %tenant,
            documents = document_count,
            keys = entry.len(),
            "Reloaded tenant JWKS"
        );

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    const N: &str = "qXxd4AyQ5hM1Q1FWqHdjYzPJXJCzDG5YVe0gLUU8_7TjAcZ6VRxrpsQ8KcrUZMdbl4_OtSnOwhDvF8Ip2odKVQ";

    struct StaticSource {
        documents: Vec<RawJwks>,
        delay: Duration,
    }

    #[async_trait]
    impl JwksSource for StaticSource {
        async fn fetch_raw_jwks(&self, _tenant: &TenantKey) -> Result<Vec<RawJwks>, JwksError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.documents.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl JwksSource for FailingSource {
        async fn fetch_raw_jwks(&self, _tenant: &TenantKey) -> Result<Vec<RawJwks>, JwksError> {
            Err(JwksError::Source("storage unavailable".to_string()))
        }
    }

    fn document(kids: &[&str]) -> RawJwks {
        client_document("c1", kids)
    }

    fn client_document(client: &str, kids: &[&str]) -> RawJwks {
        let keys: Vec<_> = kids
            .iter()
            .map(|kid| serde_json::json!({"kid": kid, "kty": "RSA", "n": N, "e": "AQAB"}))
            .collect();
        RawJwks {
            client_key: ClientKey::new(client),
            document: serde_json::json!({ "keys": keys }).to_string(),
        }
    }

    fn cache_with(documents: Vec<RawJwks>, delay: Duration) -> JwksCache {
        JwksCache::new(
            Arc::new(StaticSource { documents, delay }),
            JwksCacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_miss_reloads_and_hit_does_not() {
        let cache = cache_with(vec![document(&["k1", "k2"])], Duration::ZERO);
        let tenant = TenantKey::new("acme");

        let holder = cache
            .get_definition_load_if_necessary(&tenant, "k1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holder.key_id(), "k1");
        assert_eq!(cache.reload_count(), 1);

        assert!(
            cache
                .get_definition_load_if_necessary(&tenant, "k2")
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(cache.reload_count(), 1);
        assert_eq!(cache.entry(&tenant).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_kid_returns_none_after_reload() {
        let cache = cache_with(vec![document(&["k1"])], Duration::ZERO);
        let tenant = TenantKey::new("acme");

        let result = cache
            .get_definition_load_if_necessary(&tenant, "nope")
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(cache.reload_count(), 1);

        // Every miss forces another full reload.
        cache
            .get_definition_load_if_necessary(&tenant, "nope")
            .await
            .unwrap();
        assert_eq!(cache.reload_count(), 2);
    }

    #[tokio::test]
    async fn test_source_failure_is_reported() {
        let cache = JwksCache::new(Arc::new(FailingSource), JwksCacheConfig::default());
        let result = cache
            .get_definition_load_if_necessary(&TenantKey::new("acme"), "k1")
            .await;
        assert!(matches!(result, Err(JwksError::Source(_))));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = cache_with(vec![document(&["k1"])], Duration::ZERO);
        let acme = TenantKey::new("acme");
        let globex = TenantKey::new("globex");

        cache.get_definition_load_if_necessary(&acme, "k1").await.unwrap();
        cache.get_definition_load_if_necessary(&globex, "k1").await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.invalidate(&acme);
        assert!(cache.entry(&acme).is_none());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_unusable_keys_are_skipped() {
        let mixed = RawJwks {
            client_key: ClientKey::new("c1"),
            document: serde_json::json!({"keys": [
                {"kid": "good", "kty": "RSA", "n": N, "e": "AQAB"},
                {"kid": "enc", "kty": "RSA", "use": "enc", "n": N, "e": "AQAB"},
                {"kid": "ec", "kty": "EC", "crv": "P-256", "x": "x", "y": "y"},
                {"kid": "bad", "kty": "RSA", "n": "***", "e": "AQAB"}
            ]})
            .to_string(),
        };
        let garbage = RawJwks {
            client_key: ClientKey::new("c2"),
            document: "not json".to_string(),
        };
        let cache = cache_with(vec![mixed, garbage], Duration::ZERO);
        let tenant = TenantKey::new("acme");

        cache
            .get_definition_load_if_necessary(&tenant, "good")
            .await
            .unwrap()
            .unwrap();

        let entry = cache.entry(&tenant).unwrap();
        assert_eq!(entry.key_ids().collect::<Vec<_>>(), vec!["good"]);
    }

    #[tokio::test]
    async fn test_shared_kid_is_kept_per_client() {
        let cache = cache_with(
            vec![
                client_document("corp", &["1"]),
                client_document("social", &["1", "s2"]),
            ],
            Duration::ZERO,
        );
        let tenant = TenantKey::new("acme");
        let corp = ClientKey::new("corp");
        let social = ClientKey::new("social");

        let corp_key = cache
            .get_client_definition_load_if_necessary(&tenant, &corp, "1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(corp_key.client_key, corp);

        let social_key = cache
            .get_client_definition_load_if_necessary(&tenant, &social, "1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(social_key.client_key, social);
        assert_eq!(cache.reload_count(), 1);

        let entry = cache.entry(&tenant).unwrap();
        assert_eq!(entry.len(), 3);
        assert_eq!(entry.get("1").unwrap().client_key, corp);

        // A kid published by another client is not a key of this client.
        assert!(
            cache
                .get_client_definition_load_if_necessary(&tenant, &corp, "s2")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(cache.reload_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidated_while_waiting_reloads() {
        let source = Arc::new(StaticSource {
            documents: vec![document(&["k1", "k2"])],
            delay: Duration::ZERO,
        });
        let cache = Arc::new(JwksCache::new(source, JwksCacheConfig::default()));
        let tenant = TenantKey::new("acme");

        // Publish an entry that lacks k2.
        cache.entries.store(Arc::new(HashMap::from([(
            tenant.clone(),
            Arc::new(JwksCacheEntry::build(&tenant, vec![document(&["k1"])])),
        )])));

        let lock = cache.tenant_lock(&tenant);
        let guard = lock.lock().await;

        let waiter = {
            let cache = cache.clone();
            let tenant = tenant.clone();
            tokio::spawn(async move { cache.get_definition_load_if_necessary(&tenant, "k2").await })
        };

        // Let the waiter observe the entry and block on the reload lock.
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.invalidate(&tenant);
        drop(guard);

        let holder = waiter.await.unwrap().unwrap();
        assert_eq!(holder.unwrap().key_id(), "k2");
        assert_eq!(cache.reload_count(), 1);
    }
}

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};

use uaa_federation::federation::{IdpAuthenticationToken, JwksError, JwksSource, RawJwks};
use uaa_federation::{
    AuthResult, ClientKey, LocalUser, TenantKey, TokenIssuer, TokenRequest, TokenResponse,
    UserLookup,
};

// =============================================================================
// Keys and tokens
// =============================================================================

/// An RSA signing key and its public JWK.
pub struct TestKey {
    pub kid: String,
    pub encoding: EncodingKey,
    pub jwk: Value,
}

impl TestKey {
    fn generate(kid: &str) -> Self {
        let private = RsaPrivateKey::new(&mut OsRng, 2048).expect("generate RSA key");
        let pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .expect("encode private key");
        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("load encoding key");

        let public = private.to_public_key();
        let jwk = json!({
            "kid": kid,
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        });

        Self {
            kid: kid.to_string(),
            encoding,
            jwk,
        }
    }

    /// Signs `claims` with this key, putting its kid into the header.
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_as(&self.kid, claims)
    }

    /// Signs `claims` with this key under an arbitrary kid.
    pub fn sign_as(&self, kid: &str, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &self.encoding).expect("sign token")
    }
}

/// First shared test key (`kid = key-a`).
pub fn key_a() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| TestKey::generate("key-a"))
}

/// Second shared test key (`kid = key-b`).
pub fn key_b() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| TestKey::generate("key-b"))
}

/// Builds a JWK Set document from public keys.
pub fn jwks_document(keys: &[&TestKey]) -> String {
    let keys: Vec<&Value> = keys.iter().map(|k| &k.jwk).collect();
    json!({ "keys": keys }).to_string()
}

/// Seconds since the Unix epoch.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs() as i64
}

/// Standard claims for a token issued by `issuer` for `email`.
pub fn claims(issuer: &str, email: &str) -> Value {
    json!({
        "iss": issuer,
        "sub": "external-user-1",
        "aud": "cid1",
        "email": email,
        "iat": now(),
        "exp": now() + 300,
    })
}

/// Flips one character in the middle of the signature segment.
pub fn corrupt_signature(token: &str) -> String {
    let (head, signature) = token.rsplit_once('.').expect("three-part token");
    let mut chars: Vec<char> = signature.chars().collect();
    let middle = chars.len() / 2;
    chars[middle] = if chars[middle] == 'A' { 'B' } else { 'A' };
    format!("{head}.{}", chars.into_iter().collect::<String>())
}

// =============================================================================
// Configuration documents
// =============================================================================

pub fn public_path(tenant: &str) -> String {
    format!("/config/tenants/{tenant}/webapp/settings-public.yml")
}

pub fn private_path(tenant: &str) -> String {
    format!("/config/tenants/{tenant}/idp-config.yml")
}

pub fn jwks_path(tenant: &str, client: &str) -> String {
    format!("/config/tenants/{tenant}/webapp/public/idp/{client}/jwks.json")
}

/// Public settings document registering one client.
pub fn public_doc(key: &str, client_id: &str, issuer: &str) -> String {
    format!(
        r#"
config:
  directLogin: false
  jwksSourceType: config
  clients:
    - key: {key}
      clientId: {client_id}
      issuer: "{issuer}"
      claimsMapping:
        userIdentityAttribute: email
"#
    )
}

/// Private IDP configuration document registering one client.
pub fn private_doc(key: &str, secret: &str) -> String {
    format!(
        r#"
config:
  clients:
    - key: {key}
      clientSecret: {secret}
"#
    )
}

pub const EMPTY_PUBLIC_DOC: &str = "config:\n  clients: []\n";
pub const EMPTY_PRIVATE_DOC: &str = "config:\n  clients: []\n";

// =============================================================================
// Collaborators
// =============================================================================

/// JWKS source backed by an in-memory map, counting fetches.
#[derive(Default)]
pub struct MockJwksSource {
    documents: RwLock<HashMap<TenantKey, Vec<RawJwks>>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl MockJwksSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, tenant: &str, client: &str, document: String) -> Self {
        self.set_documents(
            tenant,
            vec![RawJwks {
                client_key: ClientKey::new(client),
                document,
            }],
        );
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_documents(&self, tenant: &str, documents: Vec<RawJwks>) {
        self.documents
            .write()
            .unwrap()
            .insert(TenantKey::new(tenant), documents);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JwksSource for MockJwksSource {
    async fn fetch_raw_jwks(&self, tenant: &TenantKey) -> Result<Vec<RawJwks>, JwksError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let documents = self.documents.read().unwrap();
        Ok(documents.get(tenant).cloned().unwrap_or_default())
    }
}

/// In-memory user directory keyed by tenant and identity.
#[derive(Default)]
pub struct MockUserLookup {
    users: RwLock<HashMap<(TenantKey, String), LocalUser>>,
}

impl MockUserLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, tenant: &str, identity: &str, user: LocalUser) -> Self {
        self.users
            .write()
            .unwrap()
            .insert((TenantKey::new(tenant), identity.to_string()), user);
        self
    }
}

#[async_trait]
impl UserLookup for MockUserLookup {
    async fn find_by_identity(
        &self,
        tenant: &TenantKey,
        identity: &str,
    ) -> AuthResult<Option<LocalUser>> {
        let users = self.users.read().unwrap();
        Ok(users.get(&(tenant.clone(), identity.to_string())).cloned())
    }
}

/// Token issuer recording every principal it was asked to mint a token for.
#[derive(Default)]
pub struct MockTokenIssuer {
    issued: Mutex<Vec<(IdpAuthenticationToken, TokenRequest)>>,
}

impl MockTokenIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> Vec<(IdpAuthenticationToken, TokenRequest)> {
        self.issued.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenIssuer for MockTokenIssuer {
    async fn issue(
        &self,
        authentication: &IdpAuthenticationToken,
        request: &TokenRequest,
    ) -> AuthResult<TokenResponse> {
        self.issued
            .lock()
            .unwrap()
            .push((authentication.clone(), request.clone()));
        Ok(TokenResponse::bearer(
            format!("local-token-for-{}", authentication.principal()),
            3600,
        ))
    }
}

/// Installs a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("uaa_federation=debug")
        .with_test_writer()
        .try_init();
}

/// Wraps a value for sharing with the components under test.
pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}

//! Remote JWKS fetching against a local HTTP server.

mod common;

use std::sync::Arc;

use common::*;
use uaa_federation::config::{IngestConfig, JwksCacheConfig};
use uaa_federation::federation::{
    ConfigIngestor, JwksCache, JwksError, JwksSource, RemoteJwksSource, TenantJwksSource,
};
use uaa_federation::TenantKey;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_config() -> JwksCacheConfig {
    JwksCacheConfig::default().with_allow_http(true)
}

/// Ingestor with a complete `acme` configuration whose client points at `endpoint`.
fn ingestor_with_endpoint(endpoint: &str) -> Arc<ConfigIngestor> {
    let ingestor = shared(ConfigIngestor::new(&IngestConfig::default()).unwrap());
    ingestor.on_refresh(
        &public_path("acme"),
        &format!(
            r#"
config:
  jwksSourceType: remote
  clients:
    - key: auth0_main
      clientId: cid1
      issuer: https://idp.example.com
      jwksEndpoint: "{endpoint}"
"#
        ),
    );
    ingestor.on_refresh(&private_path("acme"), &private_doc("auth0_main", "secret"));
    ingestor
}

async fn serve_jwks(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetch_returns_document_body() {
    let server = MockServer::start().await;
    let document = jwks_document(&[key_a()]);
    serve_jwks(&server, document.clone()).await;

    let ingestor = shared(ConfigIngestor::new(&IngestConfig::default()).unwrap());
    let source = RemoteJwksSource::new(ingestor, http_config()).unwrap();

    let body = source
        .fetch(&format!("{}/jwks.json", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, document);
}

#[tokio::test]
async fn server_error_maps_to_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let ingestor = shared(ConfigIngestor::new(&IngestConfig::default()).unwrap());
    let source = RemoteJwksSource::new(ingestor, http_config()).unwrap();

    let result = source.fetch(&format!("{}/jwks.json", server.uri())).await;
    assert!(matches!(result, Err(JwksError::HttpError(500))));
}

#[tokio::test]
async fn oversized_response_is_rejected() {
    let server = MockServer::start().await;
    serve_jwks(&server, "x".repeat(4096)).await;

    let ingestor = shared(ConfigIngestor::new(&IngestConfig::default()).unwrap());
    let source =
        RemoteJwksSource::new(ingestor, http_config().with_max_response_size(1024)).unwrap();

    let result = source.fetch(&format!("{}/jwks.json", server.uri())).await;
    assert!(matches!(
        result,
        Err(JwksError::ResponseTooLarge { max_size: 1024 })
    ));
}

#[tokio::test]
async fn source_collects_documents_from_applicable_clients() {
    let server = MockServer::start().await;
    serve_jwks(&server, jwks_document(&[key_a()])).await;

    let ingestor = ingestor_with_endpoint(&format!("{}/jwks.json", server.uri()));
    let source = RemoteJwksSource::new(ingestor, http_config()).unwrap();

    let documents = source.fetch_raw_jwks(&TenantKey::new("acme")).await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].client_key.as_str(), "auth0_main");

    assert!(
        source
            .fetch_raw_jwks(&TenantKey::new("globex"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn remote_tenant_resolves_keys_end_to_end() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(jwks_document(&[key_a()])))
        .expect(1)
        .mount(&server)
        .await;

    let ingestor = ingestor_with_endpoint(&format!("{}/jwks.json", server.uri()));
    let remote = shared(RemoteJwksSource::new(ingestor.clone(), http_config()).unwrap());
    let config_source = shared(MockJwksSource::new());
    let source = TenantJwksSource::new(ingestor, config_source.clone(), remote);
    let cache = JwksCache::new(Arc::new(source), http_config());
    let tenant = TenantKey::new("acme");

    // Second lookup is served from the cache.
    for _ in 0..2 {
        assert!(
            cache
                .get_definition_load_if_necessary(&tenant, "key-a")
                .await
                .unwrap()
                .is_some()
        );
    }
    assert_eq!(config_source.calls(), 0);
    assert_eq!(cache.reload_count(), 1);
}

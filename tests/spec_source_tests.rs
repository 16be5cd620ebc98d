//! API description loading against a mock server

mod common;

use portal_mcp::Error;
use portal_mcp::error::SpecLoadKind;
use portal_mcp::spec::SpecSource;
use pretty_assertions::assert_eq;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::SPEC_PATH;

async fn serve_fixture(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(SPEC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::fixture()))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn source(server: &MockServer) -> SpecSource {
    SpecSource::new(format!("{}{SPEC_PATH}", server.uri()), Client::new())
}

fn load_kind(err: &Error) -> Option<SpecLoadKind> {
    match err {
        Error::SpecLoad { kind, .. } => Some(*kind),
        _ => None,
    }
}

#[tokio::test]
async fn load_parses_and_caches() {
    let server = MockServer::start().await;
    serve_fixture(&server, 1).await;
    let source = source(&server);

    assert!(source.info().is_none());
    let doc = source.load().await.unwrap();
    assert_eq!(doc.version, "1.0");
    assert_eq!(doc.paths.len(), 5);

    let info = source.info().unwrap();
    assert_eq!(info.title, "API REST do Portal da Transparência do Governo Federal");
    assert_eq!(info.path_count, 5);

    // Served from cache: the mock expects exactly one request
    let again = source.get().await.unwrap();
    assert_eq!(again.version, "1.0");
}

#[tokio::test]
async fn get_loads_on_first_use() {
    let server = MockServer::start().await;
    serve_fixture(&server, 1).await;
    let source = source(&server);

    assert!(source.cached().is_none());
    source.get().await.unwrap();
    source.get().await.unwrap();
    assert!(source.cached().is_some());
}

#[tokio::test]
async fn clear_cache_forces_a_refetch() {
    let server = MockServer::start().await;
    serve_fixture(&server, 2).await;
    let source = source(&server);

    source.get().await.unwrap();
    source.clear_cache();
    assert!(source.info().is_none());
    source.get().await.unwrap();
}

#[tokio::test]
async fn auth_headers_are_sent_with_the_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPEC_PATH))
        .and(header("chave-api-dados", common::API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::fixture()))
        .expect(1)
        .mount(&server)
        .await;

    let mut headers = HeaderMap::new();
    headers.insert("chave-api-dados", HeaderValue::from_static(common::API_KEY));
    source(&server).with_auth_headers(headers).load().await.unwrap();
}

#[tokio::test]
async fn server_error_is_a_network_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("manutenção"))
        .mount(&server)
        .await;

    let err = source(&server).load().await.unwrap_err();
    assert_eq!(load_kind(&err), Some(SpecLoadKind::Network));
}

#[tokio::test]
async fn invalid_document_is_a_validation_failure_and_keeps_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPEC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::fixture()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SPEC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "openapi": "3.0.1",
            "info": {"title": "sem paths", "version": "9"}
        })))
        .mount(&server)
        .await;

    let source = source(&server);
    source.load().await.unwrap();

    let err = source.load().await.unwrap_err();
    assert_eq!(load_kind(&err), Some(SpecLoadKind::Validation));
    assert_eq!(source.info().unwrap().version, "1.0");
}

#[tokio::test]
async fn unparseable_body_is_a_validation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>erro</html>: ["))
        .mount(&server)
        .await;

    let err = source(&server).load().await.unwrap_err();
    assert_eq!(load_kind(&err), Some(SpecLoadKind::Validation));
}

#[tokio::test]
async fn yaml_documents_are_accepted() {
    let server = MockServer::start().await;
    let yaml = serde_yaml::to_string(&common::fixture()).unwrap();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(yaml))
        .mount(&server)
        .await;

    let doc = source(&server).load().await.unwrap();
    assert_eq!(doc.operations().count(), 5);
}

#[tokio::test]
async fn detect_changes_compares_info_versions() {
    let server = MockServer::start().await;
    serve_fixture(&server, 2).await;
    Mock::given(method("GET"))
        .and(path("/v4/api-docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::fixture_v2()))
        .expect(1)
        .mount(&server)
        .await;

    let source = source(&server);
    // Same URL: loads into the cache, then compares against a fresh copy
    assert!(!source.detect_changes(None).await.unwrap());

    let alternate = format!("{}/v4/api-docs", server.uri());
    assert!(source.detect_changes(Some(&alternate)).await.unwrap());

    // The comparison document never replaces the cached one
    assert_eq!(source.info().unwrap().version, "1.0");
}

//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use portal_mcp::credential::CredentialProvider;
use portal_mcp::router::InvocationRouter;
use portal_mcp::server::PortalServer;
use portal_mcp::spec::{ApiDescription, SpecSource, parse_document};
use portal_mcp::tools::{ToolDeriver, ToolTable};
use reqwest::Client;
use serde_json::Value;

/// Path the mock server publishes the description under
pub const SPEC_PATH: &str = "/v3/api-docs";

/// Test API key
pub const API_KEY: &str = "test-key-0123456789";

/// Raw fixture document
pub fn fixture_text() -> &'static str {
    include_str!("../fixtures/portal_api.json")
}

/// Fixture document as JSON
pub fn fixture() -> Value {
    serde_json::from_str(fixture_text()).unwrap()
}

/// Fixture with a different `info.version` and one more path
pub fn fixture_v2() -> Value {
    let mut doc = fixture();
    doc["info"]["version"] = "2.0".into();
    doc["paths"]["/api-de-dados/viagens"] = serde_json::json!({
        "get": {
            "summary": "Consulta viagens",
            "operationId": "viagensUsingGET",
            "parameters": [
                {"name": "pagina", "in": "query", "required": true, "schema": {"type": "integer"}}
            ]
        }
    });
    doc
}

/// Parsed fixture
pub fn description() -> ApiDescription {
    parse_document(fixture_text()).unwrap()
}

/// Tools derived from the fixture
pub fn table() -> ToolTable {
    ToolDeriver::derive(&description())
}

/// Credential provider with an optional key
pub fn credentials(key: Option<&str>) -> Arc<CredentialProvider> {
    Arc::new(
        CredentialProvider::new(Client::new(), "http://127.0.0.1:9/").with_key(key.map(str::to_string)),
    )
}

/// Router against `base_url`
pub fn router(base_url: &str, key: Option<&str>) -> InvocationRouter {
    InvocationRouter::new(Client::new(), base_url, credentials(key)).unwrap()
}

/// Server whose description and API both live at `base_url`
pub fn server(base_url: &str, key: Option<&str>) -> PortalServer {
    let client = Client::new();
    let credentials = credentials(key);
    let source = SpecSource::new(format!("{base_url}{SPEC_PATH}"), client.clone())
        .with_auth_headers(credentials.headers(None));
    let router = InvocationRouter::new(client, base_url, Arc::clone(&credentials)).unwrap();
    PortalServer::new(source, credentials, router)
}

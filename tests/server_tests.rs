//! End-to-end server tests: description load, MCP requests, stdio transport

mod common;

use std::sync::Arc;

use portal_mcp::error::rpc_codes;
use portal_mcp::protocol::{JsonRpcRequest, RequestId};
use portal_mcp::server::{DISCOVERY_TOOL, serve};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{API_KEY, SPEC_PATH};

async fn mock_portal() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPEC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::fixture()))
        .mount(&server)
        .await;
    server
}

fn call(id: i64, name: &str, arguments: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: RequestId::Number(id),
        method: "tools/call".to_string(),
        params: Some(json!({"name": name, "arguments": arguments})),
    }
}

#[tokio::test]
async fn tools_list_follows_document_order() {
    let portal = mock_portal().await;
    let server = common::server(&portal.uri(), None);

    assert_eq!(server.load().await.unwrap(), 4);

    let names: Vec<String> = server.list_tools().tools.into_iter().map(|t| t.name).collect();
    assert_eq!(
        names,
        vec![
            "portal_orgaos_siafi_consultar_14",
            "portal_por_orgao_despesaspororgao",
            "portal_despesas_despesasdoorgao",
            "portal_notas_registrarnota",
        ]
    );

    let tools = server.list_tools().tools;
    let siafi = tools
        .iter()
        .find(|t| t.name == "portal_orgaos_siafi_consultar_14")
        .unwrap();
    assert_eq!(siafi.description.as_deref(), Some("Consulta os órgãos SIAFI"));
    assert_eq!(siafi.input_schema["required"], json!(["pagina"]));
    assert_eq!(siafi.input_schema["properties"]["pagina"]["type"], "number");
}

#[tokio::test]
async fn discovery_lists_every_tool_without_credentials() {
    let portal = mock_portal().await;
    let server = common::server(&portal.uri(), None);
    server.load().await.unwrap();
    let before = portal.received_requests().await.unwrap().len();

    let result = server.call_tool(DISCOVERY_TOOL, Value::Null).await.unwrap();
    let text = result.content[0].as_text();

    assert!(text.contains("- portal_orgaos_siafi_consultar_14: Consulta os órgãos SIAFI"));
    assert!(text.contains("- portal_despesas_despesasdoorgao: Despesas mensais de um órgão"));
    assert!(!text.contains("Carregando"));
    assert_eq!(portal.received_requests().await.unwrap().len(), before);
}

#[tokio::test]
async fn remote_error_becomes_json_rpc_error_with_data() {
    let portal = mock_portal().await;
    Mock::given(method("GET"))
        .and(path("/api-de-dados/orgaos-siafi"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .expect(1)
        .mount(&portal)
        .await;

    let server = common::server(&portal.uri(), Some(API_KEY));
    server.load().await.unwrap();

    let response = server
        .handle_request(call(3, "portal_orgaos_siafi_consultar_14", json!({"pagina": 1})))
        .await;

    assert_eq!(response.id, Some(RequestId::Number(3)));
    let error = response.error.unwrap();
    assert_eq!(error.code, rpc_codes::REMOTE_CALL_FAILED);
    assert_eq!(error.message, "API Error: 404 Not Found - not found");
    assert_eq!(
        error.data,
        Some(json!({"status": 404, "statusText": "Not Found", "body": "not found"}))
    );
}

#[tokio::test]
async fn failed_load_keeps_the_discovery_placeholder() {
    let portal = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&portal)
        .await;

    let server = common::server(&portal.uri(), None);
    assert!(server.load().await.is_err());
    assert!(server.tools().is_none());

    let tools = server.list_tools().tools;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, DISCOVERY_TOOL);
}

#[tokio::test]
async fn refresh_swaps_in_the_new_tool_table() {
    let portal = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SPEC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::fixture()))
        .up_to_n_times(1)
        .mount(&portal)
        .await;
    Mock::given(method("GET"))
        .and(path(SPEC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::fixture_v2()))
        .mount(&portal)
        .await;

    let server = common::server(&portal.uri(), None);
    server.load().await.unwrap();
    let old = server.tools().unwrap();
    assert!(!old.contains("portal_viagens_viagens"));

    assert!(server.refresh_if_changed().await.unwrap());
    let new = server.tools().unwrap();
    assert!(new.contains("portal_viagens_viagens"));
    assert_eq!(new.len(), old.len() + 1);

    // Snapshots taken before the swap are unaffected
    assert!(!old.contains("portal_viagens_viagens"));

    assert!(!server.refresh_if_changed().await.unwrap());
}

#[tokio::test]
async fn stdio_round_trip() {
    let portal = mock_portal().await;
    Mock::given(method("GET"))
        .and(path("/api-de-dados/orgaos/26000/despesas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"valor": 1}])))
        .mount(&portal)
        .await;

    let server = Arc::new(common::server(&portal.uri(), Some(API_KEY)));
    server.load().await.unwrap();

    let input = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
            "protocolVersion": "2024-11-05", "capabilities": {},
            "clientInfo": {"name": "test", "version": "0"}
        }}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {
            "name": "portal_despesas_despesasdoorgao",
            "arguments": {"codigo": "26000", "mesAno": 202401}
        }}),
        json!({"jsonrpc": "2.0", "id": 4, "method": "ping"}),
        json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"}),
    ]
    .iter()
    .map(Value::to_string)
    .chain(["".to_string(), "{broken".to_string()])
    .collect::<Vec<_>>()
    .join("\n")
        + "\n";

    let (writer, mut output) = tokio::io::duplex(256 * 1024);
    serve(server, input.as_bytes(), writer).await.unwrap();

    let mut raw = String::new();
    output.read_to_string(&mut raw).await.unwrap();
    let responses: Vec<Value> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    // One response per request, none for the notification or blank line
    assert_eq!(responses.len(), 6);

    let by_id = |id: i64| {
        responses
            .iter()
            .find(|r| r["id"] == json!(id))
            .unwrap_or_else(|| panic!("no response for id {id}"))
    };

    assert_eq!(by_id(1)["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(by_id(1)["result"]["serverInfo"]["name"], "portal-transparencia-mcp");
    assert_eq!(by_id(2)["result"]["tools"].as_array().unwrap().len(), 4);
    assert_eq!(
        by_id(3)["result"]["content"][0]["text"],
        serde_json::to_string_pretty(&json!([{"valor": 1}])).unwrap()
    );
    assert_eq!(by_id(4)["result"], json!({}));
    assert_eq!(by_id(5)["error"]["code"], rpc_codes::METHOD_NOT_FOUND);

    let parse_error = responses.iter().find(|r| r["id"].is_null()).unwrap();
    assert_eq!(parse_error["error"]["code"], rpc_codes::PARSE_ERROR);
}

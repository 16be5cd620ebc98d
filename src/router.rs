//! Tool invocation: argument placement and the outbound HTTP call

use std::sync::Arc;

use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::credential::CredentialProvider;
use crate::error::{RemoteCallError, rpc_codes};
use crate::protocol::{Content, ToolsCallResult};
use crate::tools::{ToolDescriptor, ToolTable};
use crate::{Error, Result};

/// Base URL of the Portal da Transparência API
pub const DEFAULT_BASE_URL: &str = "https://api.portaldatransparencia.gov.br";

/// Routes tool calls to the remote API
pub struct InvocationRouter {
    client: Client,
    base_url: Url,
    credentials: Arc<CredentialProvider>,
}

/// Where the non-path arguments of a call go
#[derive(Debug, PartialEq)]
enum Placement {
    /// Already appended to the URL
    Query,
    Body(Value),
}

impl InvocationRouter {
    /// Create a router for `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `base_url` is not an absolute
    /// hierarchical URL.
    pub fn new(
        client: Client,
        base_url: &str,
        credentials: Arc<CredentialProvider>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("Base URL '{base_url}' cannot carry a path")));
        }
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `name` in `table` and perform the call
    ///
    /// The call is attempted exactly once.
    ///
    /// # Errors
    ///
    /// - [`Error::ToolNotFound`] if the table has no such tool; nothing is sent
    /// - [`Error::JsonRpc`] with `INVALID_PARAMS` if `args` is neither an
    ///   object nor null
    /// - [`Error::RemoteCall`] on a transport failure or non-2xx answer
    pub async fn dispatch(
        &self,
        table: &ToolTable,
        name: &str,
        args: Value,
    ) -> Result<ToolsCallResult> {
        let tool = table
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;

        let args = match args {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(Error::json_rpc(
                    rpc_codes::INVALID_PARAMS,
                    format!("Arguments must be an object, got {}", json_kind(&other)),
                ));
            }
        };

        let keys: Vec<&str> = args.keys().map(String::as_str).collect();
        info!(
            tool = %tool.name,
            method = %tool.method,
            path = %tool.path,
            args = ?keys,
            "Calling remote API"
        );

        let (url, placement) = self.build_request(tool, args)?;
        let value = self.send(tool, url, placement).await?;

        let text = serde_json::to_string_pretty(&value)?;
        Ok(ToolsCallResult {
            content: vec![Content::text(text)],
            is_error: false,
        })
    }

    /// Substitute path placeholders and split the rest into query or body
    fn build_request(
        &self,
        tool: &ToolDescriptor,
        mut args: Map<String, Value>,
    ) -> Result<(Url, Placement)> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::Config(format!("Base URL '{}' cannot carry a path", self.base_url)))?;
            segments.pop_if_empty();
            for template in tool.path.split('/').filter(|s| !s.is_empty()) {
                segments.push(&substitute_segment(template, &mut args));
            }
        }

        if tool.method.carries_body() && !args.is_empty() {
            return Ok((url, Placement::Body(Value::Object(args))));
        }

        let pairs: Vec<(&String, String)> = args
            .iter()
            .filter_map(|(k, v)| query_value(v).map(|v| (k, v)))
            .collect();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok((url, Placement::Query))
    }

    async fn send(&self, tool: &ToolDescriptor, url: Url, placement: Placement) -> Result<Value> {
        let mut request = self
            .client
            .request(tool.method.to_reqwest(), url)
            .headers(self.credentials.headers(None))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Placement::Body(body) = placement {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(tool, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(tool, e))?;

        if !status.is_success() {
            let err = RemoteCallError::Status {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            };
            if err.is_auth_rejected() {
                warn!(tool = %tool.name, status = status.as_u16(), "Remote API rejected the credential");
            } else {
                warn!(tool = %tool.name, status = status.as_u16(), "Remote API call failed");
            }
            return Err(err.into());
        }

        debug!(tool = %tool.name, status = status.as_u16(), bytes = body.len(), "Remote API call succeeded");
        // Non-JSON success bodies are passed through as a string
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

/// Transport failure described by the path template
///
/// The request URL is dropped from the error: it carries argument values.
fn transport_error(tool: &ToolDescriptor, e: reqwest::Error) -> RemoteCallError {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_body() || e.is_decode() {
        "body"
    } else {
        "transport"
    };
    RemoteCallError::Transport(format!(
        "{} {} ({kind}): {}",
        tool.method,
        tool.path,
        e.without_url()
    ))
}

/// Replace every `{name}` in one path segment that has a same-named argument
///
/// Used arguments are removed from `args`. Placeholders without an argument
/// are left in place.
fn substitute_segment(template: &str, args: &mut Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|i| open + i) else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..close];
        match args.remove(name) {
            Some(value) => out.push_str(&string_form(&value)),
            None => out.push_str(&rest[open..=close]),
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

/// String form of a value as it appears in a URL
fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Query string form; `None` for values that are omitted
fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        other => Some(string_form(other)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse_document;
    use crate::tools::ToolDeriver;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn router() -> InvocationRouter {
        let client = Client::new();
        let credentials = Arc::new(CredentialProvider::new(client.clone(), "http://127.0.0.1:9/"));
        InvocationRouter::new(client, "https://api.example.gov.br/", credentials).unwrap()
    }

    fn table() -> ToolTable {
        let doc = parse_document(
            r#"{
                "openapi": "3.0.1",
                "info": {"title": "t", "version": "1"},
                "paths": {
                    "/api-de-dados/orgaos/{codigo}/despesas": {
                        "get": {"operationId": "despesasUsingGET", "parameters": [
                            {"name": "codigo", "in": "path", "required": true, "schema": {"type": "string"}},
                            {"name": "ano", "in": "query", "schema": {"type": "integer"}}
                        ]},
                        "post": {"operationId": "criarUsingPOST", "parameters": [
                            {"name": "codigo", "in": "path", "required": true, "schema": {"type": "string"}}
                        ]}
                    }
                }
            }"#,
        )
        .unwrap();
        ToolDeriver::derive(&doc)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn path_and_query_are_partitioned() {
        let table = table();
        let tool = table.get("portal_despesas_despesas").unwrap();
        let (url, placement) = router()
            .build_request(tool, args(json!({"codigo": "26000", "ano": 2024})))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.gov.br/api-de-dados/orgaos/26000/despesas?ano=2024"
        );
        assert_eq!(placement, Placement::Query);
    }

    #[test]
    fn path_values_are_percent_encoded() {
        let table = table();
        let tool = table.get("portal_despesas_despesas").unwrap();
        let (url, _) = router()
            .build_request(tool, args(json!({"codigo": "a b/c"})))
            .unwrap();
        assert_eq!(url.path(), "/api-de-dados/orgaos/a%20b%2Fc/despesas");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn null_and_empty_query_values_are_skipped() {
        let table = table();
        let tool = table.get("portal_despesas_despesas").unwrap();
        let (url, _) = router()
            .build_request(tool, args(json!({"codigo": 1, "ano": null, "pagina": "", "ativo": true})))
            .unwrap();
        assert_eq!(url.query(), Some("ativo=true"));
    }

    #[test]
    fn body_methods_send_remaining_args_as_json() {
        let table = table();
        let tool = table.get("portal_despesas_criar").unwrap();
        let (url, placement) = router()
            .build_request(tool, args(json!({"codigo": "1", "valor": 10, "nota": {"n": 1}})))
            .unwrap();
        assert_eq!(url.query(), None);
        assert_eq!(placement, Placement::Body(json!({"valor": 10, "nota": {"n": 1}})));
    }

    #[test]
    fn body_method_without_remaining_args_uses_query() {
        let table = table();
        let tool = table.get("portal_despesas_criar").unwrap();
        let (_, placement) = router()
            .build_request(tool, args(json!({"codigo": "1"})))
            .unwrap();
        assert_eq!(placement, Placement::Query);
    }

    #[test]
    fn missing_placeholder_argument_is_left_in_place() {
        let mut args = Map::new();
        assert_eq!(substitute_segment("{codigo}", &mut args), "{codigo}");
        args.insert("a".into(), json!(1));
        args.insert("b".into(), json!("x"));
        assert_eq!(substitute_segment("{a}-{b}.json", &mut args), "1-x.json");
        assert!(args.is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_fails_before_any_request() {
        let err = router()
            .dispatch(&table(), "portal_nao_existe", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(ref n) if n == "portal_nao_existe"));
    }

    #[tokio::test]
    async fn non_object_arguments_are_rejected() {
        let err = router()
            .dispatch(&table(), "portal_despesas_despesas", json!([1, 2]))
            .await
            .unwrap_err();
        assert_eq!(err.to_rpc_code(), rpc_codes::INVALID_PARAMS);
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let client = Client::new();
        let credentials = Arc::new(CredentialProvider::new(client.clone(), "http://127.0.0.1:9/"));
        assert!(matches!(
            InvocationRouter::new(client, "not a url", credentials),
            Err(Error::Config(_))
        ));
    }
}

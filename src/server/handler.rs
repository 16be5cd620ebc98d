//! MCP request handling

use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::credential::CredentialProvider;
use crate::error::rpc_codes;
use crate::protocol::{
    Content, Info, InitializeResult, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    PROTOCOL_VERSION, RequestId, ServerCapabilities, Tool, ToolAnnotations, ToolsCallParams,
    ToolsCallResult, ToolsCapability, ToolsListResult,
};
use crate::router::InvocationRouter;
use crate::spec::SpecSource;
use crate::tools::{DISCOVERY_TOOL, ToolDeriver, ToolTable};
use crate::{Error, Result};

/// Name announced in `serverInfo`
pub const SERVER_NAME: &str = "portal-transparencia-mcp";

/// Where to request an API key
pub const SIGNUP_URL: &str = "https://api.portaldatransparencia.gov.br/api-de-dados/cadastrar-email";

/// MCP server state: the description source, the credential and the current tool table
pub struct PortalServer {
    source: SpecSource,
    credentials: Arc<CredentialProvider>,
    router: InvocationRouter,
    /// `None` until the first successful load
    tools: RwLock<Option<Arc<ToolTable>>>,
}

impl PortalServer {
    /// Create a server with no tools loaded yet
    #[must_use]
    pub fn new(
        source: SpecSource,
        credentials: Arc<CredentialProvider>,
        router: InvocationRouter,
    ) -> Self {
        Self {
            source,
            credentials,
            router,
            tools: RwLock::new(None),
        }
    }

    /// Description source
    #[must_use]
    pub fn source(&self) -> &SpecSource {
        &self.source
    }

    /// Credential provider
    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialProvider> {
        &self.credentials
    }

    /// Fetch the description and install a freshly derived tool table
    ///
    /// Returns the number of tools. On failure the previous table, if any,
    /// stays in place.
    ///
    /// # Errors
    ///
    /// Propagates [`SpecSource::load`] failures.
    pub async fn load(&self) -> Result<usize> {
        let doc = self.source.load().await?;
        let table = Arc::new(ToolDeriver::derive(&doc));
        let count = table.len();
        *self.tools.write() = Some(table);
        info!(tools = count, "Tool table installed");
        Ok(count)
    }

    /// Reload when the remote description version changed
    ///
    /// Returns whether a reload happened.
    ///
    /// # Errors
    ///
    /// Propagates comparison and load failures.
    pub async fn refresh_if_changed(&self) -> Result<bool> {
        if !self.source.detect_changes(None).await? {
            debug!("API description unchanged");
            return Ok(false);
        }
        info!("API description changed, reloading tools");
        self.load().await?;
        Ok(true)
    }

    /// Current tool table snapshot
    #[must_use]
    pub fn tools(&self) -> Option<Arc<ToolTable>> {
        self.tools.read().clone()
    }

    /// Result of `initialize`
    #[must_use]
    pub fn initialize_result() -> InitializeResult {
        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
            },
            server_info: Info {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Portal da Transparência".to_string()),
            },
            instructions: None,
        }
    }

    /// Result of `tools/list`
    ///
    /// Before the first load only the discovery tool is listed.
    #[must_use]
    pub fn list_tools(&self) -> ToolsListResult {
        let tools = match self.tools() {
            Some(table) => table.to_mcp_tools(),
            None => vec![discovery_tool()],
        };
        ToolsListResult {
            tools,
            next_cursor: None,
        }
    }

    /// Execute `tools/call`
    ///
    /// # Errors
    ///
    /// [`Error::ToolNotFound`] for unknown names, otherwise whatever
    /// [`InvocationRouter::dispatch`] reports.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResult> {
        if name == DISCOVERY_TOOL {
            return Ok(ToolsCallResult {
                content: vec![Content::text(self.discovery_text())],
                is_error: false,
            });
        }

        let Some(table) = self.tools() else {
            return Err(Error::ToolNotFound(name.to_string()));
        };
        self.router.dispatch(&table, name, arguments).await
    }

    /// Human-readable overview of the server and its tools
    #[must_use]
    pub fn discovery_text(&self) -> String {
        let mut text = String::from(
            "Portal da Transparência MCP Server\n\n\
             Este servidor oferece acesso a todos os endpoints da API do Portal da Transparência do Brasil.\n\n\
             Para usar as ferramentas, configure a variável de ambiente PORTAL_API_KEY com sua chave de API.\n\n\
             Ferramentas disponíveis:\n",
        );
        match self.tools() {
            Some(table) => {
                for tool in table.iter() {
                    let _ = writeln!(text, "- {}: {}", tool.name, tool.description);
                }
            }
            None => text.push_str("Carregando ferramentas...\n"),
        }
        let _ = write!(text, "\nPara obter uma API key, visite: {SIGNUP_URL}");
        text
    }

    /// Handle one inbound message; notifications yield no response
    pub async fn handle_message(&self, message: JsonRpcMessage) -> Option<JsonRpcResponse> {
        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                debug!(notification = %notification.method, "Handling notification");
                None
            }
        }
    }

    /// Handle one request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;
        debug!(method = %method, id = %id, "Handling request");

        let result = match method.as_str() {
            "initialize" => to_value(&Self::initialize_result()),
            "ping" => Ok(json!({})),
            "tools/list" => to_value(&self.list_tools()),
            "tools/call" => self.handle_tools_call(params).await,
            _ => Err(Error::json_rpc(
                rpc_codes::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            )),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => error_response(Some(id), &e),
        }
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value> {
        let params: ToolsCallParams = params
            .ok_or_else(|| Error::json_rpc(rpc_codes::INVALID_PARAMS, "Missing params"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| {
                    Error::json_rpc(rpc_codes::INVALID_PARAMS, format!("Invalid tools/call params: {e}"))
                })
            })?;

        match self.call_tool(&params.name, params.arguments).await {
            Ok(result) => to_value(&result),
            Err(e) => {
                match e {
                    Error::ToolNotFound(_) => warn!(tool = %params.name, "Unknown tool"),
                    _ => error!(tool = %params.name, error = %e, "Tool call failed"),
                }
                Err(e)
            }
        }
    }
}

/// JSON-RPC error response carrying the error's code and data
#[must_use]
pub fn error_response(id: Option<RequestId>, e: &Error) -> JsonRpcResponse {
    JsonRpcResponse::error_with_data(id, e.to_rpc_code(), e.to_string(), e.rpc_data())
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn discovery_tool() -> Tool {
    Tool {
        name: DISCOVERY_TOOL.to_string(),
        title: None,
        description: Some("Descobrir ferramentas disponíveis no Portal da Transparência".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {},
            "required": []
        }),
        output_schema: None,
        annotations: Some(ToolAnnotations {
            read_only_hint: Some(true),
            open_world_hint: Some(false),
            ..ToolAnnotations::default()
        }),
    }
}

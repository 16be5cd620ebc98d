//! Error types for the Portal da Transparência MCP server

use std::fmt;
use std::io;

use serde_json::json;
use thiserror::Error;

/// Result type alias for the portal server
pub type Result<T> = std::result::Result<T, Error>;

/// Portal server errors
#[derive(Error, Debug)]
pub enum Error {
    /// The API description document could not be fetched or validated
    #[error("Failed to load API description ({kind}): {message}")]
    SpecLoad {
        /// Whether the network call or the validation pass failed
        kind: SpecLoadKind,
        /// Human-readable cause
        message: String,
    },

    /// Malformed credential input
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Invocation references an unknown tool
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The remote data provider rejected or failed the call
    #[error(transparent)]
    RemoteCall(#[from] RemoteCallError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON-RPC error
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc {
        /// Error code
        code: i32,
        /// Error message
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which stage of an API description load failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecLoadKind {
    /// HTTP request failed or returned a non-success status
    Network,
    /// Document could not be parsed or failed validation
    Validation,
}

impl fmt::Display for SpecLoadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::Validation => f.write_str("validation"),
        }
    }
}

/// Failure of an outbound call to the remote data provider
#[derive(Error, Debug)]
pub enum RemoteCallError {
    /// The remote answered with a non-success status
    #[error("API Error: {status} {status_text} - {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase (may be empty)
        status_text: String,
        /// Response body, verbatim
        body: String,
    },

    /// The request never produced a response (DNS, connect, reset, ...)
    #[error("Request failed: {0}")]
    Transport(String),
}

impl RemoteCallError {
    /// True when the remote rejected the credential (401/403)
    #[must_use]
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }

    /// HTTP status, if the remote answered at all
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }
}

impl Error {
    /// Create a spec-load error caused by the network
    pub fn spec_network(message: impl Into<String>) -> Self {
        Self::SpecLoad {
            kind: SpecLoadKind::Network,
            message: message.into(),
        }
    }

    /// Create a spec-load error caused by validation
    pub fn spec_validation(message: impl Into<String>) -> Self {
        Self::SpecLoad {
            kind: SpecLoadKind::Validation,
            message: message.into(),
        }
    }

    /// Create a JSON-RPC error
    pub fn json_rpc(code: i32, message: impl Into<String>) -> Self {
        Self::JsonRpc {
            code,
            message: message.into(),
        }
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::JsonRpc { code, .. } => *code,
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::Protocol(_) => rpc_codes::INVALID_REQUEST,
            Self::ToolNotFound(_) => rpc_codes::TOOL_NOT_FOUND,
            Self::RemoteCall(_) => rpc_codes::REMOTE_CALL_FAILED,
            Self::InvalidCredential(_) => rpc_codes::INVALID_CREDENTIAL,
            Self::SpecLoad { .. } => rpc_codes::SPEC_UNAVAILABLE,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }

    /// Structured detail attached to the JSON-RPC error, if any
    #[must_use]
    pub fn rpc_data(&self) -> Option<serde_json::Value> {
        match self {
            Self::RemoteCall(RemoteCallError::Status {
                status,
                status_text,
                body,
            }) => Some(json!({
                "status": status,
                "statusText": status_text,
                "body": body,
            })),
            Self::ToolNotFound(name) => Some(json!({ "tool": name })),
            Self::SpecLoad { kind, .. } => Some(json!({ "kind": kind.to_string() })),
            _ => None,
        }
    }
}

/// Standard JSON-RPC error codes plus the server-specific range
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Unknown tool name
    pub const TOOL_NOT_FOUND: i32 = -32001;
    /// Remote data provider call failed
    pub const REMOTE_CALL_FAILED: i32 = -32002;
    /// Credential rejected at the API boundary
    pub const INVALID_CREDENTIAL: i32 = -32003;
    /// API description could not be loaded
    pub const SPEC_UNAVAILABLE: i32 = -32004;
}

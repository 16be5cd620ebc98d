//! MCP server: request handling and the stdio transport

mod handler;
mod stdio;

pub use crate::tools::DISCOVERY_TOOL;
pub use handler::{PortalServer, SERVER_NAME, SIGNUP_URL, error_response};
pub use stdio::{serve, serve_stdio};

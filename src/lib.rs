//! Portal da Transparência MCP server
//!
//! Exposes the Brazilian Portal da Transparência REST API to MCP clients.
//! The tool list is not hand-written: it is derived at startup from the
//! API's published `OpenAPI` description.
//!
//! # Components
//!
//! - [`spec::SpecSource`] fetches, validates and caches the description
//! - [`credential::CredentialProvider`] holds the optional API key
//! - [`tools::ToolDeriver`] turns operations into named tools
//! - [`router::InvocationRouter`] performs tool calls against the API
//! - [`server::PortalServer`] answers MCP requests over stdio
//!
//! # Protocol Version
//!
//! Implements MCP protocol version 2024-11-05.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod credential;
pub mod error;
pub mod health;
pub mod protocol;
pub mod router;
pub mod server;
pub mod spec;
pub mod tools;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// Logs go to stderr; stdout carries the protocol. `RUST_LOG` takes
/// precedence over `level`.
///
/// # Errors
///
/// Returns [`Error::Config`] if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let result = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}

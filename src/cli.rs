//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// MCP server exposing the Portal da Transparência API as tools
#[derive(Parser, Debug)]
#[command(name = "portal-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PORTAL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// API description URL (overrides the config file)
    #[arg(long, global = true)]
    pub spec_url: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve MCP over stdio (default)
    Serve,

    /// Print the tools derived from the API description
    Tools {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show title, version and path count of the API description
    SpecInfo {
        /// Also report whether the description at this URL has a different version
        #[arg(long)]
        compare: Option<String>,
    },

    /// Check the configured (or given) API key
    CheckKey {
        /// Key to check instead of the configured one
        #[arg(long, env = "PORTAL_CHECK_KEY", hide_env_values = true)]
        key: Option<String>,

        /// Also probe the remote test endpoint with the key
        #[arg(long)]
        remote: bool,
    },
}

/// Output format for listings
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned text columns
    Table,
    /// Pretty-printed JSON
    Json,
}

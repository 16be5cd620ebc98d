//! Portal da Transparência MCP server

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use portal_mcp::{
    Result,
    cli::{Cli, Command, OutputFormat},
    config::Config,
    credential::{CredentialProvider, mask_key},
    health,
    router::InvocationRouter,
    server::{PortalServer, serve_stdio},
    setup_tracing,
    spec::{PrimitiveKind, SpecSource},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config.with_spec_url(cli.spec_url.clone()),
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let server = match build_server(&config) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!(error = %e, "Failed to initialize server");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Tools { format }) => run_tools(&server, format).await,
        Some(Command::SpecInfo { compare }) => run_spec_info(&server, compare.as_deref()).await,
        Some(Command::CheckKey { key, remote }) => {
            run_check_key(server.credentials(), key.as_deref(), remote).await
        }
        Some(Command::Serve) | None => run_server(server, &config).await,
    }
}

fn build_server(config: &Config) -> Result<PortalServer> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("portal-mcp/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| portal_mcp::Error::Config(format!("Failed to build HTTP client: {e}")))?;

    let credentials = Arc::new(
        CredentialProvider::new(client.clone(), config.test_endpoint())
            .with_key(config.api_key.clone())
            .with_header_name(&config.header_name)?,
    );
    let source = SpecSource::new(config.spec_url.clone(), client.clone())
        .with_auth_headers(credentials.headers(None));
    let router = InvocationRouter::new(client, &config.base_url, Arc::clone(&credentials))?;

    Ok(PortalServer::new(source, credentials, router))
}

/// Load the description, then serve MCP over stdio
async fn run_server(server: Arc<PortalServer>, config: &Config) -> ExitCode {
    info!("============================================================");
    info!("PORTAL DA TRANSPARÊNCIA MCP v{}", env!("CARGO_PKG_VERSION"));
    info!("============================================================");

    match server.credentials().mask() {
        Some(masked) => info!(key = %masked, "API key configured"),
        None => warn!("PORTAL_API_KEY not set; calls are sent unauthenticated"),
    }

    if let Err(e) = server.load().await {
        error!(error = %e, "Failed to load API description");
        return ExitCode::FAILURE;
    }

    if config.health.enabled {
        health::spawn(&config.health).await;
    }

    if let Some(period) = config.spec_refresh {
        spawn_refresh(Arc::clone(&server), period);
    }

    match serve_stdio(server).await {
        Ok(()) => {
            info!("stdin closed, shutting down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "stdio transport failed");
            ExitCode::FAILURE
        }
    }
}

/// Periodically reload the tools when the remote description version changes
fn spawn_refresh(server: Arc<PortalServer>, period: Duration) {
    info!(period = ?period, "API description refresh enabled");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            match server.refresh_if_changed().await {
                Ok(true) => info!("Tools reloaded after API description change"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "API description refresh failed"),
            }
        }
    });
}

/// Print the derived tools
async fn run_tools(server: &PortalServer, format: OutputFormat) -> ExitCode {
    if let Err(e) = server.load().await {
        eprintln!("Failed to load API description: {e}");
        return ExitCode::FAILURE;
    }
    let Some(table) = server.tools() else {
        return ExitCode::FAILURE;
    };

    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&table.to_mcp_tools()) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize tools: {e}");
                return ExitCode::FAILURE;
            }
        },
        OutputFormat::Table => {
            let width = table.names().map(str::len).max().unwrap_or(0);
            for tool in table.iter() {
                let returns = tool
                    .operation
                    .response_kind
                    .map_or("-", PrimitiveKind::json_type);
                println!(
                    "{:<width$}  {:<7} {:<7} {}",
                    tool.name,
                    tool.method.as_str(),
                    returns,
                    tool.path
                );
            }
            println!("\n{} tool(s)", table.len());
        }
    }
    ExitCode::SUCCESS
}

/// Print description metadata, optionally comparing versions
async fn run_spec_info(server: &PortalServer, compare: Option<&str>) -> ExitCode {
    let source = server.source();
    let doc = match source.load().await {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("Failed to load API description: {e}");
            return ExitCode::FAILURE;
        }
    };

    let info = doc.info();
    println!("URL:     {}", source.url());
    println!("Title:   {}", info.title);
    println!("Version: {}", info.version);
    println!("Paths:   {}", info.path_count);

    if let Some(url) = compare {
        match source.detect_changes(Some(url)).await {
            Ok(changed) => println!("Changed: {changed} (compared with {url})"),
            Err(e) => {
                eprintln!("Failed to compare with {url}: {e}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

/// Report the masked key, its format validity and optionally a remote check
async fn run_check_key(credentials: &CredentialProvider, key: Option<&str>, remote: bool) -> ExitCode {
    let masked = key.map(mask_key).or_else(|| credentials.mask());
    let Some(masked) = masked else {
        eprintln!("No API key configured (set PORTAL_API_KEY or pass --key)");
        return ExitCode::FAILURE;
    };

    let format_ok = credentials.validate_format(key);
    println!("Key:     {masked}");
    println!("Header:  {}", credentials.header_name());
    println!("Format:  {}", if format_ok { "valid" } else { "invalid" });

    if !remote {
        return if format_ok { ExitCode::SUCCESS } else { ExitCode::FAILURE };
    }

    let accepted = credentials.test_remote(key).await;
    println!("Remote:  {}", if accepted { "accepted" } else { "rejected" });
    if format_ok && accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

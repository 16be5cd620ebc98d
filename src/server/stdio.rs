//! Newline-delimited JSON-RPC over stdin/stdout
//!
//! Lines are read in order; every request runs on its own task so slow
//! remote calls do not block the reader. Responses are funnelled through a
//! single writer so lines never interleave.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::handler::{PortalServer, error_response};
use crate::error::rpc_codes;
use crate::protocol::{JsonRpcMessage, JsonRpcResponse, RequestId};
use crate::{Error, Result};

/// Outbound queue depth
const RESPONSE_CHANNEL_CAPACITY: usize = 256;

/// Serve on the process's stdin/stdout until stdin closes
///
/// # Errors
///
/// Returns [`Error::Io`] if stdin cannot be read or stdout cannot be written.
pub async fn serve_stdio(server: Arc<PortalServer>) -> Result<()> {
    serve(server, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve on arbitrary streams until `reader` reaches EOF
///
/// Returns once every in-flight request has been answered.
///
/// # Errors
///
/// Returns [`Error::Io`] on read or write failure.
pub async fn serve<R, W>(server: Arc<PortalServer>, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<JsonRpcResponse>(RESPONSE_CHANNEL_CAPACITY);
    let writer_task = tokio::spawn(write_responses(rx, writer));

    info!("Serving MCP over stdio");
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message = match parse_line(line) {
            Ok(message) => message,
            Err(response) => {
                if tx.send(*response).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let server = Arc::clone(&server);
        let tx = tx.clone();
        tokio::spawn(async move {
            let Some(response) = server.handle_message(message).await else {
                return;
            };
            if tx.send(response).await.is_err() {
                warn!("Response dropped: writer closed");
            }
        });
    }

    debug!("stdin closed, draining responses");
    drop(tx);
    writer_task
        .await
        .map_err(|e| Error::Protocol(format!("Writer task failed: {e}")))?
}

/// Parse one line; unparseable input becomes a ready-made error response
fn parse_line(line: &str) -> std::result::Result<JsonRpcMessage, Box<JsonRpcResponse>> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        warn!(error = %e, "Invalid JSON on stdin");
        Box::new(error_response(None, &Error::from(e)))
    })?;

    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
    serde_json::from_value(value).map_err(|e| {
        warn!(error = %e, "Invalid JSON-RPC message");
        Box::new(JsonRpcResponse::error(
            id,
            rpc_codes::INVALID_REQUEST,
            format!("Invalid request: {e}"),
        ))
    })
}

async fn write_responses<W>(mut rx: mpsc::Receiver<JsonRpcResponse>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = match serde_json::to_string(&response) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to serialize response");
                continue;
            }
        };
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

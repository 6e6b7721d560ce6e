// JPDA MCP Server - Java debugging via Model Context Protocol
//
// Exposes the jpda-core debugger engine as LLM-friendly tools over stdio

use anyhow::{Context, Result};
use jpda_core::DebuggerConfig;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

mod handlers;
mod protocol;
mod session;
mod tools;

use handlers::RequestHandler;
use protocol::*;

async fn write_message<W: AsyncWrite + Unpin>(out: &mut W, response: &JsonRpcResponse) -> Result<()> {
    let text = serde_json::to_string(response)?;
    debug!("Sending: {}", text);
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing to stderr only - stdout is reserved for JSON-RPC protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jpda_mcp=info".parse()?)
                .add_directive("jpda_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting JPDA MCP Server...");

    let config = DebuggerConfig::load().context("loading debugger configuration")?;
    let handler = RequestHandler::new(config);

    // Stdio transport - no network, no files
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    info!("JPDA MCP server ready, waiting for requests...");

    // Single-threaded message loop
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!("Client disconnected");
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                debug!("Received: {}", line);

                let value = match serde_json::from_str::<Value>(line) {
                    Ok(value) => value,
                    Err(e) => {
                        error!("Parse error: {}", e);
                        let response = JsonRpcResponse::failure(
                            Value::Null,
                            JsonRpcError::new(PARSE_ERROR, "Parse error"),
                        );
                        write_message(&mut stdout, &response).await?;
                        continue;
                    }
                };

                // Requests carry an id; notifications do not
                if value.get("id").is_some() {
                    let response = match serde_json::from_value::<JsonRpcRequest>(value) {
                        Ok(request) => handler.handle_request(request).await,
                        Err(e) => {
                            error!("Invalid request: {}", e);
                            JsonRpcResponse::failure(
                                Value::Null,
                                JsonRpcError::new(INVALID_REQUEST, "Invalid request"),
                            )
                        }
                    };
                    write_message(&mut stdout, &response).await?;
                } else {
                    match serde_json::from_value::<JsonRpcNotification>(value) {
                        Ok(notification) => handler.handle_notification(notification).await,
                        Err(e) => error!("Invalid notification: {}", e),
                    }
                }
            }
            Err(e) => {
                error!("Read error: {}", e);
                break;
            }
        }
    }

    handler.shutdown().await;
    info!("JPDA MCP server shutting down");
    Ok(())
}

//! Line-delimited JSON-RPC over stdin/stdout.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::executor::{CommandExecutor, CommandExecutorError};

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const COMMAND_FAILED: i32 = -32000;
/// Failed command whose cause is user input the client should show as-is.
const INPUT_REJECTED: i32 = -32001;

pub async fn serve_stdio(executor: CommandExecutor) -> Result<()> {
    serve(executor, BufReader::new(io::stdin()), io::stdout()).await
}

/// Serves requests from `reader` until it reaches end of input.
pub async fn serve<R, W>(executor: CommandExecutor, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = String::new();
    loop {
        buffer.clear();
        let bytes = reader.read_line(&mut buffer).await?;
        if bytes == 0 {
            info!(target: "bstock_transport", "STDIO closed; shutting down");
            break;
        }
        if buffer.trim().is_empty() {
            continue;
        }

        debug!(target: "bstock_transport", request = buffer.trim());
        let maybe_response = match serde_json::from_str::<RpcRequest>(&buffer) {
            Ok(request) => handle_request(&executor, request).await,
            Err(error) => {
                warn!(target: "bstock_transport", error = %error, "Failed to parse request");
                Some(RpcResponse::error(None, PARSE_ERROR, "Parse error"))
            }
        };

        if let Some(response) = maybe_response {
            let payload = serde_json::to_string(&response)?;
            writer.write_all(payload.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

impl RpcResponse {
    fn result(id: Option<Value>, value: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(value),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

async fn handle_request(executor: &CommandExecutor, request: RpcRequest) -> Option<RpcResponse> {
    let RpcRequest { id, method, params } = request;

    let Some(id) = id else {
        match method.as_str() {
            "notifications/initialized" => {
                info!(target: "bstock_transport", "Client signaled initialized");
            }
            other => {
                debug!(
                    target: "bstock_transport",
                    method = other,
                    "Ignoring notification without handler"
                );
            }
        }
        return None;
    };

    let response = match method.as_str() {
        "initialize" => RpcResponse::result(
            Some(id),
            json!({
                "protocolVersion": "0.1.0",
                "serverInfo": {
                    "name": "bstock-beacon",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": {
                    "commands": {}
                }
            }),
        ),
        "list_commands" | "commands/list" => {
            let definitions = executor.list_commands().await;
            RpcResponse::result(Some(id), json!({ "commands": definitions }))
        }
        "call_command" | "commands/call" => call_command(executor, id, params).await,
        other => RpcResponse::error(Some(id), METHOD_NOT_FOUND, format!("Unknown method: {other}")),
    };
    Some(response)
}

async fn call_command(executor: &CommandExecutor, id: Value, params: Option<Value>) -> RpcResponse {
    let params = params.unwrap_or_else(|| json!({}));
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    let Some(name_value) = params.get("name") else {
        return RpcResponse::error(Some(id), INVALID_PARAMS, "Missing command name");
    };
    let Some(name) = name_value.as_str() else {
        return RpcResponse::error(Some(id), INVALID_PARAMS, "Command name must be a string");
    };

    match executor.call_command(name, arguments).await {
        Ok(response) => match serde_json::to_value(response) {
            Ok(value) => RpcResponse::result(Some(id), value),
            Err(error) => RpcResponse::error(Some(id), COMMAND_FAILED, error.to_string()),
        },
        Err(CommandExecutorError::UnknownCommand(name)) => {
            RpcResponse::error(Some(id), METHOD_NOT_FOUND, format!("Unknown command: {name}"))
        }
        Err(error) => match error.input_error() {
            Some(input) => RpcResponse::error(Some(id), INPUT_REJECTED, input.to_string()),
            None => RpcResponse::error(Some(id), COMMAND_FAILED, error.to_string()),
        },
    }
}

//! The stdio MCP transport loop.
//!
//! Stdout is reserved exclusively for protocol responses — never for logs,
//! never for human-readable status text. Requests are line-delimited JSON
//! read from stdin; responses are line-delimited JSON written to stdout and
//! flushed immediately. Requests are handled strictly serially (§5 of the
//! controller spec): the loop awaits one request, dispatches it to the
//! `Controller`, writes the response, and only then reads the next line.

use std::io;

use serde_json::{json, Value};
use stratum_core::messages::{CallToolRequest, Tool};
use stratum_core::protocol::{tool_catalog, Controller, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Run the server loop until stdin is closed (EOF). Returns `Ok(())` on a
/// clean shutdown; an `Err` here indicates a transport-level I/O failure,
/// which the caller maps to exit code 2.
pub async fn run() -> io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);
    let mut controller = Controller::new();
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            tracing::info!("stdin closed, shutting down");
            return Ok(());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = handle_line(&mut controller, trimmed);
        if let Some(response) = response {
            let mut encoded = serde_json::to_string(&response)
                .unwrap_or_else(|_| json!({"jsonrpc": "2.0", "id": Value::Null}).to_string());
            encoded.push('\n');
            stdout.write_all(encoded.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
}

/// Decode and dispatch a single request line. Returns `None` for
/// notifications (no `id`), which never receive a response per JSON-RPC 2.0.
fn handle_line(controller: &mut Controller, line: &str) -> Option<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(err) => {
            tracing::warn!(%err, "failed to parse request");
            return Some(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError {
                    code: JsonRpcError::PARSE_ERROR,
                    message: err.to_string(),
                },
            ));
        }
    };

    let is_notification = request.id.is_none();
    let id = request.id.clone().unwrap_or(Value::Null);

    let result = dispatch(controller, &request);

    if is_notification {
        return None;
    }

    Some(match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(err) => JsonRpcResponse::failure(id, err),
    })
}

fn dispatch(controller: &mut Controller, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
    match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": { "name": "stratum", "version": env!("CARGO_PKG_VERSION") },
            "capabilities": { "tools": {} },
        })),
        "notifications/initialized" | "ping" => Ok(Value::Null),
        "tools/list" => {
            let tools: Vec<Tool> = tool_catalog();
            Ok(json!({ "tools": tools }))
        }
        "tools/call" => {
            let call_request: CallToolRequest = serde_json::from_value(request.params.clone())
                .map_err(|err| JsonRpcError::invalid_params(err.to_string()))?;
            let response = controller.call_tool(&call_request);
            serde_json::to_value(response).map_err(|err| JsonRpcError {
                code: JsonRpcError::INTERNAL_ERROR,
                message: err.to_string(),
            })
        }
        other => Err(JsonRpcError::method_not_found(other)),
    }
}

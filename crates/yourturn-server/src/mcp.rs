//! MCP over stdio
//!
//! Line-delimited JSON-RPC 2.0. Each request runs on its own task so a long
//! `your_turn` wait never blocks `tools/list` or `initialize`; responses are
//! written by a single writer task.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use yourturn_core::timeout_from_secs;
use yourturn_session::ResponseCollector;

use crate::config::ToolConfig;
use crate::message::{build_reply, render_question};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "your-turn-server";
pub const TOOL_NAME: &str = "your_turn";

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Absent (or null) for notifications
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YourTurnArgs {
    #[serde(default)]
    reason: Option<String>,
}

fn tool_definition() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": "Alert the user and wait for their reply through the configured messaging channel. Returns the reply, or a notice when none arrives before the timeout.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "reason": {
                    "type": "string",
                    "description": "Optional reason for the notification (e.g. 'mission completed', 'need user input')"
                }
            },
            "additionalProperties": false
        }
    })
}

pub struct McpServer {
    collector: Arc<ResponseCollector>,
    tool: ToolConfig,
}

impl McpServer {
    pub fn new(collector: Arc<ResponseCollector>, tool: ToolConfig) -> Self {
        Self { collector, tool }
    }

    /// Handle one request; notifications yield no response
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            debug!("Received notification {}", request.method);
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            ),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({"tools": [tool_definition()]})),
            "tools/call" => self.call_tool(id, request.params).await,
            other => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("Unknown method: {}", other)),
        };

        Some(response)
    }

    async fn call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match serde_json::from_value(params.unwrap_or(Value::Null)) {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::failure(id, INVALID_PARAMS, format!("Invalid params: {}", e));
            }
        };

        if params.name != TOOL_NAME {
            return JsonRpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("Unknown tool: {}", params.name),
            );
        }

        let args = match params.arguments {
            None | Some(Value::Null) => YourTurnArgs::default(),
            Some(arguments) => match serde_json::from_value(arguments) {
                Ok(args) => args,
                Err(e) => {
                    return JsonRpcResponse::failure(
                        id,
                        INVALID_PARAMS,
                        format!("Invalid arguments for {}: {}", TOOL_NAME, e),
                    );
                }
            },
        };

        let text = self.your_turn(args.reason.as_deref().unwrap_or_default()).await;
        JsonRpcResponse::success(id, json!({"content": [{"type": "text", "text": text}]}))
    }

    async fn your_turn(&self, reason: &str) -> String {
        info!("your_turn called with reason: {:?}", reason);

        let question = render_question(&self.tool.question_template, reason);
        let timeout = timeout_from_secs(self.tool.timeout_secs);
        let result = self.collector.collect_response(&question, None, timeout).await;

        info!(
            "Returning your_turn result (response received: {})",
            result.response.is_some()
        );
        build_reply(reason, &result, &self.tool, timeout)
    }

    /// Serve requests from `reader` until EOF
    ///
    /// Requests still in flight at EOF are cancelled; nobody is left to read
    /// their responses.
    pub async fn run<R, W>(self: Arc<Self>, reader: R, writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(response) = rx.recv().await {
                let mut line = serde_json::to_vec(&response)?;
                line.push(b'\n');
                writer.write_all(&line).await?;
                writer.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let mut requests = JoinSet::new();
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(line) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Skipping malformed message: {}", e);
                    continue;
                }
            };

            let server = self.clone();
            let tx = tx.clone();
            requests.spawn(async move {
                if let Some(response) = server.handle(request).await {
                    // Only fails once the writer is gone
                    let _ = tx.send(response);
                }
            });

            // Reap finished requests as we go
            while requests.try_join_next().is_some() {}
        }

        info!("stdin closed, shutting down MCP loop");
        drop(tx);
        requests.shutdown().await;

        writer_task.await.map_err(std::io::Error::other)?
    }
}

use crate::app::App;
use crate::config::RuntimeConfig;
use crate::constants::dhis2::RESPONSE_EVENT;
use crate::constants::mcp::{CANCELLED_NOTIFICATION, DATA_NOTIFICATION, PROTOCOL_VERSION, SERVER_NAME};
use crate::errors::{ErrorCode, McpError, ToolError};
use crate::mcp::catalog::{list_tools, validate_tool_args};
use crate::mcp::envelope::build_envelope;
use crate::mcp::help;
use crate::mcp::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::services::tool_executor::ToolCallMeta;
use crate::utils::redact::redact_object;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio_util::sync::CancellationToken;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn encode<T: Serialize>(message: &T) -> String {
    serde_json::to_string(message).unwrap_or_default()
}

fn request_id(line: &str) -> Option<Value> {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|message| message.get("id").cloned())
        .filter(|id| !id.is_null())
}

/// `params.requestId` of a `notifications/cancelled` line.
fn cancelled_request(line: &str) -> Option<Value> {
    let message = serde_json::from_str::<Value>(line).ok()?;
    if message.get("method").and_then(|v| v.as_str()) != Some(CANCELLED_NOTIFICATION) {
        return None;
    }
    message
        .get("params")
        .and_then(|params| params.get("requestId"))
        .cloned()
        .filter(|id| !id.is_null())
}

pub struct McpServer {
    app: Arc<App>,
}

impl McpServer {
    pub fn new(app: App) -> Self {
        Self { app: Arc::new(app) }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    fn handle_tools_list(&self) -> Value {
        serde_json::json!({ "tools": list_tools() })
    }

    async fn handle_tools_call(
        &self,
        name: &str,
        raw_args: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, McpError> {
        let args = if raw_args.is_null() {
            Value::Object(Default::default())
        } else {
            raw_args
        };
        let executor = &self.app.tool_executor;
        if name != "help" && !executor.has_tool(name) {
            return Err(McpError::from_tool_error(name, &executor.unknown_tool_error(name)));
        }
        validate_tool_args(name, &args)?;

        let payload = if name == "help" {
            let meta = ToolCallMeta::from_args(&args);
            let result = help::build_help_payload(&self.app, &args)
                .map_err(|err| McpError::from_tool_error(name, &err))?;
            executor.wrap_result(name, &args, result, &meta)
        } else {
            executor
                .execute_cancellable(name, args.clone(), cancel.clone())
                .await
                .map_err(|err| McpError::from_tool_error(name, &err))?
        };

        let meta = payload.get("meta");
        let tool_result = payload.get("result").cloned().unwrap_or(Value::Null);
        let action = args.get("action").and_then(|v| v.as_str());
        let envelope = build_envelope(name, action, &tool_result, meta);

        Ok(serde_json::json!({
            "content": [ { "type": "text", "text": encode(&envelope) } ]
        }))
    }

    /// Response for one parsed request, `None` for notifications.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        cancel: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        if request.method.starts_with("notifications/") {
            return None;
        }
        let id = request.id?;
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.handle_initialize()),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => JsonRpcResponse::success(id, self.handle_tools_list()),
            "tools/call" => {
                let params = request.params.as_object().cloned().unwrap_or_default();
                let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
                if name.is_empty() {
                    JsonRpcResponse::failure(
                        id,
                        ErrorCode::InvalidParams.as_i32(),
                        "Missing tool name".to_string(),
                    )
                } else {
                    let args = params.get("arguments").cloned().unwrap_or(Value::Null);
                    match self.handle_tools_call(name, args, cancel).await {
                        Ok(result) => JsonRpcResponse::success(id, result),
                        Err(err) => JsonRpcResponse::failure(id, err.code.as_i32(), err.message),
                    }
                }
            }
            _ => JsonRpcResponse::failure(
                id,
                ErrorCode::MethodNotFound.as_i32(),
                "Method not found".to_string(),
            ),
        };
        Some(response)
    }

    /// Handles one input line and returns the lines to write back: pending
    /// data notifications first, then the response if there is one.
    pub async fn handle_line(&self, line: &str) -> Vec<String> {
        self.handle_line_with_cancel(line, &self.app.call_token())
            .await
    }

    pub async fn handle_line_with_cancel(&self, line: &str, cancel: &CancellationToken) -> Vec<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let parsed: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(_) => {
                return vec![encode(&JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::ParseError.as_i32(),
                    "Parse error".to_string(),
                ))]
            }
        };
        let request: JsonRpcRequest = match serde_json::from_value(parsed) {
            Ok(request) => request,
            Err(_) => {
                return vec![encode(&JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::InvalidRequest.as_i32(),
                    "Invalid request".to_string(),
                ))]
            }
        };

        let response = self.handle_request(request, cancel).await;
        let mut out: Vec<String> = self
            .app
            .drain_events()
            .into_iter()
            .map(|event| {
                // Upstream payloads go out untouched.
                let content = if event.kind == RESPONSE_EVENT {
                    event.content
                } else {
                    redact_object(&event.content)
                };
                let params = serde_json::json!({
                    "type": event.kind,
                    "content": content,
                });
                encode(&JsonRpcNotification::new(DATA_NOTIFICATION, params))
            })
            .collect();
        if let Some(response) = response {
            out.push(encode(&response));
        }
        out
    }

    /// Serves requests one at a time. Input keeps being read while a call is in
    /// flight so `notifications/cancelled` can reach it; everything else read
    /// meanwhile is queued. EOF lets the in-flight call finish.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<(), ToolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let shutdown = self.app.shutdown_token();
        let mut lines = reader.lines();
        let mut writer = writer;
        let mut queued: VecDeque<String> = VecDeque::new();
        let mut input_open = true;

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let line = match queued.pop_front() {
                Some(line) => line,
                None if !input_open => break,
                None => {
                    let next = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        next = lines.next_line() => next?,
                    };
                    match next {
                        Some(line) => line,
                        None => break,
                    }
                }
            };

            let in_flight = request_id(&line);
            let cancel = self.app.call_token();
            let call = self.handle_line_with_cancel(&line, &cancel);
            tokio::pin!(call);
            let messages = loop {
                tokio::select! {
                    biased;
                    messages = &mut call => break messages,
                    next = lines.next_line(), if input_open => match next? {
                        Some(next) => match (&in_flight, cancelled_request(&next)) {
                            (Some(id), Some(target)) if *id == target => {
                                self.app.logger.info(
                                    "Cancelling in-flight request",
                                    Some(&serde_json::json!({ "id": id })),
                                );
                                cancel.cancel();
                            }
                            _ => queued.push_back(next),
                        },
                        None => input_open = false,
                    },
                }
            };

            for message in messages {
                writer.write_all(message.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            writer.flush().await?;
        }
        self.app.shutdown();
        self.app.logger.info("Input closed, shutting down", None);
        Ok(())
    }

    pub async fn run_stdio(&self) -> Result<(), ToolError> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = BufWriter::new(tokio::io::stdout());
        self.run(reader, writer).await
    }
}

pub async fn run_stdio(config: RuntimeConfig) -> Result<(), ToolError> {
    let server = McpServer::new(App::initialize(config)?);
    let shutdown = server.app().shutdown_token();
    let logger = server.app().logger.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                logger.info("Received SIGINT, cancelling in-flight calls", None);
                shutdown.cancel();
            }
            Err(err) => logger.warn(
                "Failed to listen for SIGINT",
                Some(&serde_json::json!({ "error": err.to_string() })),
            ),
        }
    });
    server.run_stdio().await
}

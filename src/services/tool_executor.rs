use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::utils::redact::redact_object;
use crate::utils::suggest::suggest;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

const TRACE_KEYS: &[&str] = &["trace_id", "span_id", "parent_span_id"];

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, args: Value) -> Result<Value, ToolError>;

    /// Handlers that wait on the network override this to stop when `cancel` fires.
    async fn handle_cancellable(
        &self,
        args: Value,
        cancel: CancellationToken,
    ) -> Result<Value, ToolError> {
        let _ = cancel;
        self.handle(args).await
    }
}

#[derive(Debug, Clone)]
pub struct ToolCallMeta {
    pub started_at: i64,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
}

impl ToolCallMeta {
    pub fn from_args(args: &Value) -> Self {
        let read = |key: &str| {
            args.get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_string())
        };
        Self {
            started_at: chrono::Utc::now().timestamp_millis(),
            trace_id: read("trace_id").unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            span_id: read("span_id").unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            parent_span_id: read("parent_span_id"),
        }
    }

    pub fn duration_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis() - self.started_at
    }
}

/// Routes tool calls by name and wraps handler output as `{ok, result, meta}`.
#[derive(Clone)]
pub struct ToolExecutor {
    logger: Logger,
    handlers: Arc<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolExecutor {
    pub fn new(logger: Logger, handlers: HashMap<String, Arc<dyn ToolHandler>>) -> Self {
        Self {
            logger: logger.child("executor"),
            handlers: Arc::new(handlers),
        }
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.handlers.contains_key(tool)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn unknown_tool_error(&self, tool: &str) -> ToolError {
        let suggestions = suggest(tool, &self.tool_names(), 3);
        let hint = if suggestions.is_empty() {
            "Call help() to list available tools".to_string()
        } else {
            format!(
                "Did you mean: {} (or call help() for the full list)",
                suggestions.join(", ")
            )
        };
        ToolError::invalid_params(format!("Unknown tool: {}", tool))
            .with_code("UNKNOWN_TOOL")
            .with_hint(hint)
    }

    pub fn wrap_result(&self, tool: &str, args: &Value, result: Value, meta: &ToolCallMeta) -> Value {
        serde_json::json!({
            "ok": true,
            "result": result,
            "meta": {
                "tool": tool,
                "action": args.get("action").cloned().unwrap_or(Value::Null),
                "trace_id": meta.trace_id,
                "span_id": meta.span_id,
                "parent_span_id": meta.parent_span_id,
                "duration_ms": meta.duration_ms(),
            },
        })
    }

    pub async fn execute(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        self.dispatch(tool, args, None).await
    }

    /// Like [`ToolExecutor::execute`], ending early once `cancel` fires.
    pub async fn execute_cancellable(
        &self,
        tool: &str,
        args: Value,
        cancel: CancellationToken,
    ) -> Result<Value, ToolError> {
        self.dispatch(tool, args, Some(cancel)).await
    }

    async fn dispatch(
        &self,
        tool: &str,
        args: Value,
        cancel: Option<CancellationToken>,
    ) -> Result<Value, ToolError> {
        let Some(handler) = self.handlers.get(tool) else {
            return Err(self.unknown_tool_error(tool));
        };
        let meta = ToolCallMeta::from_args(&args);

        let mut cleaned = args.clone();
        if let Value::Object(map) = &mut cleaned {
            for key in TRACE_KEYS {
                map.remove(*key);
            }
        }

        self.logger.debug(
            tool,
            Some(&serde_json::json!({
                "trace_id": meta.trace_id,
                "args": redact_object(&cleaned),
            })),
        );

        let outcome = match cancel {
            Some(cancel) => handler.handle_cancellable(cleaned, cancel).await,
            None => handler.handle(cleaned).await,
        };
        match outcome {
            Ok(result) => Ok(self.wrap_result(tool, &args, result, &meta)),
            Err(err) => {
                self.logger.warn(
                    "Tool call failed",
                    Some(&serde_json::json!({
                        "tool": tool,
                        "trace_id": meta.trace_id,
                        "kind": err.kind,
                        "code": err.code,
                        "message": err.message,
                        "duration_ms": meta.duration_ms(),
                    })),
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::logger::LogLevel;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn handle(&self, args: Value) -> Result<Value, ToolError> {
            Ok(args)
        }
    }

    fn executor() -> ToolExecutor {
        let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        handlers.insert("list_instances".to_string(), Arc::new(Echo));
        ToolExecutor::new(Logger::with_level("test", LogLevel::Error), handlers)
    }

    #[tokio::test]
    async fn trace_fields_are_stripped_and_echoed_in_meta() {
        let out = executor()
            .execute(
                "list_instances",
                json!({"filter": "all", "trace_id": "t-1", "span_id": "s-1"}),
            )
            .await
            .unwrap();
        assert_eq!(out["ok"], true);
        assert_eq!(out["result"], json!({"filter": "all"}));
        assert_eq!(out["meta"]["trace_id"], "t-1");
        assert_eq!(out["meta"]["tool"], "list_instances");
    }

    #[tokio::test]
    async fn unknown_tool_suggests_close_names() {
        let err = executor().execute("list_instance", json!({})).await.unwrap_err();
        assert_eq!(err.code, "UNKNOWN_TOOL");
        assert!(err.hint.unwrap_or_default().contains("list_instances"));
    }
}

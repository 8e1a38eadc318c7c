use crate::constants::mcp::VERBATIM_RESULT_TOOLS;
use crate::utils::redact::redact_object;
use serde_json::Value;

fn meta_field(meta: Option<&Value>, key: &str) -> Value {
    meta.and_then(|m| m.get(key)).cloned().unwrap_or(Value::Null)
}

/// Text payload of a successful `tools/call`. `success` mirrors the tool
/// result when it reports one (proxy records do), otherwise true. Proxy
/// records go out as-is; everything else is redacted.
pub fn build_envelope(
    tool_name: &str,
    action_name: Option<&str>,
    tool_result: &Value,
    meta: Option<&Value>,
) -> Value {
    let success = tool_result
        .get("success")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    let duration_ms = meta
        .and_then(|m| m.get("duration_ms").and_then(|v| v.as_i64()))
        .unwrap_or(0);
    let result = if VERBATIM_RESULT_TOOLS.contains(&tool_name) {
        tool_result.clone()
    } else {
        redact_object(tool_result)
    };
    serde_json::json!({
        "success": success,
        "tool": tool_name,
        "action": action_name,
        "result": result,
        "duration_ms": duration_ms,
        "trace": {
            "trace_id": meta_field(meta, "trace_id"),
            "span_id": meta_field(meta, "span_id"),
            "parent_span_id": meta_field(meta, "parent_span_id"),
        },
    })
}

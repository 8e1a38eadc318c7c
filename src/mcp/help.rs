use crate::app::App;
use crate::constants::limits::SUGGESTION_LIMIT;
use crate::errors::ToolError;
use crate::mcp::catalog::{tool_by_name, tool_catalog, tool_names, ToolDef};
use crate::utils::suggest::suggest;
use serde_json::Value;

const OVERVIEW: &str = "Proxy for the DHIS2 Web API across the instances you registered. \
Use list_instances to see them, dhis_request to call any api/ endpoint, and dhis_instance \
to register, update, verify or remove an instance.";

fn actions_of(tool: &ToolDef) -> Vec<Value> {
    tool.input_schema
        .pointer("/properties/action/enum")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

fn describe(tool: &ToolDef) -> Value {
    let mut entry = serde_json::json!({
        "name": tool.name,
        "description": tool.description,
    });
    let actions = actions_of(tool);
    if !actions.is_empty() {
        entry["actions"] = Value::Array(actions);
    }
    entry
}

pub fn build_help_payload(app: &App, args: &Value) -> Result<Value, ToolError> {
    let requested = args
        .get("tool")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if let Some(name) = requested {
        let Some(tool) = tool_by_name(name) else {
            let suggestions = suggest(name, &tool_names(), SUGGESTION_LIMIT);
            let mut err = ToolError::not_found(format!("Unknown tool: {}", name))
                .with_code("UNKNOWN_TOOL");
            if !suggestions.is_empty() {
                err = err.with_hint(format!("Did you mean: {}", suggestions.join(", ")));
            }
            return Err(err);
        };
        let mut out = describe(tool);
        out["inputSchema"] = tool.input_schema.clone();
        return Ok(out);
    }

    let tools: Vec<Value> = tool_catalog().iter().map(describe).collect();
    Ok(serde_json::json!({
        "overview": OVERVIEW,
        "tools": tools,
        "logging": app.logger.stats(),
        "cache": app.cache.stats(),
    }))
}

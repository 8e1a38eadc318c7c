use crate::errors::ToolError;
use crate::utils::suggest::suggest;
use serde_json::Value;

pub fn unknown_action_error(tool: &str, action: Option<&Value>, known_actions: &[&str]) -> ToolError {
    let action_value = action.and_then(|v| v.as_str()).unwrap_or("").trim();
    let suggestions = suggest(action_value, known_actions, 3);

    let mut hint = format!("Use one of: {}.", known_actions.join(", "));
    if !suggestions.is_empty() {
        hint = format!("Did you mean: {}? {}", suggestions.join(", "), hint);
    }
    let message = if action_value.is_empty() {
        format!("{} requires an action", tool)
    } else {
        format!("Unknown {} action: {}", tool, action_value)
    };
    ToolError::invalid_params(message)
        .with_code("UNKNOWN_ACTION")
        .with_hint(hint)
        .with_details(serde_json::json!({
            "known_actions": known_actions,
            "did_you_mean": suggestions,
        }))
}

#[cfg(test)]
mod tests {
    use super::unknown_action_error;
    use serde_json::json;

    #[test]
    fn suggests_the_closest_action() {
        let err = unknown_action_error(
            "dhis_instance",
            Some(&json!("verfy")),
            &["create", "verify", "delete"],
        );
        assert_eq!(err.message, "Unknown dhis_instance action: verfy");
        assert!(err.hint.unwrap_or_default().starts_with("Did you mean: verify?"));
    }

    #[test]
    fn missing_action_is_reported_as_such() {
        let err = unknown_action_error("dhis_instance", None, &["create"]);
        assert_eq!(err.message, "dhis_instance requires an action");
    }
}

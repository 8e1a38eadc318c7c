use crate::constants::protocols::ALLOWED_HTTP;
use crate::errors::ToolError;
use serde_json::Value;

/// Argument checks shared by the tool handlers.
#[derive(Clone, Default)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_string(&self, value: &Value, label: &str) -> Result<String, ToolError> {
        let text = value.as_str().ok_or_else(|| {
            ToolError::invalid_params(format!("{} must be a non-empty string", label))
        })?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ToolError::invalid_params(format!(
                "{} must be a non-empty string",
                label
            )));
        }
        if trimmed.contains('\0') {
            return Err(ToolError::invalid_params(format!(
                "{} must not contain null bytes",
                label
            )));
        }
        Ok(trimmed.to_string())
    }

    pub fn ensure_required(&self, args: &Value, key: &str) -> Result<String, ToolError> {
        match args.get(key) {
            Some(value) if !value.is_null() => self.ensure_string(value, key),
            _ => Err(ToolError::invalid_params(format!("{} is required", key))),
        }
    }

    /// Absolute http(s) URL. Trailing slashes are kept; the request builder
    /// strips one when joining paths.
    pub fn ensure_instance_url(&self, value: &str) -> Result<String, ToolError> {
        let trimmed = value.trim();
        let parsed = url::Url::parse(trimmed).map_err(|err| {
            ToolError::invalid_params(format!("url is not a valid URL: {}", err))
                .with_hint("Use the DHIS2 base address, e.g. https://play.dhis2.org/dev")
        })?;
        if !ALLOWED_HTTP.contains(&parsed.scheme()) {
            return Err(ToolError::invalid_params(format!(
                "url must use http or https, got {}",
                parsed.scheme()
            )));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ToolError::invalid_params("url must include a host"));
        }
        Ok(trimmed.to_string())
    }
}

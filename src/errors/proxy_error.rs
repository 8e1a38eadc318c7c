use super::tool_error::ToolError;
use serde::Serialize;

pub type ProxyResult<T> = Result<T, ProxyError>;

/// Machine-readable failure kind carried in failure records and tool errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyErrorKind {
    Unauthenticated,
    NoInstances,
    InstanceNotFound,
    MissingCredentials,
    InvalidUrl,
    UpstreamHttp,
    Network,
    Decode,
    Timeout,
    Cancelled,
    Storage,
}

impl ProxyErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyErrorKind::Unauthenticated => "unauthenticated",
            ProxyErrorKind::NoInstances => "no_instances",
            ProxyErrorKind::InstanceNotFound => "instance_not_found",
            ProxyErrorKind::MissingCredentials => "missing_credentials",
            ProxyErrorKind::InvalidUrl => "invalid_url",
            ProxyErrorKind::UpstreamHttp => "upstream_http",
            ProxyErrorKind::Network => "network",
            ProxyErrorKind::Decode => "decode",
            ProxyErrorKind::Timeout => "timeout",
            ProxyErrorKind::Cancelled => "cancelled",
            ProxyErrorKind::Storage => "storage",
        }
    }
}

/// Every failure a resolution or execution step can produce.
///
/// Resolution steps (`NoInstances`, `InstanceNotFound`, `MissingCredentials`,
/// `InvalidUrl`) happen before any network I/O; the remaining kinds describe
/// what happened on the wire. Whether a kind aborts the agent turn is decided
/// by the caller through [`ProxyError::is_recoverable`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    #[error("User not authenticated")]
    Unauthenticated,

    #[error("No DHIS2 instances available. Please add an instance in Settings.")]
    NoInstances,

    #[error("Instance \"{identifier}\" not found. Available instances: {}", .known.join(", "))]
    InstanceNotFound {
        identifier: String,
        known: Vec<String>,
        suggestions: Vec<String>,
    },

    #[error("No authentication credentials available for instance \"{instance}\"")]
    MissingCredentials { instance: String },

    #[error("Invalid DHIS2 URL: {0}")]
    InvalidUrl(String),

    #[error("DHIS2 API error: {status} {status_text} - {body}")]
    UpstreamHttp {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("{0}")]
    Network(String),

    #[error("Failed to parse DHIS2 response as JSON: {0}")]
    Decode(String),

    #[error("DHIS2 request timed out after {0} ms")]
    Timeout(u64),

    #[error("DHIS2 request was cancelled")]
    Cancelled,

    #[error("Instance storage failed: {0}")]
    Storage(String),
}

impl ProxyError {
    pub fn kind(&self) -> ProxyErrorKind {
        match self {
            ProxyError::Unauthenticated => ProxyErrorKind::Unauthenticated,
            ProxyError::NoInstances => ProxyErrorKind::NoInstances,
            ProxyError::InstanceNotFound { .. } => ProxyErrorKind::InstanceNotFound,
            ProxyError::MissingCredentials { .. } => ProxyErrorKind::MissingCredentials,
            ProxyError::InvalidUrl(_) => ProxyErrorKind::InvalidUrl,
            ProxyError::UpstreamHttp { .. } => ProxyErrorKind::UpstreamHttp,
            ProxyError::Network(_) => ProxyErrorKind::Network,
            ProxyError::Decode(_) => ProxyErrorKind::Decode,
            ProxyError::Timeout(_) => ProxyErrorKind::Timeout,
            ProxyError::Cancelled => ProxyErrorKind::Cancelled,
            ProxyError::Storage(_) => ProxyErrorKind::Storage,
        }
    }

    /// Upstream and transport failures are reported in-band so the agent loop
    /// can reason about them; configuration mistakes abort the tool call.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ProxyErrorKind::UpstreamHttp
                | ProxyErrorKind::Network
                | ProxyErrorKind::Decode
                | ProxyErrorKind::Timeout
                | ProxyErrorKind::Cancelled
        )
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProxyError::UpstreamHttp { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            return ProxyError::Timeout(timeout_ms);
        }
        if err.is_decode() {
            return ProxyError::Decode(err.to_string());
        }
        ProxyError::Network(format!("Network error while calling DHIS2: {}", err))
    }
}

impl From<ProxyError> for ToolError {
    fn from(err: ProxyError) -> Self {
        let message = err.to_string();
        let tool_error = match &err {
            ProxyError::Unauthenticated => ToolError::denied(message),
            ProxyError::NoInstances => ToolError::not_found(message)
                .with_hint("Register an instance with dhis_instance action=create."),
            ProxyError::InstanceNotFound {
                known, suggestions, ..
            } => {
                let mut error = ToolError::not_found(message).with_details(serde_json::json!({
                    "known_instances": known,
                    "did_you_mean": suggestions,
                }));
                if !suggestions.is_empty() {
                    error = error.with_hint(format!("Did you mean: {}?", suggestions.join(", ")));
                }
                error
            }
            ProxyError::MissingCredentials { .. } => ToolError::invalid_params(message)
                .with_hint("Set an API token, or both username and password, on the instance."),
            ProxyError::InvalidUrl(_) => ToolError::invalid_params(message),
            ProxyError::Timeout(_) => ToolError::timeout(message),
            ProxyError::UpstreamHttp { .. }
            | ProxyError::Network(_)
            | ProxyError::Decode(_)
            | ProxyError::Cancelled => ToolError::retryable(message),
            ProxyError::Storage(_) => ToolError::internal(message),
        };
        tool_error.with_code(err.kind().as_str().to_uppercase())
    }
}

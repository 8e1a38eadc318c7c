use crate::constants::dhis2::{ME_PATH, SYSTEM_INFO_PATH};
use crate::constants::network::TIMEOUT_VERIFY_MS;
use crate::services::credentials::Credential;
use crate::services::logger::Logger;
use crate::services::request_builder::normalize_base_url;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

pub const AUTH_FAILED: &str = "Authentication failed. Please check your API token.";
pub const ENDPOINT_NOT_FOUND: &str = "DHIS2 API endpoint not found. Please check the URL.";
pub const VERIFY_FAILED: &str = "Failed to verify DHIS2 instance";
pub const VERIFY_UNKNOWN: &str = "Unknown error occurred while verifying DHIS2 instance";
pub const SYSTEM_INFO_FAILED: &str = "Failed to fetch DHIS2 system information";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub success: bool,
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationResult {
    fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

enum Probe {
    Body { status: StatusCode, data: Option<Value> },
    Http { status: StatusCode, message: String },
    Transport(reqwest::Error),
}

/// Introspection calls that confirm a base URL and credential actually work.
/// Nothing here writes to storage; callers persist the outcome.
#[derive(Clone)]
pub struct VerificationService {
    client: Client,
    timeout: Duration,
    logger: Logger,
}

impl VerificationService {
    pub fn new(client: Client, logger: Logger) -> Self {
        Self {
            client,
            timeout: Duration::from_millis(TIMEOUT_VERIFY_MS),
            logger: logger.child("verify"),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn verify(&self, url: &str, api_token: &str) -> VerificationResult {
        self.verify_credential(url, &Credential::ApiToken(api_token.to_string()))
            .await
    }

    pub async fn verify_credential(&self, url: &str, credential: &Credential) -> VerificationResult {
        match self.probe(url, ME_PATH, credential).await {
            Probe::Body { status, data } => match data {
                Some(data) if status == StatusCode::OK => VerificationResult::ok(data),
                _ => VerificationResult::failed(VERIFY_FAILED),
            },
            Probe::Http { status, message } => match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    VerificationResult::failed(AUTH_FAILED)
                }
                StatusCode::NOT_FOUND => VerificationResult::failed(ENDPOINT_NOT_FOUND),
                _ => VerificationResult::failed(format!("Connection error: {}", message)),
            },
            Probe::Transport(err) => {
                self.logger.warn(
                    "DHIS2 verification transport failure",
                    Some(&serde_json::json!({"url": url, "error": err.to_string()})),
                );
                VerificationResult::failed(VERIFY_UNKNOWN)
            }
        }
    }

    pub async fn fetch_system_info(&self, url: &str, credential: &Credential) -> VerificationResult {
        match self.probe(url, SYSTEM_INFO_PATH, credential).await {
            Probe::Body {
                status: StatusCode::OK,
                data: Some(data),
            } => VerificationResult::ok(data),
            Probe::Body { .. } => VerificationResult::failed(SYSTEM_INFO_FAILED),
            Probe::Http { status, .. } => VerificationResult::failed(request_failed(status)),
            Probe::Transport(err) => VerificationResult::failed(err.to_string()),
        }
    }

    async fn probe(&self, url: &str, path: &str, credential: &Credential) -> Probe {
        let target = format!("{}/{}", normalize_base_url(url), path);
        let response = self
            .client
            .get(&target)
            .header(AUTHORIZATION, credential.header_value())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(err) => return Probe::Transport(err),
        };
        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => return Probe::Transport(err),
        };
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|body| {
                    body.get("message")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                })
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| request_failed(status));
            return Probe::Http { status, message };
        }
        Probe::Body {
            status,
            data: parse_body(&text),
        }
    }
}

fn request_failed(status: StatusCode) -> String {
    format!("Request failed with status code {}", status.as_u16())
}

fn parse_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    let value =
        serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_string()));
    match &value {
        Value::Null | Value::Bool(false) => None,
        _ => Some(value),
    }
}

use crate::constants::dhis2::RESPONSE_EVENT;
use crate::constants::limits::ERROR_BODY_PREVIEW_BYTES;
use crate::errors::{ProxyError, ProxyErrorKind, ProxyResult};
use crate::models::Instance;
use crate::services::credentials::resolve_credential;
use crate::services::data_stream::DataStreamWriter;
use crate::services::logger::Logger;
use crate::services::request_builder::{build_url, normalize_api_path};
use crate::utils::text::preview;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_method(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    pub fn carries_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProxyRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// What the agent receives for every proxy call that got as far as the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRecord {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub instance_name: String,
    pub instance_url: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ProxyErrorKind>,
}

impl ProxyRecord {
    fn success(instance: &Instance, endpoint: String, status: u16, data: Value) -> Self {
        Self {
            success: true,
            status_code: Some(status),
            instance_name: instance.name.clone(),
            instance_url: instance.url.clone(),
            endpoint,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    fn failure(instance: &Instance, endpoint: String, err: &ProxyError) -> Self {
        Self {
            success: false,
            status_code: err.status_code(),
            instance_name: instance.name.clone(),
            instance_url: instance.url.clone(),
            endpoint,
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: u16,
    pub data: Value,
}

/// Issues authenticated calls against a resolved instance.
#[derive(Clone)]
pub struct ProxyExecutor {
    client: Client,
    timeout_ms: u64,
    stream: DataStreamWriter,
    logger: Logger,
}

impl ProxyExecutor {
    pub fn new(client: Client, timeout_ms: u64, stream: DataStreamWriter, logger: Logger) -> Self {
        Self {
            client,
            timeout_ms,
            stream,
            logger: logger.child("proxy"),
        }
    }

    /// One round trip with no policy applied; every failure is an `Err`.
    pub async fn send(
        &self,
        instance: &Instance,
        request: &ProxyRequest,
        cancel: &CancellationToken,
    ) -> ProxyResult<ProxyResponse> {
        let credential = resolve_credential(instance)?;
        let url = build_url(&instance.url, &request.path, &request.query)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&credential.header_value()).map_err(|_| {
            ProxyError::MissingCredentials {
                instance: instance.name.clone(),
            }
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let mut builder = self
            .client
            .request(request.method.as_method(), url.clone())
            .headers(headers);
        if self.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(self.timeout_ms));
        }
        if request.method.carries_body() {
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }
        }

        self.logger.debug(
            "DHIS2 request",
            Some(&serde_json::json!({
                "method": request.method.as_str(),
                "url": url.as_str(),
                "instance": instance.name,
                "auth": credential.scheme(),
            })),
        );

        let timeout_ms = self.timeout_ms;
        let round_trip = async move {
            let response = builder
                .send()
                .await
                .map_err(|err| ProxyError::from_reqwest(err, timeout_ms))?;
            read_response(response, timeout_ms).await
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProxyError::Cancelled),
            result = round_trip => result,
        }
    }

    /// Default policy: wire-level failures come back as `success: false`
    /// records, resolution failures propagate. Successful payloads are also
    /// published on the data stream.
    pub async fn execute(
        &self,
        instance: &Instance,
        request: &ProxyRequest,
        cancel: &CancellationToken,
    ) -> ProxyResult<ProxyRecord> {
        let endpoint = normalize_api_path(&request.path);
        let started = Instant::now();
        match self.send(instance, request, cancel).await {
            Ok(response) => {
                self.logger.info(
                    "DHIS2 request succeeded",
                    Some(&serde_json::json!({
                        "instance": instance.name,
                        "endpoint": endpoint,
                        "status": response.status,
                        "duration_ms": started.elapsed().as_millis() as u64,
                    })),
                );
                self.stream.write_data(RESPONSE_EVENT, response.data.clone());
                Ok(ProxyRecord::success(
                    instance,
                    endpoint,
                    response.status,
                    response.data,
                ))
            }
            Err(err) if err.is_recoverable() => {
                self.logger.warn(
                    "DHIS2 request failed",
                    Some(&serde_json::json!({
                        "instance": instance.name,
                        "endpoint": endpoint,
                        "kind": err.kind(),
                        "error": preview(&err.to_string(), ERROR_BODY_PREVIEW_BYTES),
                        "duration_ms": started.elapsed().as_millis() as u64,
                    })),
                );
                Ok(ProxyRecord::failure(instance, endpoint, &err))
            }
            Err(err) => Err(err),
        }
    }
}

async fn read_response(response: reqwest::Response, timeout_ms: u64) -> ProxyResult<ProxyResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProxyError::UpstreamHttp {
            status: status.as_u16(),
            status_text: status_text(status),
            body,
        });
    }
    if status == StatusCode::NO_CONTENT {
        return Ok(ProxyResponse {
            status: status.as_u16(),
            data: Value::Null,
        });
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|err| ProxyError::from_reqwest(err, timeout_ms))?;
    let data = serde_json::from_slice::<Value>(&bytes)
        .map_err(|err| ProxyError::Decode(err.to_string()))?;
    Ok(ProxyResponse {
        status: status.as_u16(),
        data,
    })
}

fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("").to_string()
}

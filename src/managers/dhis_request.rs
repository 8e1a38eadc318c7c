use crate::errors::ToolError;
use crate::services::instance_resolver::InstanceResolver;
use crate::services::logger::Logger;
use crate::services::proxy_executor::{HttpMethod, ProxyExecutor, ProxyRecord, ProxyRequest};
use crate::services::request_builder::query_pairs;
use crate::services::session::{require_user, SessionProvider};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhisRequestArgs {
    #[serde(default, alias = "instance_identifier", alias = "instance")]
    pub instance_identifier: Option<String>,
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub query: Option<Map<String, Value>>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl DhisRequestArgs {
    fn to_request(&self) -> ProxyRequest {
        ProxyRequest {
            method: self.method,
            path: self.path.trim().to_string(),
            query: self.query.as_ref().map(query_pairs).unwrap_or_default(),
            body: self.body.clone().filter(|body| !body.is_null()),
        }
    }
}

/// `dhis_request`: one authenticated call against any DHIS2 API path.
#[derive(Clone)]
pub struct DhisRequestManager {
    logger: Logger,
    session: Arc<dyn SessionProvider>,
    resolver: InstanceResolver,
    executor: ProxyExecutor,
    shutdown: CancellationToken,
}

impl DhisRequestManager {
    pub fn new(
        logger: Logger,
        session: Arc<dyn SessionProvider>,
        resolver: InstanceResolver,
        executor: ProxyExecutor,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            logger: logger.child("dhis_request"),
            session,
            resolver,
            executor,
            shutdown,
        }
    }

    pub async fn handle_request(&self, args: Value) -> Result<Value, ToolError> {
        let cancel = self.shutdown.child_token();
        self.execute_with_cancel(args, &cancel).await
    }

    /// Same as [`DhisRequestManager::handle_request`] with a caller-owned token.
    pub async fn execute_with_cancel(
        &self,
        args: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolError> {
        let args: DhisRequestArgs = serde_json::from_value(args)?;
        if args.path.trim().is_empty() {
            return Err(ToolError::invalid_params("path must be a non-empty string")
                .with_hint("Pass a resource path such as \"organisationUnits\"."));
        }

        let user = require_user(self.session.as_ref()).await?;
        let instance = self
            .resolver
            .resolve(&user.id, args.instance_identifier.as_deref())
            .await?;

        let request = args.to_request();
        if request.body.is_some() && !request.method.carries_body() {
            self.logger.debug(
                "Ignoring body for method without payload",
                Some(&serde_json::json!({"method": request.method.as_str()})),
            );
        }

        let record = self.executor.execute(&instance, &request, cancel).await?;
        let message = describe(request.method, &record);
        let mut out = serde_json::to_value(&record)
            .map_err(|err| ToolError::internal(format!("Failed to encode record: {}", err)))?;
        if let Value::Object(map) = &mut out {
            map.insert("message".to_string(), Value::String(message));
        }
        Ok(out)
    }
}

fn describe(method: HttpMethod, record: &ProxyRecord) -> String {
    let target = format!(
        "{} {} on \"{}\"",
        method.as_str(),
        record.endpoint,
        record.instance_name
    );
    match (&record.error, record.status_code) {
        (None, Some(status)) => format!("{} returned {}", target, status),
        (None, None) => format!("{} succeeded", target),
        (Some(error), _) => format!("{} failed: {}", target, error),
    }
}

#[async_trait::async_trait]
impl crate::services::tool_executor::ToolHandler for DhisRequestManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.handle_request(args).await
    }

    async fn handle_cancellable(
        &self,
        args: Value,
        cancel: CancellationToken,
    ) -> Result<Value, ToolError> {
        self.execute_with_cancel(args, &cancel).await
    }
}

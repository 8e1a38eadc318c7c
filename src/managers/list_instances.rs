use crate::constants::dhis2::{INSTANCES_EVENT, NO_DESCRIPTION};
use crate::errors::{ProxyError, ToolError};
use crate::models::Instance;
use crate::services::data_stream::DataStreamWriter;
use crate::services::logger::Logger;
use crate::services::session::{require_user, SessionProvider};
use crate::stores::InstanceStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceFilter {
    #[default]
    All,
    Verified,
    Unverified,
}

impl InstanceFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceFilter::All => "all",
            InstanceFilter::Verified => "verified",
            InstanceFilter::Unverified => "unverified",
        }
    }

    fn accepts(self, instance: &Instance) -> bool {
        match self {
            InstanceFilter::All => true,
            InstanceFilter::Verified => instance.verified,
            InstanceFilter::Unverified => !instance.verified,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListArgs {
    #[serde(default)]
    filter: Option<InstanceFilter>,
}

/// Display row for one instance; never includes secrets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub name: String,
    pub url: String,
    pub verified: bool,
    pub description: String,
    pub has_credentials: bool,
    pub has_api_token: bool,
    pub details: &'static str,
}

impl From<&Instance> for InstanceSummary {
    fn from(instance: &Instance) -> Self {
        Self {
            name: instance.name.clone(),
            url: instance.url.clone(),
            verified: instance.verified,
            description: instance
                .description
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            has_credentials: instance.basic_credentials().is_some(),
            has_api_token: instance.api_token().is_some(),
            details: if instance.details.is_some() {
                "Available"
            } else {
                "Not available"
            },
        }
    }
}

#[derive(Clone)]
pub struct ListInstancesManager {
    logger: Logger,
    session: Arc<dyn SessionProvider>,
    store: Arc<dyn InstanceStore>,
    stream: DataStreamWriter,
}

impl ListInstancesManager {
    pub fn new(
        logger: Logger,
        session: Arc<dyn SessionProvider>,
        store: Arc<dyn InstanceStore>,
        stream: DataStreamWriter,
    ) -> Self {
        Self {
            logger: logger.child("list_instances"),
            session,
            store,
            stream,
        }
    }

    /// Always reads the store, so it reflects changes the proxy cache may
    /// not have picked up yet.
    pub async fn list(&self, args: Value) -> Result<Value, ToolError> {
        let args: ListArgs = if args.is_null() {
            ListArgs::default()
        } else {
            serde_json::from_value(args)?
        };
        let filter = args.filter.unwrap_or_default();
        let user = require_user(self.session.as_ref()).await?;
        let instances = self
            .store
            .get_instances_by_user_id(&user.id)
            .await
            .map_err(|err| ProxyError::Storage(err.message))?;

        let summaries: Vec<InstanceSummary> = instances
            .iter()
            .filter(|instance| filter.accepts(instance))
            .map(InstanceSummary::from)
            .collect();
        let list = serde_json::to_value(&summaries)?;
        self.stream.write_data(INSTANCES_EVENT, list.clone());
        self.logger.debug(
            "Listed instances",
            Some(&serde_json::json!({"filter": filter.as_str(), "count": summaries.len()})),
        );

        Ok(serde_json::json!({
            "count": summaries.len(),
            "filterApplied": filter.as_str(),
            "instanceList": list,
            "message": format!("Found {} {} instance(s).", summaries.len(), filter.as_str()),
        }))
    }
}

#[async_trait::async_trait]
impl crate::services::tool_executor::ToolHandler for ListInstancesManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.list(args).await
    }
}

use crate::errors::{ProxyError, ToolError};
use crate::models::{Instance, InstancePatch, NewInstance};
use crate::services::credentials::resolve_credential;
use crate::services::instance_cache::{CacheEntry, InstanceCache};
use crate::services::instance_resolver::select;
use crate::services::logger::Logger;
use crate::services::session::{require_user, SessionProvider, SessionUser};
use crate::services::validation::Validation;
use crate::services::verification::{VerificationResult, VerificationService};
use crate::stores::InstanceStore;
use crate::utils::text::non_blank;
use crate::utils::tool_errors::unknown_action_error;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const INSTANCE_ACTIONS: &[&str] = &[
    "create",
    "list",
    "get",
    "update",
    "delete",
    "verify",
    "system_info",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateArgs {
    #[serde(default, alias = "api_token")]
    api_token: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateArgs {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, alias = "api_token")]
    api_token: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// `dhis_instance`: registration and upkeep of the caller's own instances.
#[derive(Clone)]
pub struct InstanceManager {
    logger: Logger,
    validation: Validation,
    session: Arc<dyn SessionProvider>,
    store: Arc<dyn InstanceStore>,
    cache: InstanceCache,
    verification: VerificationService,
}

impl InstanceManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        session: Arc<dyn SessionProvider>,
        store: Arc<dyn InstanceStore>,
        cache: InstanceCache,
        verification: VerificationService,
    ) -> Self {
        Self {
            logger: logger.child("dhis_instance"),
            validation,
            session,
            store,
            cache,
            verification,
        }
    }

    pub async fn handle_action(&self, args: Value) -> Result<Value, ToolError> {
        let action = args.get("action");
        match action.and_then(|v| v.as_str()).unwrap_or("") {
            "create" => self.create(args).await,
            "list" => self.list().await,
            "get" => self.get(&args).await,
            "update" => self.update(args).await,
            "delete" => self.delete(&args).await,
            "verify" => self.verify(&args).await,
            "system_info" => self.system_info(&args).await,
            _ => Err(unknown_action_error(
                "dhis_instance",
                action,
                INSTANCE_ACTIONS,
            )),
        }
    }

    async fn user(&self) -> Result<SessionUser, ToolError> {
        Ok(require_user(self.session.as_ref()).await?)
    }

    async fn owned_instances(&self, user: &SessionUser) -> Result<Vec<Instance>, ToolError> {
        self.store
            .get_instances_by_user_id(&user.id)
            .await
            .map_err(|err| ProxyError::Storage(err.message).into())
    }

    /// Looks the instance up among the caller's own, by id or name. Other
    /// users' instances are reported as missing.
    async fn find_owned(&self, user: &SessionUser, args: &Value) -> Result<Instance, ToolError> {
        let identifier = ["instance", "id", "instanceIdentifier"]
            .iter()
            .find_map(|key| non_blank(args.get(*key).and_then(|v| v.as_str())))
            .ok_or_else(|| {
                ToolError::invalid_params("instance is required")
                    .with_hint("Pass the instance id or name as \"instance\".")
            })?;
        let entry = CacheEntry::build(self.owned_instances(user).await?);
        Ok(select(&entry, Some(identifier))?.clone())
    }

    async fn run_verification(&self, instance: &Instance) -> Option<VerificationResult> {
        let credential = resolve_credential(instance).ok()?;
        Some(
            self.verification
                .verify_credential(&instance.url, &credential)
                .await,
        )
    }

    async fn create(&self, args: Value) -> Result<Value, ToolError> {
        let user = self.user().await?;
        let name = self.validation.ensure_required(&args, "name")?;
        let url = self.validation.ensure_required(&args, "url")?;
        let url = self.validation.ensure_instance_url(&url)?;
        let args: CreateArgs = serde_json::from_value(args)?;

        let mut fields = NewInstance {
            name,
            url,
            api_token: args.api_token.filter(|v| !v.is_empty()),
            username: args.username.filter(|v| !v.is_empty()),
            password: args.password.filter(|v| !v.is_empty()),
            description: args.description.filter(|v| !v.is_empty()),
            owner_user_id: user.id.clone(),
            ..Default::default()
        };

        let probe = fields.clone().into_instance(String::new(), chrono::Utc::now());
        let verification = self.run_verification(&probe).await;
        if let Some(result) = &verification {
            fields.verified = result.success;
            fields.details = result.data.clone();
        }

        let saved = self.store.save_instance(fields).await?;
        self.cache.invalidate(&user.id);
        self.logger.info(
            "Instance registered",
            Some(&serde_json::json!({
                "id": saved.id,
                "name": saved.name,
                "verified": saved.verified,
            })),
        );
        Ok(serde_json::json!({
            "instance": saved.view(),
            "verification": verification,
        }))
    }

    async fn list(&self) -> Result<Value, ToolError> {
        let user = self.user().await?;
        let views: Vec<_> = self
            .owned_instances(&user)
            .await?
            .iter()
            .map(Instance::view)
            .collect();
        Ok(serde_json::json!({"count": views.len(), "instances": views}))
    }

    async fn get(&self, args: &Value) -> Result<Value, ToolError> {
        let user = self.user().await?;
        let instance = self.find_owned(&user, args).await?;
        Ok(serde_json::json!({"instance": instance.view()}))
    }

    async fn update(&self, args: Value) -> Result<Value, ToolError> {
        let user = self.user().await?;
        let current = self.find_owned(&user, &args).await?;
        let update: UpdateArgs = serde_json::from_value(args)?;

        let name = match update.name {
            Some(name) => Some(self.validation.ensure_string(&Value::String(name), "name")?),
            None => None,
        };
        let url = match update.url {
            Some(url) => Some(self.validation.ensure_instance_url(&url)?),
            None => None,
        };
        let mut patch = InstancePatch {
            name,
            url,
            api_token: update.api_token,
            username: update.username,
            password: update.password,
            description: update.description,
            ..Default::default()
        };

        let mut verification = None;
        if patch.touches_connection() {
            let mut candidate = current.clone();
            patch.clone().apply(&mut candidate, chrono::Utc::now());
            verification = self.run_verification(&candidate).await;
            let (verified, details) = match &verification {
                Some(result) => (result.success, result.data.clone()),
                None => (false, None),
            };
            patch.verified = Some(verified);
            patch.details = Some(details.unwrap_or(Value::Null));
        }

        let updated = self
            .store
            .update_instance_by_id(&current.id, patch)
            .await?
            .ok_or_else(|| ToolError::not_found(format!("Instance \"{}\" not found", current.id)))?;
        self.cache.invalidate(&user.id);
        self.logger.info(
            "Instance updated",
            Some(&serde_json::json!({"id": updated.id, "verified": updated.verified})),
        );
        Ok(serde_json::json!({
            "instance": updated.view(),
            "verification": verification,
        }))
    }

    async fn delete(&self, args: &Value) -> Result<Value, ToolError> {
        let user = self.user().await?;
        let instance = self.find_owned(&user, args).await?;
        let deleted = self.store.delete_instance_by_id(&instance.id).await?;
        self.cache.invalidate(&user.id);
        self.logger.info(
            "Instance deleted",
            Some(&serde_json::json!({"id": instance.id, "deleted": deleted})),
        );
        Ok(serde_json::json!({
            "deleted": deleted,
            "id": instance.id,
            "name": instance.name,
        }))
    }

    async fn verify(&self, args: &Value) -> Result<Value, ToolError> {
        let user = self.user().await?;
        let instance = self.find_owned(&user, args).await?;
        let credential = resolve_credential(&instance)?;
        let result = self
            .verification
            .verify_credential(&instance.url, &credential)
            .await;

        let patch = InstancePatch {
            verified: Some(result.success),
            details: Some(result.data.clone().unwrap_or(Value::Null)),
            ..Default::default()
        };
        let updated = self
            .store
            .update_instance_by_id(&instance.id, patch)
            .await?
            .unwrap_or(instance);
        self.cache.invalidate(&user.id);
        Ok(serde_json::json!({
            "instance": updated.view(),
            "verification": result,
        }))
    }

    async fn system_info(&self, args: &Value) -> Result<Value, ToolError> {
        let user = self.user().await?;
        let instance = self.find_owned(&user, args).await?;
        let credential = resolve_credential(&instance)?;
        let result = self
            .verification
            .fetch_system_info(&instance.url, &credential)
            .await;
        Ok(serde_json::json!({
            "instance": instance.name,
            "systemInfo": result,
        }))
    }
}

#[async_trait::async_trait]
impl crate::services::tool_executor::ToolHandler for InstanceManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.logger.debug("handle_action", args.get("action"));
        self.handle_action(args).await
    }
}

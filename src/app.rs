use crate::config::{RuntimeConfig, StoreConfig};
use crate::constants::network::USER_AGENT;
use crate::errors::ToolError;
use crate::managers;
use crate::mcp::catalog::tool_catalog;
use crate::services::data_stream::{data_stream, DataStreamReader, StreamEvent};
use crate::services::instance_cache::InstanceCache;
use crate::services::instance_resolver::InstanceResolver;
use crate::services::logger::Logger;
use crate::services::proxy_executor::ProxyExecutor;
use crate::services::security::Security;
use crate::services::session::{SessionProvider, StaticSession};
use crate::services::tool_executor::{ToolExecutor, ToolHandler};
use crate::services::validation::Validation;
use crate::services::verification::VerificationService;
use crate::stores::{FileInstanceStore, InstanceStore, MemoryInstanceStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub struct App {
    pub config: RuntimeConfig,
    pub logger: Logger,
    pub store: Arc<dyn InstanceStore>,
    pub cache: InstanceCache,
    pub verification: VerificationService,
    pub tool_executor: Arc<ToolExecutor>,
    shutdown: CancellationToken,
    stream: Mutex<DataStreamReader>,
}

impl App {
    fn validate_tool_wiring(
        handlers: &HashMap<String, Arc<dyn ToolHandler>>,
    ) -> Result<(), ToolError> {
        let builtins = ["help"];
        let mut missing: Vec<String> = tool_catalog()
            .iter()
            .map(|tool| tool.name.clone())
            .filter(|name| !builtins.contains(&name.as_str()) && !handlers.contains_key(name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ToolError::internal("Tool wiring is incomplete")
            .with_hint("Every tool in tool_catalog.json must have a handler.")
            .with_details(serde_json::json!({ "missing_tools": missing })))
    }

    pub fn http_client() -> Result<reqwest::Client, ToolError> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ToolError::internal(format!("Failed to build HTTP client: {}", err)))
    }

    fn open_store(config: &RuntimeConfig, logger: &Logger) -> Result<Arc<dyn InstanceStore>, ToolError> {
        match &config.store {
            StoreConfig::Memory => Ok(Arc::new(MemoryInstanceStore::new())),
            StoreConfig::File(path) => {
                let security = Security::load(&config.key_path)?;
                Ok(Arc::new(FileInstanceStore::open(path, security, logger.clone())?))
            }
        }
    }

    pub fn initialize(config: RuntimeConfig) -> Result<Self, ToolError> {
        let logger = Logger::with_level("dhis2", config.log_level);
        let store = Self::open_store(&config, &logger)?;
        let session: Arc<dyn SessionProvider> = Arc::new(StaticSession::new(config.user_id.clone()));
        logger.info(
            "Starting DHIS2 bridge",
            Some(&serde_json::json!({
                "store": match &config.store {
                    StoreConfig::Memory => "memory".to_string(),
                    StoreConfig::File(path) => path.display().to_string(),
                },
                "user_id": config.user_id,
                "proxy_timeout_ms": config.proxy_timeout_ms,
                "cache_ttl_ms": config.cache_ttl_ms,
            })),
        );
        Self::with_parts(config, logger, store, session)
    }

    /// Wires the services around an existing store and session.
    pub fn with_parts(
        config: RuntimeConfig,
        logger: Logger,
        store: Arc<dyn InstanceStore>,
        session: Arc<dyn SessionProvider>,
    ) -> Result<Self, ToolError> {
        let client = Self::http_client()?;
        let (writer, reader) = data_stream();
        let shutdown = CancellationToken::new();
        let validation = Validation::new();

        let cache = InstanceCache::new(store.clone(), config.cache_ttl_ms, logger.clone());
        let resolver = InstanceResolver::new(cache.clone());
        let executor = ProxyExecutor::new(
            client.clone(),
            config.proxy_timeout_ms,
            writer.clone(),
            logger.clone(),
        );
        let verification = VerificationService::new(client, logger.clone());

        let request_manager = Arc::new(managers::dhis_request::DhisRequestManager::new(
            logger.clone(),
            session.clone(),
            resolver,
            executor,
            shutdown.clone(),
        ));
        let list_manager = Arc::new(managers::list_instances::ListInstancesManager::new(
            logger.clone(),
            session.clone(),
            store.clone(),
            writer,
        ));
        let instance_manager = Arc::new(managers::instance::InstanceManager::new(
            logger.clone(),
            validation,
            session,
            store.clone(),
            cache.clone(),
            verification.clone(),
        ));

        let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        handlers.insert("dhis_request".to_string(), request_manager);
        handlers.insert("list_instances".to_string(), list_manager);
        handlers.insert("dhis_instance".to_string(), instance_manager);
        Self::validate_tool_wiring(&handlers)?;

        let tool_executor = Arc::new(ToolExecutor::new(logger.clone(), handlers));

        Ok(Self {
            config,
            logger,
            store,
            cache,
            verification,
            tool_executor,
            shutdown,
            stream: Mutex::new(reader),
        })
    }

    /// Stream events published since the last call, in order.
    pub fn drain_events(&self) -> Vec<StreamEvent> {
        self.stream
            .lock()
            .map(|mut reader| reader.drain())
            .unwrap_or_default()
    }

    /// Token for one tool call; cancelled on its own or with [`App::shutdown`].
    pub fn call_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancels every in-flight proxy call.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#![allow(dead_code)]

use dhis2_bridge::app::App;
use dhis2_bridge::config::RuntimeConfig;
use dhis2_bridge::models::NewInstance;
use dhis2_bridge::services::logger::{LogLevel, Logger};
use dhis2_bridge::services::session::StaticSession;
use dhis2_bridge::stores::{InstanceStore, MemoryInstanceStore};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const USER: &str = "user-1";
pub const TOKEN: &str = "d2pat_testtoken12345678";

pub fn quiet_logger() -> Logger {
    Logger::with_level("test", LogLevel::Error)
}

pub fn token_instance(name: &str, url: &str) -> NewInstance {
    NewInstance {
        name: name.to_string(),
        url: url.to_string(),
        api_token: Some(TOKEN.to_string()),
        owner_user_id: USER.to_string(),
        ..Default::default()
    }
}

pub fn basic_instance(name: &str, url: &str) -> NewInstance {
    NewInstance {
        name: name.to_string(),
        url: url.to_string(),
        username: Some("admin".to_string()),
        password: Some("district".to_string()),
        owner_user_id: USER.to_string(),
        ..Default::default()
    }
}

pub struct Harness {
    pub app: App,
    pub store: Arc<MemoryInstanceStore>,
}

impl Harness {
    pub async fn new(instances: Vec<NewInstance>) -> Self {
        Self::with_config(RuntimeConfig::default(), Some(USER), instances).await
    }

    pub async fn with_config(
        config: RuntimeConfig,
        user: Option<&str>,
        instances: Vec<NewInstance>,
    ) -> Self {
        let store = Arc::new(MemoryInstanceStore::new());
        for fields in instances {
            store.save_instance(fields).await.expect("seed instance");
        }
        let session = Arc::new(StaticSession::new(user.map(str::to_string)));
        let app = App::with_parts(config, quiet_logger(), store.clone(), session).expect("app");
        Self { app, store }
    }

    /// Runs a tool and returns the unwrapped `result`.
    pub async fn call(&self, tool: &str, args: Value) -> Value {
        let out = self
            .app
            .tool_executor
            .execute(tool, args)
            .await
            .unwrap_or_else(|err| panic!("{} failed: {}", tool, err));
        out["result"].clone()
    }
}

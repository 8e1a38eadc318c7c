use super::memory_instance_store::MemoryInstanceStore;
use super::InstanceStore;
use crate::errors::ToolError;
use crate::models::{Instance, InstancePatch, NewInstance};
use crate::services::logger::Logger;
use crate::services::security::Security;
use crate::utils::fs_atomic::atomic_write_text_file;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct InstanceFile {
    version: u32,
    instances: Vec<Instance>,
}

/// JSON file store. Tokens and passwords are sealed with [`Security`] on the
/// way to disk and opened again on load; the in-memory copy holds plaintext.
#[derive(Clone)]
pub struct FileInstanceStore {
    inner: MemoryInstanceStore,
    file_path: PathBuf,
    security: Security,
    queue: Arc<Mutex<()>>,
    logger: Logger,
}

impl FileInstanceStore {
    pub fn open(
        file_path: impl Into<PathBuf>,
        security: Security,
        logger: Logger,
    ) -> Result<Self, ToolError> {
        let store = Self {
            inner: MemoryInstanceStore::new(),
            file_path: file_path.into(),
            security,
            queue: Arc::new(Mutex::new(())),
            logger: logger.child("file_store"),
        };
        store.load_from_disk()?;
        Ok(store)
    }

    fn load_from_disk(&self) -> Result<(), ToolError> {
        if !self.file_path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(&self.file_path).map_err(|err| {
            ToolError::internal(format!("Failed to load instance store: {}", err))
        })?;
        if raw.trim().is_empty() {
            return Ok(());
        }
        let parsed: InstanceFile = serde_json::from_str(&raw).map_err(|err| {
            ToolError::internal(format!("Failed to parse instance store: {}", err))
        })?;
        let instances = parsed
            .instances
            .into_iter()
            .map(|instance| self.open_secrets(instance))
            .collect::<Result<Vec<_>, _>>()?;
        self.logger.debug(
            "Loaded instance store",
            Some(&serde_json::json!({
                "path": self.file_path,
                "count": instances.len(),
            })),
        );
        self.inner.replace(instances);
        Ok(())
    }

    fn seal_secrets(&self, mut instance: Instance) -> Result<Instance, ToolError> {
        instance.api_token = self.seal(instance.api_token.take())?;
        instance.password = self.seal(instance.password.take())?;
        Ok(instance)
    }

    fn open_secrets(&self, mut instance: Instance) -> Result<Instance, ToolError> {
        instance.api_token = self.unseal(instance.api_token.take())?;
        instance.password = self.unseal(instance.password.take())?;
        Ok(instance)
    }

    fn seal(&self, value: Option<String>) -> Result<Option<String>, ToolError> {
        match value {
            Some(secret) if !secret.is_empty() => self.security.encrypt(&secret).map(Some),
            _ => Ok(None),
        }
    }

    fn unseal(&self, value: Option<String>) -> Result<Option<String>, ToolError> {
        match value {
            Some(sealed) if !sealed.is_empty() => self.security.decrypt(&sealed).map(Some),
            _ => Ok(None),
        }
    }

    fn persist(&self, instances: Vec<Instance>) -> Result<(), ToolError> {
        let sealed = instances
            .into_iter()
            .map(|instance| self.seal_secrets(instance))
            .collect::<Result<Vec<_>, _>>()?;
        let payload = serde_json::to_string_pretty(&InstanceFile {
            version: FILE_VERSION,
            instances: sealed,
        })
        .map_err(|err| ToolError::internal(format!("Failed to serialize instance store: {}", err)))?;
        atomic_write_text_file(&self.file_path, &format!("{}\n", payload), 0o600).map_err(
            |err| ToolError::internal(format!("Failed to persist instance store: {}", err)),
        )
    }

    /// Applies `mutate` to the in-memory copy and writes the result; a failed
    /// write restores the previous contents.
    fn commit<T>(&self, mutate: impl FnOnce(&MemoryInstanceStore) -> T) -> Result<T, ToolError> {
        let _guard = self.queue.lock().unwrap_or_else(|err| err.into_inner());
        let before = self.inner.snapshot();
        let out = mutate(&self.inner);
        if let Err(err) = self.persist(self.inner.snapshot()) {
            self.inner.replace(before);
            self.logger.error(
                "Instance store write failed",
                Some(&serde_json::json!({"path": self.file_path, "error": err.message})),
            );
            return Err(err);
        }
        Ok(out)
    }
}

#[async_trait]
impl InstanceStore for FileInstanceStore {
    async fn get_instances_by_user_id(&self, user_id: &str) -> Result<Vec<Instance>, ToolError> {
        self.inner.get_instances_by_user_id(user_id).await
    }

    async fn get_instance_by_id(&self, id: &str) -> Result<Option<Instance>, ToolError> {
        self.inner.get_instance_by_id(id).await
    }

    async fn save_instance(&self, fields: NewInstance) -> Result<Instance, ToolError> {
        self.commit(|inner| inner.insert(fields))
    }

    async fn update_instance_by_id(
        &self,
        id: &str,
        patch: InstancePatch,
    ) -> Result<Option<Instance>, ToolError> {
        self.commit(|inner| inner.patch(id, patch))
    }

    async fn delete_instance_by_id(&self, id: &str) -> Result<bool, ToolError> {
        self.commit(|inner| inner.remove(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::logger::LogLevel;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("dhis2-bridge-store-{}", uuid::Uuid::new_v4()))
            .join("instances.json")
    }

    fn security() -> Security {
        Security::from_key(&[9u8; 32]).expect("key")
    }

    fn logger() -> Logger {
        Logger::with_level("test", LogLevel::Error)
    }

    #[tokio::test]
    async fn secrets_are_encrypted_at_rest_and_restored_on_open() {
        let path = temp_path();
        let store = FileInstanceStore::open(&path, security(), logger()).expect("open");
        let saved = store
            .save_instance(NewInstance {
                name: "Play".to_string(),
                url: "https://play.dhis2.org/dev".to_string(),
                api_token: Some("d2pat_plaintexttoken".to_string()),
                username: Some("admin".to_string()),
                password: Some("district".to_string()),
                owner_user_id: "u1".to_string(),
                ..Default::default()
            })
            .await
            .expect("save");

        let on_disk = std::fs::read_to_string(&path).expect("read file");
        assert!(!on_disk.contains("d2pat_plaintexttoken"));
        assert!(!on_disk.contains("district"));
        assert!(on_disk.contains("admin"));

        let reopened = FileInstanceStore::open(&path, security(), logger()).expect("reopen");
        let loaded = reopened
            .get_instance_by_id(&saved.id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(loaded.api_token.as_deref(), Some("d2pat_plaintexttoken"));
        assert_eq!(loaded.password.as_deref(), Some("district"));

        let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[tokio::test]
    async fn wrong_key_refuses_to_open() {
        let path = temp_path();
        let store = FileInstanceStore::open(&path, security(), logger()).expect("open");
        store
            .save_instance(NewInstance {
                name: "Play".to_string(),
                url: "https://play.dhis2.org".to_string(),
                api_token: Some("token-value".to_string()),
                owner_user_id: "u1".to_string(),
                ..Default::default()
            })
            .await
            .expect("save");
        let other = Security::from_key(&[3u8; 32]).expect("key");
        assert!(FileInstanceStore::open(&path, other, logger()).is_err());
        let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
    }
}

use super::InstanceStore;
use crate::errors::ToolError;
use crate::models::{Instance, InstancePatch, NewInstance};
use async_trait::async_trait;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Default)]
pub struct MemoryInstanceStore {
    instances: Arc<RwLock<Vec<Instance>>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Instance>> {
        self.instances.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Instance>> {
        self.instances.write().unwrap_or_else(|err| err.into_inner())
    }

    pub fn snapshot(&self) -> Vec<Instance> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub(crate) fn replace(&self, instances: Vec<Instance>) {
        *self.write() = instances;
    }

    pub(crate) fn insert(&self, fields: NewInstance) -> Instance {
        let instance = fields.into_instance(uuid::Uuid::new_v4().to_string(), chrono::Utc::now());
        self.write().push(instance.clone());
        instance
    }

    pub(crate) fn patch(&self, id: &str, patch: InstancePatch) -> Option<Instance> {
        let mut instances = self.write();
        let instance = instances.iter_mut().find(|instance| instance.id == id)?;
        patch.apply(instance, chrono::Utc::now());
        Some(instance.clone())
    }

    pub(crate) fn remove(&self, id: &str) -> bool {
        let mut instances = self.write();
        let before = instances.len();
        instances.retain(|instance| instance.id != id);
        instances.len() != before
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn get_instances_by_user_id(&self, user_id: &str) -> Result<Vec<Instance>, ToolError> {
        Ok(self
            .read()
            .iter()
            .filter(|instance| instance.owner_user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_instance_by_id(&self, id: &str) -> Result<Option<Instance>, ToolError> {
        Ok(self.read().iter().find(|instance| instance.id == id).cloned())
    }

    async fn save_instance(&self, fields: NewInstance) -> Result<Instance, ToolError> {
        Ok(self.insert(fields))
    }

    async fn update_instance_by_id(
        &self,
        id: &str,
        patch: InstancePatch,
    ) -> Result<Option<Instance>, ToolError> {
        Ok(self.patch(id, patch))
    }

    async fn delete_instance_by_id(&self, id: &str) -> Result<bool, ToolError> {
        Ok(self.remove(id))
    }
}

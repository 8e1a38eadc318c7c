pub mod file_instance_store;
pub mod memory_instance_store;

use crate::errors::ToolError;
use crate::models::{Instance, InstancePatch, NewInstance};
use async_trait::async_trait;

pub use file_instance_store::FileInstanceStore;
pub use memory_instance_store::MemoryInstanceStore;

/// Persistence for registered instances. Lists come back in creation order.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get_instances_by_user_id(&self, user_id: &str) -> Result<Vec<Instance>, ToolError>;

    async fn get_instance_by_id(&self, id: &str) -> Result<Option<Instance>, ToolError>;

    async fn save_instance(&self, fields: NewInstance) -> Result<Instance, ToolError>;

    async fn update_instance_by_id(
        &self,
        id: &str,
        patch: InstancePatch,
    ) -> Result<Option<Instance>, ToolError>;

    async fn delete_instance_by_id(&self, id: &str) -> Result<bool, ToolError>;
}

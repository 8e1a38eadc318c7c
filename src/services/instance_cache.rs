use crate::errors::{ProxyError, ProxyResult};
use crate::models::Instance;
use crate::services::logger::Logger;
use crate::stores::InstanceStore;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Immutable snapshot of one user's instances.
#[derive(Debug)]
pub struct CacheEntry {
    all: Vec<Instance>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    loaded_at: Instant,
}

impl CacheEntry {
    /// Later instances overwrite earlier ones when lowercased names collide.
    pub fn build(all: Vec<Instance>) -> Self {
        let mut by_id = HashMap::with_capacity(all.len());
        let mut by_name = HashMap::with_capacity(all.len());
        for (idx, instance) in all.iter().enumerate() {
            by_id.insert(instance.id.clone(), idx);
            by_name.insert(instance.name.to_lowercase(), idx);
        }
        Self {
            all,
            by_id,
            by_name,
            loaded_at: Instant::now(),
        }
    }

    pub fn all(&self) -> &[Instance] {
        &self.all
    }

    pub fn first(&self) -> Option<&Instance> {
        self.all.first()
    }

    pub fn by_id(&self, id: &str) -> Option<&Instance> {
        self.by_id.get(id).map(|idx| &self.all[*idx])
    }

    pub fn by_name(&self, name: &str) -> Option<&Instance> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|idx| &self.all[*idx])
    }

    pub fn names(&self) -> Vec<String> {
        self.all.iter().map(|instance| instance.name.clone()).collect()
    }

    fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        ttl.map_or(true, |ttl| self.loaded_at.elapsed() < ttl)
    }
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: u64,
    misses: u64,
    invalidations: u64,
}

/// Per-user instance snapshots, loaded lazily from the store.
///
/// Entries are `Arc`s swapped whole, so readers never observe a partially
/// built index. Two racing first loads both hit the store; the later insert
/// wins. A `ttl` of `None` keeps entries until [`InstanceCache::invalidate`].
#[derive(Clone)]
pub struct InstanceCache {
    store: Arc<dyn InstanceStore>,
    entries: Arc<DashMap<String, Arc<CacheEntry>>>,
    ttl: Option<Duration>,
    stats: Arc<Mutex<CacheStats>>,
    logger: Logger,
}

impl InstanceCache {
    pub fn new(store: Arc<dyn InstanceStore>, ttl_ms: u64, logger: Logger) -> Self {
        Self {
            store,
            entries: Arc::new(DashMap::new()),
            ttl: (ttl_ms > 0).then(|| Duration::from_millis(ttl_ms)),
            stats: Arc::new(Mutex::new(CacheStats::default())),
            logger: logger.child("instance_cache"),
        }
    }

    pub async fn ensure(&self, user_id: &str) -> ProxyResult<Arc<CacheEntry>> {
        let cached = self
            .entries
            .get(user_id)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(entry) = cached {
            if entry.is_fresh(self.ttl) {
                self.bump(|stats| stats.hits += 1);
                return Ok(entry);
            }
            self.logger
                .debug("Instance cache entry expired", Some(&serde_json::json!({"user_id": user_id})));
        }
        self.bump(|stats| stats.misses += 1);

        let instances = self
            .store
            .get_instances_by_user_id(user_id)
            .await
            .map_err(|err| ProxyError::Storage(err.message))?;
        if instances.is_empty() {
            self.entries.remove(user_id);
            return Err(ProxyError::NoInstances);
        }

        let entry = Arc::new(CacheEntry::build(instances));
        self.entries.insert(user_id.to_string(), Arc::clone(&entry));
        self.logger.debug(
            "Instance cache loaded",
            Some(&serde_json::json!({"user_id": user_id, "count": entry.all.len()})),
        );
        Ok(entry)
    }

    pub fn invalidate(&self, user_id: &str) {
        if self.entries.remove(user_id).is_some() {
            self.bump(|stats| stats.invalidations += 1);
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.entries.contains_key(user_id)
    }

    pub fn stats(&self) -> serde_json::Value {
        let stats = self.stats.lock().unwrap_or_else(|err| err.into_inner());
        serde_json::json!({
            "users": self.entries.len(),
            "ttl_ms": self.ttl.map(|ttl| ttl.as_millis() as u64).unwrap_or(0),
            "hits": stats.hits,
            "misses": stats.misses,
            "invalidations": stats.invalidations,
        })
    }

    fn bump(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ToolError;
    use crate::models::{InstancePatch, NewInstance};
    use crate::services::logger::LogLevel;
    use crate::stores::MemoryInstanceStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        inner: MemoryInstanceStore,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl InstanceStore for CountingStore {
        async fn get_instances_by_user_id(
            &self,
            user_id: &str,
        ) -> Result<Vec<Instance>, ToolError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_instances_by_user_id(user_id).await
        }
        async fn get_instance_by_id(&self, id: &str) -> Result<Option<Instance>, ToolError> {
            self.inner.get_instance_by_id(id).await
        }
        async fn save_instance(&self, fields: NewInstance) -> Result<Instance, ToolError> {
            self.inner.save_instance(fields).await
        }
        async fn update_instance_by_id(
            &self,
            id: &str,
            patch: InstancePatch,
        ) -> Result<Option<Instance>, ToolError> {
            self.inner.update_instance_by_id(id, patch).await
        }
        async fn delete_instance_by_id(&self, id: &str) -> Result<bool, ToolError> {
            self.inner.delete_instance_by_id(id).await
        }
    }

    async fn setup(ttl_ms: u64) -> (Arc<CountingStore>, InstanceCache) {
        let store = Arc::new(CountingStore {
            inner: MemoryInstanceStore::new(),
            reads: AtomicUsize::new(0),
        });
        for name in ["Foo", "foo"] {
            store
                .save_instance(NewInstance {
                    name: name.to_string(),
                    url: "https://play.dhis2.org".to_string(),
                    owner_user_id: "u1".to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        let cache = InstanceCache::new(
            store.clone(),
            ttl_ms,
            Logger::with_level("test", LogLevel::Error),
        );
        (store, cache)
    }

    #[tokio::test]
    async fn second_access_is_served_from_cache() {
        let (store, cache) = setup(0).await;
        cache.ensure("u1").await.unwrap();
        cache.ensure("u1").await.unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats()["hits"], 1);
    }

    #[tokio::test]
    async fn colliding_names_keep_the_last_instance() {
        let (_store, cache) = setup(0).await;
        let entry = cache.ensure("u1").await.unwrap();
        let second = &entry.all()[1];
        assert_eq!(entry.by_name("FOO").map(|i| &i.id), Some(&second.id));
    }

    #[tokio::test]
    async fn empty_user_is_not_cached() {
        let (store, cache) = setup(0).await;
        let err = cache.ensure("nobody").await.unwrap_err();
        assert!(matches!(err, ProxyError::NoInstances));
        assert!(!cache.contains("nobody"));
        let _ = cache.ensure("nobody").await;
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let (store, cache) = setup(0).await;
        cache.ensure("u1").await.unwrap();
        cache.invalidate("u1");
        cache.ensure("u1").await.unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_reloaded() {
        let (store, cache) = setup(20).await;
        cache.ensure("u1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.ensure("u1").await.unwrap();
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    }
}

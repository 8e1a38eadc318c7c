use crate::constants::limits::SUGGESTION_LIMIT;
use crate::errors::{ProxyError, ProxyResult};
use crate::models::Instance;
use crate::services::instance_cache::{CacheEntry, InstanceCache};
use crate::utils::suggest::suggest;

/// Picks exactly one instance for a user from an optional identifier.
#[derive(Clone)]
pub struct InstanceResolver {
    cache: InstanceCache,
}

impl InstanceResolver {
    pub fn new(cache: InstanceCache) -> Self {
        Self { cache }
    }

    pub async fn resolve(&self, user_id: &str, identifier: Option<&str>) -> ProxyResult<Instance> {
        let entry = self.cache.ensure(user_id).await?;
        select(&entry, identifier).cloned()
    }
}

/// No identifier (or an empty one): the first registered instance. Otherwise an
/// id match, then a case-insensitive name match. Whitespace is not trimmed.
pub fn select<'a>(entry: &'a CacheEntry, identifier: Option<&str>) -> ProxyResult<&'a Instance> {
    let Some(identifier) = identifier.filter(|id| !id.is_empty()) else {
        return entry.first().ok_or(ProxyError::NoInstances);
    };
    if let Some(instance) = entry.by_id(identifier).or_else(|| entry.by_name(identifier)) {
        return Ok(instance);
    }
    let known = entry.names();
    let suggestions = suggest(identifier, &known, SUGGESTION_LIMIT);
    Err(ProxyError::InstanceNotFound {
        identifier: identifier.to_string(),
        known,
        suggestions,
    })
}

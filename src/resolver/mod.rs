//! Wildcard-aware template resolution.
//!
//! A query for (module, menu, task) tries eight candidate triples, from the
//! exact match down to `(*, *, *)`, and settles on the first active mapping.
//! The same expansion drives cache invalidation: a write to a triple evicts
//! the cache entries of all eight of its candidates.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CachedMapping, MappingCache};
use crate::config::CacheConfig;
use crate::mapping::{MappingKey, MappingRecord, MappingStore, StoreError, WILDCARD};
use crate::metrics::{CacheMetrics, ResolutionMetrics};

/// Candidate triples for `key` in priority order.
///
/// `[M,Me,T] [M,Me,*] [M,*,T] [M,*,*] [*,Me,T] [*,Me,*] [*,*,T] [*,*,*]`
pub fn expand_candidates(key: &MappingKey) -> Vec<MappingKey> {
    let modules = [key.module.as_str(), WILDCARD];
    let menus = [key.menu.as_str(), WILDCARD];
    let tasks = [key.task.as_str(), WILDCARD];

    let mut candidates = Vec::with_capacity(8);
    for module in modules {
        for menu in menus {
            for task in tasks {
                candidates.push(MappingKey::new(module, menu, task));
            }
        }
    }
    candidates
}

/// Cache key of a queried triple; context never takes part in it.
///
/// Segments are escaped so `("A:B", "C", "D")` and `("A", "B:C", "D")` stay
/// distinct.
pub fn cache_key(prefix: &str, key: &MappingKey) -> String {
    format!(
        "{}:{}:{}:{}:template",
        prefix,
        escape_segment(&key.module),
        escape_segment(&key.menu),
        escape_segment(&key.task)
    )
}

/// Percent-encode `%` and the `:` separator
fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace(':', "%3A")
}

/// Resolves triples to mappings through the cache, falling back to the store.
pub struct MappingResolver {
    store: Arc<dyn MappingStore>,
    cache: Arc<dyn MappingCache>,
    ttl: Duration,
    prefix: String,
}

impl MappingResolver {
    pub fn new(
        store: Arc<dyn MappingStore>,
        cache: Arc<dyn MappingCache>,
        settings: &CacheConfig,
    ) -> Self {
        Self {
            store,
            cache,
            ttl: Duration::from_secs(settings.ttl_seconds),
            prefix: settings.prefix.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn MappingStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn MappingCache> {
        &self.cache
    }

    pub fn cache_key_for(&self, key: &MappingKey) -> String {
        cache_key(&self.prefix, key)
    }

    /// Find the mapping for `key`, or `None` when no candidate has an active
    /// mapping. Cache failures are logged and bypassed; store failures are
    /// returned.
    #[tracing::instrument(skip(self, key), fields(key = %key))]
    pub async fn resolve(&self, key: &MappingKey) -> Result<Option<MappingRecord>, StoreError> {
        let cache_key = self.cache_key_for(key);

        match self.cache.get(&cache_key).await {
            Ok(Some(cached)) => {
                CacheMetrics::record_hit();
                let resolved = cached.into_option();
                record_outcome(&resolved);
                return Ok(resolved);
            }
            Ok(None) => CacheMetrics::record_miss(),
            Err(e) => {
                CacheMetrics::record_error();
                tracing::warn!(error = %e, cache_key = %cache_key, "Template cache read failed, querying store");
            }
        }

        let resolved = match self.lookup(key).await {
            Ok(resolved) => resolved,
            Err(e) => {
                ResolutionMetrics::record_error();
                return Err(e);
            }
        };

        let entry = CachedMapping::from(resolved.clone());
        if let Err(e) = self.cache.put(&cache_key, &entry, self.ttl).await {
            CacheMetrics::record_error();
            tracing::warn!(error = %e, cache_key = %cache_key, "Template cache write failed");
        }

        record_outcome(&resolved);
        Ok(resolved)
    }

    /// First active mapping over the candidate list, straight from the store
    async fn lookup(&self, key: &MappingKey) -> Result<Option<MappingRecord>, StoreError> {
        for candidate in expand_candidates(key) {
            if let Some(record) = self.store.find_active(&candidate).await? {
                tracing::debug!(
                    mapping_id = record.id,
                    matched = %candidate,
                    "Template resolved"
                );
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Evict the cache entries of every candidate of `key`.
    ///
    /// Returns the number of entries removed; failures are logged and yield 0.
    pub async fn invalidate(&self, key: &MappingKey) -> u64 {
        let mut keys: Vec<String> = Vec::with_capacity(8);
        for candidate in expand_candidates(key) {
            let cache_key = self.cache_key_for(&candidate);
            if !keys.contains(&cache_key) {
                keys.push(cache_key);
            }
        }

        match self.cache.forget(&keys).await {
            Ok(removed) => {
                CacheMetrics::record_invalidated(removed);
                tracing::debug!(key = %key, removed = removed, "Template cache invalidated");
                removed
            }
            Err(e) => {
                CacheMetrics::record_error();
                tracing::warn!(error = %e, key = %key, "Template cache invalidation failed");
                0
            }
        }
    }
}

fn record_outcome(resolved: &Option<MappingRecord>) {
    if resolved.is_some() {
        ResolutionMetrics::record_found();
    } else {
        ResolutionMetrics::record_not_found();
    }
}

//! In-memory cache backend

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::clock::{system_clock, Clock};

use super::backend::{CacheError, CachedMapping, MappingCache};

struct Entry {
    value: CachedMapping,
    expires_at: DateTime<Utc>,
}

/// DashMap cache whose entries expire against an injected clock.
///
/// Expired entries are dropped when read and by `purge_expired`.
pub struct MemoryMappingCache {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryMappingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMappingCache {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map(|entry| entry.expires_at > now)
            .unwrap_or(false)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed = removed, "Purged expired template cache entries");
        }
        removed
    }
}

#[async_trait]
impl MappingCache for MemoryMappingCache {
    async fn get(&self, key: &str) -> Result<Option<CachedMapping>, CacheError> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        // The read guard is released before removing
        if expired {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: &CachedMapping, ttl: Duration) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn forget(&self, keys: &[String]) -> Result<u64, CacheError> {
        Ok(keys
            .iter()
            .filter(|key| self.entries.remove(key.as_str()).is_some())
            .count() as u64)
    }

    fn evict_expired(&self) -> usize {
        self.purge_expired()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = MemoryMappingCache::new();
        cache.put("k", &CachedMapping::Missing, TTL).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(CachedMapping::Missing));
        assert_eq!(cache.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let clock = Arc::new(ManualClock::default());
        let cache = MemoryMappingCache::with_clock(clock.clone());
        cache.put("k", &CachedMapping::Missing, TTL).await.unwrap();

        clock.advance(chrono::Duration::seconds(59));
        assert!(cache.get("k").await.unwrap().is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_forget_counts_present_keys() {
        let cache = MemoryMappingCache::new();
        cache.put("a", &CachedMapping::Missing, TTL).await.unwrap();
        cache.put("b", &CachedMapping::Missing, TTL).await.unwrap();

        let removed = cache
            .forget(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let clock = Arc::new(ManualClock::default());
        let cache = MemoryMappingCache::with_clock(clock.clone());
        cache.put("short", &CachedMapping::Missing, Duration::from_secs(1)).await.unwrap();
        cache.put("long", &CachedMapping::Missing, TTL).await.unwrap();

        clock.advance(chrono::Duration::seconds(2));
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.contains("long"));
    }
}

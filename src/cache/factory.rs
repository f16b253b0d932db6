//! Cache backend factory

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::redis::RedisPool;

use super::backend::MappingCache;
use super::memory_backend::MemoryMappingCache;
use super::redis_backend::RedisMappingCache;

/// Create the template cache selected by `cache.backend`.
///
/// - `"redis"`: `RedisMappingCache` when a pool is provided
/// - `"memory"` (default): `MemoryMappingCache`
pub fn create_cache_backend(
    settings: &CacheConfig,
    redis_pool: Option<Arc<RedisPool>>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn MappingCache> {
    match settings.backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    url = %pool.url(),
                    ttl_seconds = settings.ttl_seconds,
                    "Creating Redis template cache"
                );
                Arc::new(RedisMappingCache::new(pool))
            } else {
                tracing::warn!(
                    "Redis cache requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryMappingCache::with_clock(clock))
            }
        }
        _ => {
            tracing::info!(
                backend = "memory",
                ttl_seconds = settings.ttl_seconds,
                "Creating memory template cache"
            );
            Arc::new(MemoryMappingCache::with_clock(clock))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;

    #[test]
    fn test_redis_without_pool_falls_back_to_memory() {
        let settings = CacheConfig {
            backend: "redis".to_string(),
            ..CacheConfig::default()
        };
        let cache = create_cache_backend(&settings, None, system_clock());
        assert_eq!(cache.backend_name(), "memory");
    }
}

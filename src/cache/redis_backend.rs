//! Redis cache backend.
//!
//! Values are stored as JSON strings with `SET key value EX ttl`; expiry is
//! left to Redis.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::redis::{RedisPool, RedisPoolExt};

use super::backend::{CacheError, CachedMapping, MappingCache};

pub struct RedisMappingCache {
    pool: Arc<RedisPool>,
}

impl RedisMappingCache {
    pub fn new(pool: Arc<RedisPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MappingCache for RedisMappingCache {
    async fn get(&self, key: &str) -> Result<Option<CachedMapping>, CacheError> {
        match self.pool.get_string(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &CachedMapping, ttl: Duration) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        // EX 0 is rejected by Redis
        let seconds = ttl.as_secs().max(1);
        self.pool.set_ex(key, &raw, seconds).await?;
        Ok(())
    }

    async fn forget(&self, keys: &[String]) -> Result<u64, CacheError> {
        Ok(self.pool.del_many(keys).await?)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

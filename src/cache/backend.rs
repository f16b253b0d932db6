//! Backend trait for the resolved-template cache.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mapping::MappingRecord;
use crate::redis::PoolError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] PoolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A cached resolution result.
///
/// `Missing` records that no candidate matched, so repeated lookups for an
/// unmapped triple do not reach the store until the entry expires or is
/// invalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "mapping", rename_all = "snake_case")]
pub enum CachedMapping {
    Found(MappingRecord),
    Missing,
}

impl CachedMapping {
    pub fn into_option(self) -> Option<MappingRecord> {
        match self {
            CachedMapping::Found(record) => Some(record),
            CachedMapping::Missing => None,
        }
    }
}

impl From<Option<MappingRecord>> for CachedMapping {
    fn from(value: Option<MappingRecord>) -> Self {
        match value {
            Some(record) => CachedMapping::Found(record),
            None => CachedMapping::Missing,
        }
    }
}

/// Key-value cache with per-entry expiry. Last write wins.
#[async_trait]
pub trait MappingCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedMapping>, CacheError>;

    async fn put(&self, key: &str, value: &CachedMapping, ttl: Duration) -> Result<(), CacheError>;

    /// Remove the given keys, returning how many were present
    async fn forget(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// Drop expired entries held locally; backends that expire server-side
    /// have nothing to do.
    fn evict_expired(&self) -> usize {
        0
    }

    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_marker_serialization() {
        let json = serde_json::to_string(&CachedMapping::Missing).unwrap();
        assert_eq!(json, r#"{"status":"missing"}"#);

        let parsed: CachedMapping = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, CachedMapping::Missing);
        assert!(parsed.into_option().is_none());
    }
}

//! Storage trait for email mappings.
//!
//! Backends hold mapping records keyed by id and answer exact (module, menu,
//! task) lookups. Wildcard expansion is the resolver's job; a store never
//! interprets `*`.

use async_trait::async_trait;
use thiserror::Error;

use crate::postgres::PostgresPoolError;

use super::types::{MappingKey, MappingRecord, NewMapping, PageRequest};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another live mapping already uses this triple
    #[error("Email mapping already exists for {module}:{menu}:{task}")]
    Conflict {
        module: String,
        menu: String,
        task: String,
    },

    #[error("Email mapping not found: {0}")]
    NotFound(i64),

    /// Backend is temporarily unavailable (e.g., circuit breaker open)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn conflict(key: &MappingKey) -> Self {
        StoreError::Conflict {
            module: key.module.clone(),
            menu: key.menu.clone(),
            task: key.task.clone(),
        }
    }
}

impl From<PostgresPoolError> for StoreError {
    fn from(err: PostgresPoolError) -> Self {
        match err {
            PostgresPoolError::CircuitOpen => {
                StoreError::Unavailable("PostgreSQL circuit breaker is open".to_string())
            }
            PostgresPoolError::Sqlx(e) => StoreError::Postgres(e),
        }
    }
}

/// Persistence for mapping records.
///
/// Every query ignores soft-deleted rows.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Newest active mapping registered under exactly `key`
    async fn find_active(&self, key: &MappingKey) -> Result<Option<MappingRecord>, StoreError>;

    /// Mapping registered under exactly `key`, active or not
    async fn find_exact(&self, key: &MappingKey) -> Result<Option<MappingRecord>, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<MappingRecord>, StoreError>;

    /// Mappings newest first, with the total number of live rows
    async fn list(&self, page: PageRequest) -> Result<(Vec<MappingRecord>, u64), StoreError>;

    /// Insert a mapping; fails with `Conflict` when its triple is taken
    async fn insert(&self, mapping: NewMapping) -> Result<MappingRecord, StoreError>;

    /// Overwrite every mutable field of `record.id`, refreshing `updated_at`
    async fn update(&self, record: &MappingRecord) -> Result<MappingRecord, StoreError>;

    /// Mark a mapping deleted and return it as it was before deletion
    async fn soft_delete(&self, id: i64) -> Result<MappingRecord, StoreError>;

    fn backend_name(&self) -> &'static str;
}

//! Mapping store factory

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::postgres::PostgresPool;

use super::memory_store::MemoryMappingStore;
use super::postgres_store::PostgresMappingStore;
use super::store::MappingStore;

/// Create the mapping store selected by `store.backend`.
///
/// - `"postgres"`: `PostgresMappingStore` when a pool is provided
/// - `"memory"` (default): `MemoryMappingStore`
pub fn create_mapping_store(
    settings: &StoreConfig,
    postgres_pool: Option<PostgresPool>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn MappingStore> {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(
                    backend = "postgres",
                    url = %pool.database_url_masked(),
                    "Creating PostgreSQL mapping store"
                );
                Arc::new(PostgresMappingStore::new(pool))
            } else {
                tracing::warn!(
                    "PostgreSQL store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryMappingStore::with_clock(clock))
            }
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory mapping store");
            Arc::new(MemoryMappingStore::with_clock(clock))
        }
    }
}

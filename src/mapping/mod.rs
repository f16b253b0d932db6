//! Email mappings: templates registered under a (module, menu, task) triple.
//!
//! Storage goes through the `MappingStore` trait:
//!
//! - `MemoryMappingStore`: DashMap storage (default)
//! - `PostgresMappingStore`: `email_mappings` table via sqlx
//!
//! `MappingService` layers validation, pagination and cache invalidation on
//! top for the admin API.

mod factory;
pub mod memory_store;
pub mod postgres_store;
pub mod service;
pub mod store;
mod types;

pub use factory::create_mapping_store;
pub use memory_store::MemoryMappingStore;
pub use postgres_store::PostgresMappingStore;
pub use service::{MappingError, MappingResult, MappingService};
pub use store::{MappingStore, StoreError};
pub use types::{
    normalize_meta, CreateMappingRequest, MappingKey, MappingPage, MappingRecord, NewMapping,
    PageRequest, StringList, UpdateMappingRequest, WILDCARD,
};

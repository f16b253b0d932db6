//! Cache of resolved templates.
//!
//! Entries are keyed by the queried (module, menu, task) triple and hold the
//! record the resolver settled on, or a `Missing` marker.
//!
//! - `MemoryMappingCache`: DashMap with clock-driven expiry (default)
//! - `RedisMappingCache`: JSON strings with Redis-side expiry
//!
//! Use `create_cache_backend()` to pick one from configuration.

pub mod backend;
mod factory;
pub mod memory_backend;
pub mod redis_backend;

pub use backend::{CacheError, CachedMapping, MappingCache};
pub use factory::create_cache_backend;
pub use memory_backend::MemoryMappingCache;
pub use redis_backend::RedisMappingCache;

//! PostgreSQL connection pool for the mapping store.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};

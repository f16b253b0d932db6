//! Infrastructure layer modules
//!
//! - `config`: Application configuration and settings
//! - `error`: HTTP error type
//! - `metrics`: Prometheus metrics helpers
//! - `postgres`: PostgreSQL connection pool
//! - `redis`: Redis connection pool, circuit breaker, and health checks

pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
pub mod redis;

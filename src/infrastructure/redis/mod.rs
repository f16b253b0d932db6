//! Redis connectivity for the template cache
//!
//! - `CircuitBreaker`: stops hammering a backend that keeps failing
//! - `RedisHealth`: connection status reported by `/health`
//! - `pool`: multiplexed connection with string commands

mod circuit_breaker;
mod health;
pub mod pool;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use health::{RedisHealth, RedisHealthStatus};
pub use pool::{PoolError, RedisPool, RedisPoolExt};

/// Current time in milliseconds since epoch
pub(crate) fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

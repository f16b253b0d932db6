//! PostgreSQL connection pool with circuit breaker integration.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

use crate::config::{DatabaseConfig, RedisConfig};
use crate::redis::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

const SCHEMA: &str = include_str!("../../../migrations/001_create_email_mappings.sql");

#[derive(Debug, Error)]
pub enum PostgresPoolError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Circuit breaker is open")]
    CircuitOpen,
}

/// Pool shared by the PostgreSQL mapping store.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
    circuit_breaker: Arc<CircuitBreaker>,
    database_url: String,
}

impl PostgresPool {
    pub async fn new(
        config: &DatabaseConfig,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, PostgresPoolError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds as u64))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds as u64))
            .connect(&config.url)
            .await?;

        let pool = Self {
            pool,
            circuit_breaker,
            database_url: config.url.clone(),
        };

        tracing::info!(
            pool_size = config.pool_size,
            url = %pool.database_url_masked(),
            "PostgreSQL connection pool created"
        );

        Ok(pool)
    }

    /// Connect using the breaker thresholds shared with the Redis settings
    pub async fn connect(
        config: &DatabaseConfig,
        breaker: &RedisConfig,
    ) -> Result<Self, PostgresPoolError> {
        let circuit_breaker = Arc::new(CircuitBreaker::with_config(
            "postgres",
            CircuitBreakerConfig::from(breaker),
        ));
        Self::new(config, circuit_breaker).await
    }

    /// Create the `email_mappings` table and indexes when missing
    pub async fn ensure_schema(&self) -> Result<(), PostgresPoolError> {
        self.execute(|pool| async move { sqlx::raw_sql(SCHEMA).execute(&pool).await.map(|_| ()) })
            .await?;
        tracing::info!("email_mappings schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn is_available(&self) -> bool {
        self.circuit_breaker.allow_request()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    /// Run a query with circuit breaker protection.
    ///
    /// The pool handle is cloned into the closure so the returned future does
    /// not borrow `self`.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, PostgresPoolError>
    where
        F: FnOnce(PgPool) -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        if !self.circuit_breaker.allow_request() {
            return Err(PostgresPoolError::CircuitOpen);
        }

        match operation(self.pool.clone()).await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                // Constraint violations are caller errors, not backend outages
                if !matches!(e, sqlx::Error::Database(_) | sqlx::Error::RowNotFound) {
                    self.circuit_breaker.record_failure();
                }
                Err(PostgresPoolError::Sqlx(e))
            }
        }
    }

    /// Database URL with the password masked.
    pub fn database_url_masked(&self) -> String {
        mask_url(&self.database_url)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL connection pool closed");
    }
}

fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // "postgres://host" has its scheme colon before "//", not a password
            if !url[colon_pos..].starts_with("://") {
                return format!("{}***{}", &url[..colon_pos + 1], &url[at_pos..]);
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_masking_hides_password() {
        let masked = mask_url("postgres://mailer:secret123@db:5432/mail_mapper");
        assert_eq!(masked, "postgres://mailer:***@db:5432/mail_mapper");
    }

    #[test]
    fn test_url_masking_without_credentials() {
        let url = "postgres://localhost:5432/mail_mapper";
        assert_eq!(mask_url(url), url);

        let user_only = "postgres://mailer@localhost/mail_mapper";
        assert_eq!(mask_url(user_only), user_only);
    }

    #[test]
    fn test_schema_declares_partial_unique_index() {
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS email_mappings"));
        assert!(SCHEMA.contains("WHERE deleted_at IS NULL"));
    }
}

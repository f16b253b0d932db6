use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::mapping::MappingService;
use crate::notifier::MailMapper;
use crate::postgres::PostgresPool;
use crate::redis::RedisPool;
use crate::resolver::MappingResolver;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub resolver: Arc<MappingResolver>,
    pub mappings: Arc<MappingService>,
    pub notifier: Arc<MailMapper>,
    pub redis: Option<Arc<RedisPool>>,
    pub postgres: Option<PostgresPool>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        resolver: Arc<MappingResolver>,
        mappings: Arc<MappingService>,
        notifier: Arc<MailMapper>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            resolver,
            mappings,
            notifier,
            redis: None,
            postgres: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_redis(mut self, pool: Arc<RedisPool>) -> Self {
        self.redis = Some(pool);
        self
    }

    pub fn with_postgres(mut self, pool: PostgresPool) -> Self {
        self.postgres = Some(pool);
        self
    }
}

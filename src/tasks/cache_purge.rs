use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::cache::MappingCache;

/// Periodically drops expired template cache entries held in process
pub struct CachePurgeTask {
    cache: Arc<dyn MappingCache>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl CachePurgeTask {
    pub fn new(
        cache: Arc<dyn MappingCache>,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            cache,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);
        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            backend = self.cache.backend_name(),
            "Cache purge task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Cache purge task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    let removed = self.cache.evict_expired();
                    if removed > 0 {
                        tracing::debug!(removed, "Expired cache entries evicted");
                    }
                }
            }
        }

        tracing::info!("Cache purge task stopped");
    }
}

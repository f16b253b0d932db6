use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use mail_mapper_service::attachment::AttachmentNormalizer;
use mail_mapper_service::cache::create_cache_backend;
use mail_mapper_service::clock::system_clock;
use mail_mapper_service::config::Settings;
use mail_mapper_service::delivery::{
    create_transport, DeliveryQueue, DeliveryWorker, HttpFetcher, Mailer,
};
use mail_mapper_service::mapping::{create_mapping_store, MappingService};
use mail_mapper_service::notifier::MailMapper;
use mail_mapper_service::postgres::PostgresPool;
use mail_mapper_service::redis::RedisPool;
use mail_mapper_service::resolver::MappingResolver;
use mail_mapper_service::server::{create_app, AppState};
use mail_mapper_service::tasks::CachePurgeTask;
use mail_mapper_service::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    telemetry::init_tracing(&settings.logging);
    tracing::info!("Configuration loaded");

    let clock = system_clock();

    // PostgreSQL pool (only for the postgres store backend)
    let postgres_pool = if settings.store.backend == "postgres" {
        let pool = PostgresPool::connect(&settings.database, &settings.redis).await?;
        pool.ensure_schema().await?;
        Some(pool)
    } else {
        None
    };

    // Redis pool (only for the redis cache backend)
    let redis_pool = if settings.cache.backend == "redis" {
        let pool = Arc::new(RedisPool::from_config(&settings.redis)?);
        if let Err(e) = pool.ping().await {
            tracing::warn!(error = %e, "Redis not reachable at startup, cache reads will bypass it");
        }
        Some(pool)
    } else {
        None
    };

    let store = create_mapping_store(&settings.store, postgres_pool.clone(), clock.clone());
    let cache = create_cache_backend(&settings.cache, redis_pool.clone(), clock);
    let resolver = Arc::new(MappingResolver::new(store, cache.clone(), &settings.cache));
    let mappings = Arc::new(MappingService::new(resolver.clone(), &settings.api));

    // Delivery pipeline
    let transport = create_transport(&settings.mail)?;
    let fetcher = Arc::new(HttpFetcher::new(&settings.attachments)?);
    let mailer = Arc::new(Mailer::new(transport, fetcher, &settings.mail));
    let (queue, jobs) = DeliveryQueue::channel();

    let notifier = Arc::new(MailMapper::new(
        resolver.clone(),
        mappings.clone(),
        AttachmentNormalizer::new(&settings.attachments),
        queue,
    ));

    let mut state = AppState::new(settings.clone(), resolver, mappings, notifier);
    if let Some(pool) = redis_pool {
        state = state.with_redis(pool);
    }
    if let Some(pool) = postgres_pool.clone() {
        state = state.with_postgres(pool);
    }
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start delivery worker in background
    let worker = DeliveryWorker::new(mailer, jobs);
    let worker_handle = tokio::spawn(worker.run(shutdown_tx.subscribe()));

    // Start cache purge task in background
    let purge_task = CachePurgeTask::new(
        cache,
        Duration::from_secs(settings.cache.purge_interval_seconds.max(1)),
        shutdown_tx.subscribe(),
    );
    let purge_handle = tokio::spawn(purge_task.run());

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for in-flight deliveries to finish...");
    let _ = tokio::join!(worker_handle, purge_handle);

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop the delivery worker and background tasks
    let _ = shutdown_tx.send(());
}

//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub store: String,
    pub cache: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<BackendHealthResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<BackendHealthResponse>,
}

#[derive(Debug, Serialize)]
pub struct BackendHealthResponse {
    pub status: String,
    pub circuit_breaker: String,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let redis = state.redis.as_ref().map(|pool| BackendHealthResponse {
        status: pool.health().status().as_str().to_string(),
        circuit_breaker: pool.circuit_state().as_str().to_string(),
    });
    let postgres = state.postgres.as_ref().map(|pool| BackendHealthResponse {
        status: if pool.is_available() { "healthy" } else { "unavailable" }.to_string(),
        circuit_breaker: pool.circuit_state().as_str().to_string(),
    });

    let redis_ok = state.redis.as_ref().map_or(true, |pool| pool.is_healthy());
    let postgres_ok = state.postgres.as_ref().map_or(true, |pool| pool.is_available());
    let status = if redis_ok && postgres_ok {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        store: state.mappings.store_backend().to_string(),
        cache: state.resolver.cache().backend_name().to_string(),
        redis,
        postgres,
    })
}

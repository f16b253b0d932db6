use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::health;
use super::mappings::{create_mapping, delete_mapping, get_mapping, list_mappings, update_mapping};
use super::metrics::prometheus_metrics;
use super::notify::notify;

/// Routes reachable without an API key
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
}

pub fn api_routes() -> Router<AppState> {
    Router::new().nest(
        "/api/v1",
        Router::new()
            .route("/notify", post(notify))
            .route("/email-mappings", get(list_mappings).post(create_mapping))
            .route(
                "/email-mappings/{id}",
                get(get_mapping).put(update_mapping).delete(delete_mapping),
            ),
    )
}

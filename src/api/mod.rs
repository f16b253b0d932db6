//! HTTP endpoint handlers

mod health;
mod mappings;
mod metrics;
mod notify;
mod routes;

pub use health::{health, HealthResponse};
pub use mappings::{
    create_mapping, delete_mapping, get_mapping, list_mappings, update_mapping, DataResponse,
    ListQuery, MessageResponse,
};
pub use metrics::prometheus_metrics;
pub use notify::{notify, NotifyBody, NotifyResponse};
pub use routes::{api_routes, public_routes};

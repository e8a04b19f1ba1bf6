pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::handlers::{health, AppState};

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(handlers::metrics::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

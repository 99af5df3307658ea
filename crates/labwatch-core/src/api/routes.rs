//! API routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))

        // Reading ingestion
        .route("/api/v1/readings", post(handlers::ingest_reading))
        .route("/api/v1/readings/evaluate", post(handlers::evaluate_reading))

        // Alerts
        .route("/api/v1/alerts", get(handlers::list_alerts))
        .route("/api/v1/alerts/:alert_id", get(handlers::get_alert))
        .route("/api/v1/alerts/:alert_id/acknowledge", post(handlers::acknowledge_alert))
        .route("/api/v1/alerts/:alert_id/resolve", post(handlers::resolve_alert))

        // Thresholds
        .route("/api/v1/thresholds", get(handlers::get_thresholds))

        .with_state(state)
}

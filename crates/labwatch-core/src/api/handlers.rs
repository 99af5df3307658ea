//! API handlers for the HTTP REST API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::alerting::{AlertMonitor, AlertQuery, ThresholdTable};
use crate::error::Error;
use crate::models::{Alert, Evaluation, SensorReading};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<AlertMonitor>,
    pub metrics: Option<PrometheusHandle>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn error_response(err: Error) -> (StatusCode, String) {
    let status = match &err {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Conflict(_) | Error::InvalidTransition(_) => StatusCode::CONFLICT,
        Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => {
            error!(error = %err, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, err.to_string())
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus exposition
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "metrics exporter not installed".to_string(),
        ),
    }
}

/// Evaluate a reading and persist the resulting alert changes
pub async fn ingest_reading(
    State(state): State<AppState>,
    Json(reading): Json<SensorReading>,
) -> ApiResult<Evaluation> {
    state
        .monitor
        .process(&reading)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Evaluate a reading without persisting anything
pub async fn evaluate_reading(
    State(state): State<AppState>,
    Json(reading): Json<SensorReading>,
) -> ApiResult<Evaluation> {
    state
        .monitor
        .preview(&reading)
        .await
        .map(Json)
        .map_err(error_response)
}

/// List alerts
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> ApiResult<Vec<Alert>> {
    state
        .monitor
        .repository()
        .list(&query)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Get a single alert
pub async fn get_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> ApiResult<Alert> {
    match state.monitor.repository().get(alert_id).await {
        Ok(Some(alert)) => Ok(Json(alert)),
        Ok(None) => Err(error_response(Error::not_found(
            "Alert",
            alert_id.to_string(),
        ))),
        Err(e) => Err(error_response(e)),
    }
}

/// Acknowledge an open alert
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> ApiResult<Alert> {
    state
        .monitor
        .acknowledge(alert_id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Resolve an alert by hand
pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> ApiResult<Alert> {
    state
        .monitor
        .resolve(alert_id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Effective threshold table
pub async fn get_thresholds(State(state): State<AppState>) -> Json<ThresholdTable> {
    Json(state.monitor.evaluator().table().clone())
}

//! HTTP handlers for the incident gateway

use crate::AppState;
use aiops_ingest::EventEnvelope;
use axum::extract::{Json as ExtractJson, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::Value;
use tracing::{error, info};

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .route("/v1/events", post(handle_event))
        .with_state(state)
}

/// Liveness endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Prometheus exposition of engine and agent metrics
async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (
            StatusCode::NOT_FOUND,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}

/// Event ingest: accepts a raw envelope and drives the incident workflow
async fn handle_event(
    State(state): State<AppState>,
    ExtractJson(payload): ExtractJson<Value>,
) -> impl IntoResponse {
    let envelope: EventEnvelope = match serde_json::from_value(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": { "code": "INVALID_ENVELOPE", "message": e.to_string() }
                })),
            )
                .into_response();
        }
    };

    info!(detail_type = %envelope.detail_type, "event received");

    match state.engine.handle_event(&envelope).await {
        Ok(outcome) => Json(serde_json::json!(outcome)).into_response(),
        Err(e) => {
            error!(error = %e, "incident workflow failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": { "code": e.category().to_uppercase(), "message": e.to_string() }
                })),
            )
                .into_response()
        }
    }
}

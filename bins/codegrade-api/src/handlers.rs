// HTTP route handlers for the Codegrade API

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use codegrade_common::redis;
use codegrade_common::types::EvaluationRequest;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

/// POST /evaluate - Run code against the question's test cases and grade it
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EvaluationRequest>,
) -> Response {
    if payload.code.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "code must not be empty" })),
        )
            .into_response();
    }

    let report = match state.evaluator.evaluate(&payload).await {
        Ok(report) => report,
        Err(e) => return e.into_response(),
    };
    let evaluation_id = report.evaluation_id;

    // Persist for later lookup; the caller already has the report
    let mut conn = state.redis.clone();
    match redis::store_report(&mut conn, &report, state.report_ttl_seconds).await {
        Ok(_) => info!(evaluation_id = %evaluation_id, "Report persisted to Redis"),
        Err(e) => error!(evaluation_id = %evaluation_id, error = %e, "Failed to persist report"),
    }

    (StatusCode::OK, Json(report)).into_response()
}

/// GET /evaluation/{id} - Fetch a stored report
pub async fn get_evaluation(
    State(state): State<Arc<AppState>>,
    Path(evaluation_id): Path<Uuid>,
) -> Response {
    let mut conn = state.redis.clone();
    match redis::get_report(&mut conn, &evaluation_id).await {
        Ok(Some(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "evaluation not found" })),
        )
            .into_response(),
        Err(e) => {
            error!(evaluation_id = %evaluation_id, error = %e, "Failed to load report");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage unavailable" })),
            )
                .into_response()
        }
    }
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

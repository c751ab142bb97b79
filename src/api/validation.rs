//! Validation endpoints: manual response path and on-demand sweep.

use std::sync::Arc;

use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::{Extension, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use atelier_core::ValidationOrchestrator;

use super::{error_response, ApiResponse};

pub fn validation_routes() -> Router {
    Router::new()
        .route("/api/v1/validation/respond", post(respond))
        .route("/api/v1/validation/sweep", post(run_sweep))
}

#[derive(Debug, Deserialize)]
struct RespondRequest {
    validation_request_id: Uuid,
    approved: bool,
    data: Option<Value>,
    summary: Option<String>,
}

#[derive(Debug, Serialize)]
struct SweepResponse {
    timed_out: usize,
}

/// Apply a validation response directly (testing and manual operation;
/// the normal path is the bus listener)
async fn respond(
    Extension(orchestrator): Extension<Arc<ValidationOrchestrator>>,
    Json(body): Json<RespondRequest>,
) -> impl IntoResponse {
    let summary = body.summary.unwrap_or_else(|| {
        if body.approved {
            "manual: approved".to_string()
        } else {
            "manual: rejected".to_string()
        }
    });

    match orchestrator
        .handle_response(body.validation_request_id, body.approved, body.data, &summary)
        .await
    {
        Ok(outcome) => Json(ApiResponse::success(outcome)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Run one timeout sweep pass; returns how many requests transitioned
async fn run_sweep(
    Extension(orchestrator): Extension<Arc<ValidationOrchestrator>>,
) -> impl IntoResponse {
    match orchestrator.check_timeouts().await {
        Ok(timed_out) => Json(ApiResponse::success(SweepResponse { timed_out })).into_response(),
        Err(e) => error_response(&e),
    }
}

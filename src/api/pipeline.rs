//! Pipeline item endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::{Extension, Router};
use serde::Deserialize;
use uuid::Uuid;

use atelier_core::{Phase, PipelineEngine, PipelineItem, Store};

use super::{error_response, ApiResponse};

pub fn pipeline_routes() -> Router {
    Router::new()
        .route("/api/v1/pipeline", get(list_items).post(create_item))
        .route("/api/v1/pipeline/:id", get(get_item))
        .route("/api/v1/pipeline/:id/advance", post(advance_item))
        .route("/api/v1/pipeline/:id/phase", post(set_item_phase))
}

#[derive(Debug, Deserialize)]
struct CreateItemRequest {
    title: String,
    category: String,
    concept_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct ListItemsQuery {
    phase: Option<Phase>,
}

#[derive(Debug, Deserialize, Default)]
struct TransitionRequest {
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetPhaseRequest {
    phase: Phase,
    notes: Option<String>,
}

/// Create a pipeline item in `Discovery`
async fn create_item(
    Extension(store): Extension<Arc<Store>>,
    Json(body): Json<CreateItemRequest>,
) -> impl IntoResponse {
    let mut item = PipelineItem::new(body.title, body.category);
    if let Some(concept_id) = body.concept_id {
        // Reject dangling references up front
        if let Err(e) = store.get_concept(concept_id).await {
            return error_response(&e);
        }
        item = item.with_concept(concept_id);
    }

    match store.create_pipeline(&item).await {
        Ok(()) => Json(ApiResponse::success(item)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// List pipeline items, optionally filtered by phase
async fn list_items(
    Extension(store): Extension<Arc<Store>>,
    Query(query): Query<ListItemsQuery>,
) -> impl IntoResponse {
    match store.list_pipelines(query.phase).await {
        Ok(items) => Json(ApiResponse::success(items)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Get one pipeline item
async fn get_item(
    Extension(store): Extension<Arc<Store>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match store.get_pipeline(id).await {
        Ok(item) => Json(ApiResponse::success(item)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Advance an item to its single legal next phase
async fn advance_item(
    Extension(engine): Extension<Arc<PipelineEngine>>,
    Path(id): Path<Uuid>,
    body: Option<Json<TransitionRequest>>,
) -> impl IntoResponse {
    let notes = body.and_then(|Json(b)| b.notes);
    match engine.advance(id, notes.as_deref()).await {
        Ok(report) => Json(ApiResponse::success(report)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Explicitly move an item to a target phase
async fn set_item_phase(
    Extension(engine): Extension<Arc<PipelineEngine>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetPhaseRequest>,
) -> impl IntoResponse {
    match engine.set_phase(id, body.phase, body.notes.as_deref()).await {
        Ok(report) => Json(ApiResponse::success(report)).into_response(),
        Err(e) => error_response(&e),
    }
}

//! Concept endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::{Extension, Router};
use serde::Deserialize;
use uuid::Uuid;

use atelier_core::{Concept, Store, ValidationOrchestrator};

use super::{error_response, ApiResponse};

pub fn concepts_routes() -> Router {
    Router::new()
        .route("/api/v1/concepts", get(list_concepts).post(create_concept))
        .route("/api/v1/concepts/:id", get(get_concept))
        .route("/api/v1/concepts/:id/validate", post(validate_concept))
}

#[derive(Debug, Deserialize)]
struct CreateConceptRequest {
    title: String,
    category: String,
    target_retail: Option<f64>,
    target_cost: Option<f64>,
    brief: Option<String>,
    sketch_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListConceptsQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Create a draft concept
async fn create_concept(
    Extension(store): Extension<Arc<Store>>,
    Json(body): Json<CreateConceptRequest>,
) -> impl IntoResponse {
    let mut concept = Concept::new(body.title, body.category);
    if let (Some(retail), Some(cost)) = (body.target_retail, body.target_cost) {
        concept = concept.with_targets(retail, cost);
    } else {
        concept.target_retail = body.target_retail;
        concept.target_cost = body.target_cost;
    }
    concept.brief = body.brief;
    concept.sketch_url = body.sketch_url;

    match store.create_concept(&concept).await {
        Ok(()) => Json(ApiResponse::success(concept)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// List concepts, newest first
async fn list_concepts(
    Extension(store): Extension<Arc<Store>>,
    Query(query): Query<ListConceptsQuery>,
) -> impl IntoResponse {
    match store.list_concepts(query.limit.clamp(1, 200)).await {
        Ok(concepts) => Json(ApiResponse::success(concepts)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Get one concept
async fn get_concept(
    Extension(store): Extension<Arc<Store>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match store.get_concept(id).await {
        Ok(concept) => Json(ApiResponse::success(concept)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Issue the margin/capacity validation pair for a concept
async fn validate_concept(
    Extension(orchestrator): Extension<Arc<ValidationOrchestrator>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match orchestrator.request_validation(id).await {
        Ok(issue) => Json(ApiResponse::success(issue)).into_response(),
        Err(e) => error_response(&e),
    }
}

//! Event audit listing and the peer fallback ingress.

use std::sync::Arc;

use axum::extract::Query;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::{Extension, Router};
use serde::{Deserialize, Serialize};

use atelier_core::{Direction, EventBus, EventEnvelope, Store};

use super::{error_response, ApiResponse};

pub fn events_routes() -> Router {
    Router::new()
        .route("/api/v1/events", get(list_events))
        .route("/api/v1/events/receive", post(receive_event))
}

#[derive(Debug, Deserialize)]
struct ListEventsQuery {
    direction: Option<Direction>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
struct ReceiveResponse {
    accepted: bool,
    event_id: uuid::Uuid,
}

/// List audit rows, newest first
async fn list_events(
    Extension(store): Extension<Arc<Store>>,
    Query(query): Query<ListEventsQuery>,
) -> impl IntoResponse {
    match store
        .list_events(query.direction, query.limit.clamp(1, 500))
        .await
    {
        Ok(events) => Json(ApiResponse::success(events)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Ingress for peers delivering events over HTTP when the broker is down.
///
/// Accepting the envelope only means it was recorded and dispatched;
/// handler outcomes are not reflected in the response.
async fn receive_event(
    Extension(bus): Extension<Arc<EventBus>>,
    Json(envelope): Json<EventEnvelope>,
) -> impl IntoResponse {
    let event_id = envelope.event_id;
    bus.handle_incoming(envelope).await;
    Json(ApiResponse::success(ReceiveResponse {
        accepted: true,
        event_id,
    }))
    .into_response()
}

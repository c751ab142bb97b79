//! Web API for the atelier design module.
//!
//! REST endpoints for:
//! - Pipeline items and phase transitions
//! - Concepts and validation
//! - Event audit trail and the peer fallback ingress

pub mod concepts;
pub mod events;
pub mod health;
pub mod pipeline;
pub mod validation;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::Router;
use serde::Serialize;

use atelier_core::Error;

pub use concepts::concepts_routes;
pub use events::events_routes;
pub use health::health_routes;
pub use pipeline::pipeline_routes;
pub use validation::validation_routes;

/// Create the API router with all endpoints
pub fn api_router() -> Router {
    Router::new()
        .merge(health_routes())
        .merge(pipeline_routes())
        .merge(concepts_routes())
        .merge(validation_routes())
        .merge(events_routes())
}

/// Uniform response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> ApiResponse<T> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Map a core error onto a status code plus the wrapped error body
pub fn error_response(e: &Error) -> Response {
    let status = match e {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::IllegalTransition { .. } | Error::PrerequisiteNotMet { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::<()>::error(e.to_string()))).into_response()
}

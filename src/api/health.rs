//! Health check endpoints.
//!
//! - `/health` — simple status + version (for load balancers)
//! - `/health/detailed` — per-component checks (database, redis)

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Extension;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use atelier_core::{EventBus, Store};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub redis: ComponentHealth,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn healthy(latency_ms: u64) -> Self {
        Self {
            status: "healthy",
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    fn unhealthy(error: String) -> Self {
        Self {
            status: "unhealthy",
            latency_ms: None,
            error: Some(error),
        }
    }

    fn disabled() -> Self {
        Self {
            status: "disabled",
            latency_ms: None,
            error: None,
        }
    }
}

pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn health_detailed(
    Extension(store): Extension<Arc<Store>>,
    Extension(bus): Extension<Arc<EventBus>>,
) -> Json<DetailedHealthResponse> {
    let started = Instant::now();
    let database = match store.ping().await {
        Ok(()) => ComponentHealth::healthy(started.elapsed().as_millis() as u64),
        Err(e) => ComponentHealth::unhealthy(e.to_string()),
    };

    let redis = match bus.redis() {
        Some(client) => {
            let started = Instant::now();
            match client.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    let ping: Result<String, _> =
                        redis::cmd("PING").query_async(&mut conn).await;
                    match ping {
                        Ok(_) => ComponentHealth::healthy(started.elapsed().as_millis() as u64),
                        Err(e) => ComponentHealth::unhealthy(e.to_string()),
                    }
                }
                Err(e) => ComponentHealth::unhealthy(e.to_string()),
            }
        }
        None => ComponentHealth::disabled(),
    };

    let status = if database.status == "healthy" {
        "healthy"
    } else {
        "degraded"
    };

    Json(DetailedHealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks { database, redis },
    })
}

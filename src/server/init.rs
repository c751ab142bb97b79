//! Server initialization and run loop.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Extension;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use atelier_core::event_bus::{listener, ApprovalDecidedHandler, ValidationResponseHandler};
use atelier_core::validation::sweep;
use atelier_core::{
    BusConfig, DraftTechPackGenerator, EventBus, ModuleEndpoints, PipelineEngine, Store,
    ValidationOrchestrator,
};

use super::config::AppConfig;

/// Everything the API layer needs, wired once at startup
struct Components {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    orchestrator: Arc<ValidationOrchestrator>,
    engine: Arc<PipelineEngine>,
}

async fn build(config: &AppConfig) -> Result<Components> {
    let store = Arc::new(
        Store::from_path(Path::new(&config.database.path))
            .await
            .context("failed to open database")?,
    );

    let bus_config = BusConfig {
        redis_url: config.redis.effective_url(),
        endpoints: ModuleEndpoints {
            finance_url: config.modules.finance_url.clone(),
            operations_url: config.modules.operations_url.clone(),
            marketing_url: config.modules.marketing_url.clone(),
            executive_url: config.modules.executive_url.clone(),
        },
    };
    let bus = Arc::new(EventBus::new(store.clone(), bus_config).context("failed to build bus")?);

    let orchestrator = Arc::new(ValidationOrchestrator::new(store.clone(), bus.clone()));
    let engine = Arc::new(PipelineEngine::new(
        store.clone(),
        bus.clone(),
        orchestrator.clone(),
        Arc::new(DraftTechPackGenerator::new(store.clone())),
    ));

    let response_handler = Arc::new(ValidationResponseHandler::new(orchestrator.clone()));
    bus.register_handler("margin_check_response", response_handler.clone())
        .await;
    bus.register_handler("capacity_check_response", response_handler)
        .await;
    bus.register_handler("approval_decided", Arc::new(ApprovalDecidedHandler))
        .await;

    Ok(Components {
        store,
        bus,
        orchestrator,
        engine,
    })
}

/// Start the server with listener and sweep tasks; blocks until shutdown
pub async fn run(config: AppConfig) -> Result<()> {
    info!("starting atelier v{}", env!("CARGO_PKG_VERSION"));

    let components = build(&config).await?;
    let token = CancellationToken::new();
    let mut tasks = Vec::new();

    if components.bus.redis().is_some() {
        tasks.push((
            "bus listener",
            listener::spawn(components.bus.clone(), token.child_token()),
        ));
    } else {
        warn!("redis disabled, inbound events arrive only via the http ingress");
    }

    if config.sweep.enabled {
        tasks.push((
            "timeout sweep",
            sweep::spawn(
                components.orchestrator.clone(),
                Duration::from_secs(config.sweep.interval_secs),
                token.child_token(),
            ),
        ));
    }

    let app = crate::api::api_router()
        .layer(Extension(components.store))
        .layer(Extension(components.bus))
        .layer(Extension(components.orchestrator))
        .layer(Extension(components.engine))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    info!("http server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    let shutdown_token = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown_token.cancel();
        })
        .await
        .context("http server error")?;

    token.cancel();
    for (name, handle) in tasks {
        match tokio::time::timeout(Duration::from_secs(5), handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task = name, error = %e, "background task error"),
            Err(_) => warn!(task = name, "background task shutdown timeout"),
        }
    }

    info!("atelier shutdown complete");
    Ok(())
}

/// Run one timeout sweep pass (the `sweep` subcommand)
pub async fn run_sweep_once(config: AppConfig) -> Result<usize> {
    let components = build(&config).await?;
    let count = components.orchestrator.check_timeouts().await?;
    Ok(count)
}

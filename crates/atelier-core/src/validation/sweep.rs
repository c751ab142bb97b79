//! Periodic timeout sweep.
//!
//! Runs on its own schedule, fully decoupled from request handling and
//! the bus listener; it only ever moves expired `Sent` rows to
//! `TimedOut`, so racing a late response is safe (the status guard in
//! the store decides the winner).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::orchestrator::ValidationOrchestrator;

/// Default sweep cadence
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the sweep task; ticks every `interval` until cancelled.
pub fn spawn(
    orchestrator: Arc<ValidationOrchestrator>,
    interval: Duration,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval fires immediately; consume that so the first real
        // sweep happens one full period after startup
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "timeout sweep started");
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("timeout sweep stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match orchestrator.check_timeouts().await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "sweep transitioned expired requests"),
                        Err(e) => error!(error = %e, "timeout sweep failed"),
                    }
                }
            }
        }
    })
}

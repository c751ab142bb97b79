//! Background broker listener.
//!
//! One long-lived task per process, subscribed to this module's private
//! channel plus the shared broadcast channel. Messages originating from
//! this module are skipped; everything else is routed into
//! `EventBus::handle_incoming`. Failures are logged and the task exits;
//! reconnect is an operational concern, not handled here.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::bus::EventBus;
use super::types::{EventEnvelope, CHANNEL_PREFIX, SOURCE_MODULE};

/// Spawn the listener task. Returns immediately; the handle resolves when
/// the listener stops (cancellation, broker disconnect, or startup failure).
pub fn spawn(bus: Arc<EventBus>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Some(client) = bus.redis() else {
            warn!("redis not configured, event listener not started");
            return;
        };

        let mut pubsub = match client.get_async_pubsub().await {
            Ok(ps) => ps,
            Err(e) => {
                error!(error = %e, "event listener failed to connect to broker");
                return;
            }
        };

        let own_channel = format!("{CHANNEL_PREFIX}:{SOURCE_MODULE}");
        let broadcast_channel = format!("{CHANNEL_PREFIX}:broadcast");
        for channel in [&own_channel, &broadcast_channel] {
            if let Err(e) = pubsub.subscribe(channel).await {
                error!(channel = %channel, error = %e, "failed to subscribe");
                return;
            }
        }
        info!(
            channels = %format!("{own_channel} + {broadcast_channel}"),
            "event listener started"
        );

        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("event listener stopping");
                    break;
                }
                msg = messages.next() => {
                    let Some(msg) = msg else {
                        warn!("broker connection closed, event listener stopping");
                        break;
                    };

                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "unreadable broker message, skipped");
                            continue;
                        }
                    };

                    let envelope: EventEnvelope = match serde_json::from_str(&payload) {
                        Ok(env) => env,
                        Err(e) => {
                            warn!(error = %e, "malformed event envelope, skipped");
                            continue;
                        }
                    };

                    // Our own broadcasts come back on the shared channel.
                    if envelope.source_module == SOURCE_MODULE {
                        continue;
                    }

                    bus.handle_incoming(envelope).await;
                }
            }
        }
    })
}

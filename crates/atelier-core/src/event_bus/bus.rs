//! Outbound publish and inbound dispatch.
//!
//! Delivery contract: `publish` always writes one outbound audit row and
//! always returns an event id; it tries the broker once, then the direct
//! HTTP fallback once, and swallows transport failures. Callers treat it
//! as fire-and-forget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::{
    DeliveryStatus, EventEnvelope, EventRecord, Module, OutboundEvent, CHANNEL_PREFIX,
    SOURCE_MODULE,
};
use crate::error::{Error, Result};
use crate::store::Store;

/// Broker connect timeout
const BROKER_TIMEOUT: Duration = Duration::from_secs(5);
/// Fallback HTTP call timeout
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Statically-configured fallback endpoints, one base URL per module.
///
/// An unset URL disables the fallback for that module; the broker path is
/// still attempted.
#[derive(Debug, Clone, Default)]
pub struct ModuleEndpoints {
    /// Finance module base URL
    pub finance_url: Option<String>,
    /// Operations module base URL
    pub operations_url: Option<String>,
    /// Marketing module base URL
    pub marketing_url: Option<String>,
    /// Executive module base URL
    pub executive_url: Option<String>,
}

impl ModuleEndpoints {
    fn base_url(&self, module: Module) -> Option<&str> {
        let url = match module {
            Module::Finance => &self.finance_url,
            Module::Operations => &self.operations_url,
            Module::Marketing => &self.marketing_url,
            Module::Executive => &self.executive_url,
        };
        url.as_deref().filter(|u| !u.is_empty())
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Default)]
pub struct BusConfig {
    /// Redis URL; empty or unset disables the broker path
    pub redis_url: Option<String>,
    /// Per-module fallback endpoints
    pub endpoints: ModuleEndpoints,
}

/// Outbound seam for components that publish events.
///
/// The engine and orchestrator depend on this trait, not on `EventBus`,
/// so tests can substitute a recording double.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event; returns the generated event id regardless of
    /// delivery outcome.
    async fn publish(
        &self,
        event_type: OutboundEvent,
        payload: Value,
        target: Option<Module>,
    ) -> Uuid;
}

/// Handler for one inbound event type
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process an inbound envelope. Errors are logged by the dispatcher,
    /// never propagated to the transport.
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()>;
}

/// Best-effort bus over a Redis broker with a per-target HTTP fallback
pub struct EventBus {
    store: Arc<Store>,
    redis: Option<redis::Client>,
    http: reqwest::Client,
    endpoints: ModuleEndpoints,
    handlers: RwLock<HashMap<String, Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a bus over the shared store.
    ///
    /// A bad Redis URL downgrades the bus to fallback-only rather than
    /// failing construction; an unreachable broker is an operational
    /// condition, not a config error.
    pub fn new(store: Arc<Store>, config: BusConfig) -> Result<Self> {
        let redis = match config.redis_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => match redis::Client::open(url) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(error = %e, "invalid redis url, broker path disabled");
                    None
                }
            },
            None => None,
        };

        let http = reqwest::Client::builder()
            .timeout(FALLBACK_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build http client: {e}")))?;

        Ok(Self {
            store,
            redis,
            http,
            endpoints: config.endpoints,
            handlers: RwLock::new(HashMap::new()),
        })
    }

    /// Redis client handle for the background listener
    #[must_use]
    pub fn redis(&self) -> Option<redis::Client> {
        self.redis.clone()
    }

    /// Register a handler for an inbound event type.
    ///
    /// Called once at startup; later registrations for the same type
    /// replace the earlier handler.
    pub async fn register_handler(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.insert(event_type.to_string(), handler);
    }

    /// Record and dispatch an inbound envelope.
    ///
    /// Unknown event types are logged and dropped; handler failures are
    /// logged and swallowed so the listener keeps running.
    pub async fn handle_incoming(&self, envelope: EventEnvelope) {
        debug!(
            event_type = %envelope.event_type,
            source = %envelope.source_module,
            "received event"
        );

        let record = EventRecord::inbound(&envelope);
        if let Err(e) = self.store.insert_event(&record).await {
            error!(error = %e, "failed to audit inbound event");
        }

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&envelope.event_type).cloned()
        };

        match handler {
            Some(h) => {
                if let Err(e) = h.handle(&envelope).await {
                    error!(
                        event_type = %envelope.event_type,
                        error = %e,
                        "event handler failed"
                    );
                }
            }
            None => {
                debug!(event_type = %envelope.event_type, "no handler registered, dropped");
            }
        }
    }

    async fn try_broker(&self, envelope: &EventEnvelope) -> Result<i64> {
        let client = self
            .redis
            .as_ref()
            .ok_or_else(|| Error::Internal("broker not configured".to_string()))?;

        let channel = match &envelope.target_module {
            Some(target) => format!("{CHANNEL_PREFIX}:{target}"),
            None => format!("{CHANNEL_PREFIX}:broadcast"),
        };
        let body = serde_json::to_string(envelope)?;

        let mut conn = tokio::time::timeout(
            BROKER_TIMEOUT,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| Error::Internal("broker connect timed out".to_string()))?
        .map_err(|e| Error::Internal(format!("broker connect failed: {e}")))?;

        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(body)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Internal(format!("broker publish failed: {e}")))?;

        debug!(
            channel = %channel,
            receivers,
            event_type = %envelope.event_type,
            "published to broker"
        );
        Ok(receivers)
    }

    /// One direct HTTP call per the fixed module → endpoint table.
    ///
    /// Three modules expose a generic receive-event contract; the
    /// executive module takes a structured approval-request shape instead.
    async fn try_fallback(&self, envelope: &EventEnvelope, target: Module) -> Result<bool> {
        let Some(base) = self.endpoints.base_url(target) else {
            return Ok(false);
        };

        let (url, body) = match target {
            Module::Executive => (
                format!("{base}/executive/approvals"),
                json!({
                    "requesting_module": SOURCE_MODULE,
                    "request_type": envelope.event_type,
                    "title": envelope.payload.get("title")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("{SOURCE_MODULE}: {}", envelope.event_type)),
                    "description": envelope.payload.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or(""),
                    "payload": envelope.payload,
                    "risk_level": envelope.payload.get("risk_level")
                        .and_then(Value::as_str)
                        .unwrap_or("low"),
                }),
            ),
            Module::Finance => (
                format!("{base}/finance/events/receive"),
                serde_json::to_value(envelope)?,
            ),
            Module::Operations => (
                format!("{base}/operations/events/receive"),
                serde_json::to_value(envelope)?,
            ),
            Module::Marketing => (
                format!("{base}/api/events/webhook"),
                serde_json::to_value(envelope)?,
            ),
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("fallback call failed: {e}")))?;

        if response.status().is_success() {
            info!(target = %target, url = %url, "delivered via http fallback");
            Ok(true)
        } else {
            warn!(
                target = %target,
                status = %response.status(),
                "fallback endpoint rejected event"
            );
            Ok(false)
        }
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(
        &self,
        event_type: OutboundEvent,
        payload: Value,
        target: Option<Module>,
    ) -> Uuid {
        let envelope = EventEnvelope::outbound(event_type, payload, target);
        let record = EventRecord::outbound(&envelope);

        // Audit row first, unconditionally; delivery may still fail.
        if let Err(e) = self.store.insert_event(&record).await {
            error!(error = %e, event_type = %event_type, "failed to audit outbound event");
        }

        let mut delivery = None;

        match self.try_broker(&envelope).await {
            Ok(receivers) if receivers > 0 => delivery = Some(DeliveryStatus::Broker),
            Ok(_) => debug!(event_type = %event_type, "broker had no listeners"),
            Err(e) => warn!(event_type = %event_type, error = %e, "broker path failed"),
        }

        if delivery.is_none() {
            if let Some(target) = target {
                match self.try_fallback(&envelope, target).await {
                    Ok(true) => delivery = Some(DeliveryStatus::Fallback),
                    Ok(false) => {}
                    Err(e) => {
                        warn!(event_type = %event_type, error = %e, "fallback path failed");
                    }
                }
            }
        }

        let resolved = delivery.unwrap_or(DeliveryStatus::Failed);
        if resolved == DeliveryStatus::Failed {
            warn!(
                event_type = %event_type,
                target = ?target,
                "event not delivered on any transport"
            );
        }
        if let Err(e) = self.store.set_event_delivery(record.id, resolved).await {
            error!(error = %e, "failed to record delivery outcome");
        }

        envelope.event_id
    }
}

//! Inbound event handlers registered on the bus at startup.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::bus::EventHandler;
use super::types::{EventEnvelope, SOURCE_MODULE};
use crate::error::{Error, Result};
use crate::validation::ValidationOrchestrator;

/// Routes margin/capacity check responses into the orchestrator.
///
/// Duplicate deliveries are harmless: the orchestrator's terminal-status
/// guard turns a second response for the same request into a no-op.
pub struct ValidationResponseHandler {
    orchestrator: Arc<ValidationOrchestrator>,
}

impl ValidationResponseHandler {
    /// Create a handler over the shared orchestrator
    #[must_use]
    pub fn new(orchestrator: Arc<ValidationOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl EventHandler for ValidationResponseHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload = &envelope.payload;

        let request_id = payload
            .get("validation_request_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                Error::Internal(format!(
                    "{} missing validation_request_id",
                    envelope.event_type
                ))
            })?;

        let approved = payload
            .get("approved")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let summary = payload
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "{}: {}",
                    envelope.source_module,
                    if approved { "approved" } else { "rejected" }
                )
            });

        let outcome = self
            .orchestrator
            .handle_response(request_id, approved, Some(payload.clone()), &summary)
            .await?;

        info!(
            request_id = %request_id,
            status = %outcome.status,
            concept_status = %outcome.concept_status,
            "validation response processed"
        );
        Ok(())
    }
}

/// Executive decision notices are audit-only: log and move on, the
/// pipeline phase is never driven from here.
pub struct ApprovalDecidedHandler;

#[async_trait]
impl EventHandler for ApprovalDecidedHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let requesting_module = envelope
            .payload
            .get("requesting_module")
            .and_then(Value::as_str)
            .unwrap_or("");

        if requesting_module != SOURCE_MODULE {
            return Ok(());
        }

        let status = envelope
            .payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        if status == "approved" {
            info!(status = %status, "executive decided on a request from this module");
        } else {
            warn!(status = %status, "executive decided on a request from this module");
        }
        Ok(())
    }
}

//! Validation orchestrator.
//!
//! Turns one concept's readiness into a margin check (finance) and a
//! capacity check (operations), tracks both against a 48h deadline, and
//! folds the two terminal outcomes into a single verdict: Validated only
//! when both approve, ValidationFailed on any rejection or timeout.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::types::{
    CheckType, Concept, ConceptStatus, RequestDescriptor, ResponseOutcome, ValidationIssue,
    ValidationRequest, ValidationStatus, DEFAULT_BATCH_UNITS, VALIDATION_TIMEOUT_HOURS,
};
use crate::error::Result;
use crate::event_bus::{EventPublisher, OutboundEvent};
use crate::store::Store;

/// Issues and resolves cross-module validation for product concepts
pub struct ValidationOrchestrator {
    store: Arc<Store>,
    publisher: Arc<dyn EventPublisher>,
}

impl ValidationOrchestrator {
    /// Create an orchestrator over the shared store and bus
    pub fn new(store: Arc<Store>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Issue the margin/capacity request pair for a concept.
    ///
    /// Idempotent while requests are open: if any `Sent` request already
    /// exists for the concept, the existing pair is returned and nothing
    /// is reissued. A concept whose previous round ended in rejection or
    /// timeout gets a brand-new pair; old rows are never reused.
    ///
    /// Each request row is persisted before its event is published, and
    /// this method never waits for responses.
    pub async fn request_validation(&self, concept_id: Uuid) -> Result<ValidationIssue> {
        let concept = self.store.get_concept(concept_id).await?;

        let open = self.store.open_requests_for_concept(concept_id).await?;
        if !open.is_empty() {
            if let Some(issue) = self.existing_pair(concept_id, &open) {
                info!(
                    concept = %concept.number,
                    "validation already in flight, not reissuing"
                );
                return Ok(issue);
            }
        }

        let margin = self.issue_check(&concept, CheckType::Margin).await?;
        let capacity = self.issue_check(&concept, CheckType::Capacity).await?;

        self.store
            .set_concept_status(concept_id, ConceptStatus::Validating)
            .await?;
        self.store
            .set_check_status(concept_id, CheckType::Margin, ValidationStatus::Sent)
            .await?;
        self.store
            .set_check_status(concept_id, CheckType::Capacity, ValidationStatus::Sent)
            .await?;

        info!(
            concept = %concept.number,
            margin_request = %margin.request_id,
            capacity_request = %capacity.request_id,
            "validation requested"
        );

        Ok(ValidationIssue {
            concept_id,
            margin,
            capacity,
            newly_issued: true,
        })
    }

    fn existing_pair(&self, concept_id: Uuid, open: &[ValidationRequest]) -> Option<ValidationIssue> {
        let find = |check: CheckType| {
            open.iter()
                .find(|r| r.check_type == check)
                .map(|r| RequestDescriptor {
                    request_id: r.id,
                    check_type: r.check_type,
                    target: r.target_module,
                    event_id: r.event_id,
                    timeout_at: r.timeout_at,
                })
        };

        Some(ValidationIssue {
            concept_id,
            margin: find(CheckType::Margin)?,
            capacity: find(CheckType::Capacity)?,
            newly_issued: false,
        })
    }

    async fn issue_check(&self, concept: &Concept, check: CheckType) -> Result<RequestDescriptor> {
        let payload = match check {
            CheckType::Margin => json!({
                "concept_id": concept.id,
                "concept_number": concept.number,
                "title": concept.title,
                "category": concept.category,
                "target_retail": concept.target_retail,
                "target_cost": concept.target_cost,
                "target_margin": concept.target_margin,
                "request_type": "margin_check",
            }),
            CheckType::Capacity => json!({
                "concept_id": concept.id,
                "concept_number": concept.number,
                "title": concept.title,
                "category": concept.category,
                "estimated_units": DEFAULT_BATCH_UNITS,
                "request_type": "capacity_check",
            }),
        };

        let request = ValidationRequest::new(concept.id, check, payload.clone());
        // Persist before publishing so an inbound response can never
        // reference a request we have no record of.
        self.store.create_request(&request).await?;

        let mut event_payload = payload;
        let extra = match check {
            CheckType::Margin => json!({
                "title": format!("Margin Check: {}", concept.title),
                "message": format!(
                    "Please validate margins for {} (retail: {:?}, cost: {:?})",
                    concept.title, concept.target_retail, concept.target_cost
                ),
                "validation_request_id": request.id,
            }),
            CheckType::Capacity => json!({
                "title": format!("Capacity Check: {}", concept.title),
                "message": format!(
                    "Please check production capacity for {} (estimated {} units)",
                    concept.title, DEFAULT_BATCH_UNITS
                ),
                "validation_request_id": request.id,
            }),
        };
        merge(&mut event_payload, extra);

        let event_type = match check {
            CheckType::Margin => OutboundEvent::MarginCheckRequest,
            CheckType::Capacity => OutboundEvent::CapacityCheckRequest,
        };
        let event_id = self
            .publisher
            .publish(event_type, event_payload, Some(check.approver()))
            .await;
        self.store.set_request_event_id(request.id, event_id).await?;

        Ok(RequestDescriptor {
            request_id: request.id,
            check_type: check,
            target: check.approver(),
            event_id: Some(event_id),
            timeout_at: request.timeout_at,
        })
    }

    /// Apply an approver's response to its request.
    ///
    /// `NotFound` for an unknown id. A response for a request that is
    /// already terminal is a no-op (duplicate delivery, or the sweep got
    /// there first); the current state is returned unchanged.
    pub async fn handle_response(
        &self,
        request_id: Uuid,
        approved: bool,
        data: Option<Value>,
        summary: &str,
    ) -> Result<ResponseOutcome> {
        let request = self.store.get_request(request_id).await?;

        let status = if approved {
            ValidationStatus::Approved
        } else {
            ValidationStatus::Rejected
        };

        let updated = self
            .store
            .finalize_request(request_id, status, data.as_ref(), summary, Some(Utc::now()))
            .await?;

        if !updated {
            let current = self.store.get_request(request_id).await?;
            let concept = self.store.get_concept(request.concept_id).await?;
            info!(
                request_id = %request_id,
                status = %current.status,
                "response for already-terminal request ignored"
            );
            return Ok(ResponseOutcome {
                request_id,
                status: current.status,
                concept_id: request.concept_id,
                concept_status: concept.status,
            });
        }

        self.store
            .set_check_status(request.concept_id, request.check_type, status)
            .await?;
        let concept_status = self.aggregate(request.concept_id).await?;

        Ok(ResponseOutcome {
            request_id,
            status,
            concept_id: request.concept_id,
            concept_status,
        })
    }

    /// Sweep expired requests into `TimedOut`.
    ///
    /// Scheduled hourly; also callable on demand. Returns how many rows
    /// actually transitioned (a row answered between the select and the
    /// guarded update does not count).
    pub async fn check_timeouts(&self) -> Result<usize> {
        let expired = self.store.expired_requests(Utc::now()).await?;

        let mut count = 0;
        for request in expired {
            let summary = format!("timed out after {VALIDATION_TIMEOUT_HOURS} hours");
            let updated = self
                .store
                .finalize_request(request.id, ValidationStatus::TimedOut, None, &summary, None)
                .await?;
            if !updated {
                continue;
            }

            self.store
                .set_check_status(
                    request.concept_id,
                    request.check_type,
                    ValidationStatus::TimedOut,
                )
                .await?;
            self.aggregate(request.concept_id).await?;
            count += 1;
        }

        if count > 0 {
            warn!(count, "validation requests timed out");
        }
        Ok(count)
    }

    /// Fold both per-checker outcomes into the concept status once both
    /// are terminal; no verdict while either is still `Sent`.
    async fn aggregate(&self, concept_id: Uuid) -> Result<ConceptStatus> {
        let concept = self.store.get_concept(concept_id).await?;

        if let (Some(margin), Some(capacity)) =
            (concept.margin_validation, concept.capacity_validation)
        {
            if margin.is_terminal() && capacity.is_terminal() {
                let verdict = if margin == ValidationStatus::Approved
                    && capacity == ValidationStatus::Approved
                {
                    ConceptStatus::Validated
                } else {
                    ConceptStatus::ValidationFailed
                };
                if concept.status != verdict {
                    self.store.set_concept_status(concept_id, verdict).await?;
                }
                return Ok(verdict);
            }
        }

        Ok(concept.status)
    }
}

fn merge(base: &mut Value, extra: Value) {
    if let (Value::Object(base), Value::Object(extra)) = (base, extra) {
        base.extend(extra);
    }
}

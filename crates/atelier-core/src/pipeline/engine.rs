//! Pipeline engine.
//!
//! Owns the phase state machine. A transition is persisted first, then
//! its entry side effects fire independently; a failed publish never
//! rolls back a legitimate phase change. Handoff flags record that a
//! broadcast was *attempted*, not that the counterpart received it.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use super::types::{Phase, PipelineItem, TransitionReport};
use crate::error::{Error, Result};
use crate::event_bus::{EventPublisher, Module, OutboundEvent};
use crate::store::Store;
use crate::techpack::TechPackGenerator;
use crate::validation::{Concept, ConceptStatus, ValidationOrchestrator, ValidationStatus,
    DEFAULT_BATCH_UNITS};

/// Drives pipeline items through the phase state machine
pub struct PipelineEngine {
    store: Arc<Store>,
    publisher: Arc<dyn EventPublisher>,
    validation: Arc<ValidationOrchestrator>,
    tech_packs: Arc<dyn TechPackGenerator>,
}

impl PipelineEngine {
    /// Create an engine over the shared store, bus, and collaborators
    pub fn new(
        store: Arc<Store>,
        publisher: Arc<dyn EventPublisher>,
        validation: Arc<ValidationOrchestrator>,
        tech_packs: Arc<dyn TechPackGenerator>,
    ) -> Self {
        Self {
            store,
            publisher,
            validation,
            tech_packs,
        }
    }

    /// Advance an item to the single legal next phase.
    ///
    /// The next phase is computed from the current phase's prerequisite;
    /// `PrerequisiteNotMet` when it cannot be determined, with nothing
    /// mutated.
    pub async fn advance(&self, item_id: Uuid, notes: Option<&str>) -> Result<TransitionReport> {
        let item = self.store.get_pipeline(item_id).await?;
        let next = self.determine_next_phase(&item).await?;
        self.transition(item, next, notes).await
    }

    /// Explicitly move an item to `target`.
    ///
    /// `IllegalTransition` (carrying the allowed set, nothing mutated)
    /// when `target` is not reachable from the current phase.
    pub async fn set_phase(
        &self,
        item_id: Uuid,
        target: Phase,
        notes: Option<&str>,
    ) -> Result<TransitionReport> {
        let item = self.store.get_pipeline(item_id).await?;

        if !item.current_phase.can_transition_to(target) {
            return Err(Error::IllegalTransition {
                from: item.current_phase,
                to: target,
                allowed: item.current_phase.allowed_transitions().to_vec(),
            });
        }

        self.transition(item, target, notes).await
    }

    async fn determine_next_phase(&self, item: &PipelineItem) -> Result<Phase> {
        let current = item.current_phase;
        let unmet = |reason: String| Error::PrerequisiteNotMet {
            phase: current,
            reason,
        };

        match current {
            Phase::Discovery => Ok(Phase::Concept),

            Phase::Concept => {
                let concept = self.require_concept(item).await?;
                if concept.status == ConceptStatus::Validated {
                    return Err(unmet("concept is already validated".to_string()));
                }
                Ok(Phase::Validation)
            }

            Phase::Validation => {
                let concept = self.require_concept(item).await?;
                match concept.status {
                    ConceptStatus::Validated => Ok(Phase::Approval),
                    ConceptStatus::Draft => {
                        // First advance after landing here without the
                        // entry side effect having run (explicit set_phase
                        // paths): issue the checks, then wait.
                        self.validation.request_validation(concept.id).await?;
                        Err(unmet("validation issued, awaiting responses".to_string()))
                    }
                    ConceptStatus::Validating => {
                        Err(unmet("validation pending".to_string()))
                    }
                    ConceptStatus::ValidationFailed => {
                        Err(unmet("validation failed, revise the concept".to_string()))
                    }
                }
            }

            Phase::Approval => {
                let concept = self.require_concept(item).await?;
                if concept.executive_approval != Some(ValidationStatus::Approved) {
                    self.store
                        .set_executive_approval(concept.id, ValidationStatus::Approved)
                        .await?;
                    info!(concept = %concept.number, "executive approval recorded on advance");
                }
                Ok(Phase::TechnicalDesign)
            }

            Phase::TechnicalDesign => {
                if item.tech_pack_id.is_some() {
                    Ok(Phase::Handoff)
                } else {
                    Err(unmet("no tech pack linked".to_string()))
                }
            }

            Phase::Handoff => {
                if item.handoff_to_operations {
                    Ok(Phase::Complete)
                } else {
                    Err(unmet("operations handoff not attempted".to_string()))
                }
            }

            Phase::Complete | Phase::Cancelled => {
                Err(unmet(format!("{current} is a terminal phase")))
            }
        }
    }

    async fn require_concept(&self, item: &PipelineItem) -> Result<Concept> {
        let concept_id = item.concept_id.ok_or_else(|| Error::PrerequisiteNotMet {
            phase: item.current_phase,
            reason: "no concept linked".to_string(),
        })?;
        self.store.get_concept(concept_id).await
    }

    async fn transition(
        &self,
        item: PipelineItem,
        target: Phase,
        notes: Option<&str>,
    ) -> Result<TransitionReport> {
        let old_phase = item.current_phase;
        let now = Utc::now();

        // Persist first; side effects are effects-after-commit.
        let item = self
            .store
            .update_pipeline_phase(item.id, target, now, notes)
            .await?;

        self.on_phase_enter(&item, target).await;

        info!(
            item = %item.number,
            from = %old_phase,
            to = %target,
            "pipeline transitioned"
        );

        Ok(TransitionReport {
            item_id: item.id,
            number: item.number,
            old_phase,
            new_phase: target,
            transitioned_at: now,
        })
    }

    /// Entry side effects for the new phase, each attempted independently.
    async fn on_phase_enter(&self, item: &PipelineItem, phase: Phase) {
        match phase {
            Phase::Validation => {
                if let Some(concept_id) = item.concept_id {
                    if let Err(e) = self.validation.request_validation(concept_id).await {
                        error!(item = %item.number, error = %e, "failed to issue validation");
                    }
                }
            }

            Phase::TechnicalDesign => {
                if item.tech_pack_id.is_none() {
                    if let Some(concept_id) = item.concept_id {
                        match self.tech_packs.generate_from_concept(concept_id).await {
                            Ok(pack) => {
                                if let Err(e) =
                                    self.store.link_tech_pack(item.id, pack.id).await
                                {
                                    error!(item = %item.number, error = %e, "failed to link tech pack");
                                } else {
                                    info!(item = %item.number, tech_pack = %pack.number, "tech pack generated");
                                }
                            }
                            Err(e) => {
                                error!(item = %item.number, error = %e, "tech pack generation failed");
                            }
                        }
                    }
                }
            }

            Phase::Handoff => self.execute_handoff(item).await,

            Phase::Complete => self.announce_complete(item).await,

            _ => {}
        }

        // Low-priority status notice to the executive dashboard.
        self.publisher
            .publish(
                OutboundEvent::PipelineStatus,
                json!({
                    "title": format!("Pipeline Update: {}", item.title),
                    "message": format!("Product '{}' moved to {} phase", item.title, phase),
                    "number": item.number,
                    "phase": phase,
                }),
                Some(Module::Executive),
            )
            .await;
    }

    /// The handoff triad: one broadcast per downstream consumer, each with
    /// its own payload shape, each flag set per publish attempt.
    async fn execute_handoff(&self, item: &PipelineItem) {
        let concept = self.concept_of(item).await;

        // Operations gets the tech pack.
        if let Some(tech_pack_id) = item.tech_pack_id {
            match self.store.get_tech_pack(tech_pack_id).await {
                Ok(pack) => {
                    self.publisher
                        .publish(
                            OutboundEvent::ProductionHandoff,
                            json!({
                                "title": format!("New Product for Production: {}", item.title),
                                "message": format!(
                                    "Tech pack {} ready for production", pack.number
                                ),
                                "tech_pack_id": pack.id,
                                "tech_pack_number": pack.number,
                                "item_number": item.number,
                                "category": item.category,
                            }),
                            Some(Module::Operations),
                        )
                        .await;
                    self.set_handoff(item.id, Module::Operations).await;
                }
                Err(e) => {
                    error!(item = %item.number, error = %e, "handoff: tech pack lookup failed");
                }
            }
        }

        // Marketing gets the brief.
        self.publisher
            .publish(
                OutboundEvent::MarketingBrief,
                json!({
                    "title": format!("New Product Launch: {}", item.title),
                    "message": format!("Prepare marketing for {}", item.title),
                    "item_number": item.number,
                    "category": item.category,
                    "target_retail": concept.as_ref().and_then(|c| c.target_retail),
                    "sketch_url": concept.as_ref().and_then(|c| c.sketch_url.clone()),
                    "brief": concept.as_ref().and_then(|c| c.brief.clone()),
                }),
                Some(Module::Marketing),
            )
            .await;
        self.set_handoff(item.id, Module::Marketing).await;

        // Finance gets the budget request.
        self.publisher
            .publish(
                OutboundEvent::BudgetRequest,
                json!({
                    "title": format!("Budget Request: {}", item.title),
                    "message": format!("Allocate production budget for {}", item.title),
                    "item_number": item.number,
                    "estimated_cost": concept.as_ref().and_then(|c| c.target_cost),
                    "estimated_retail": concept.as_ref().and_then(|c| c.target_retail),
                    "estimated_units": DEFAULT_BATCH_UNITS,
                }),
                Some(Module::Finance),
            )
            .await;
        self.set_handoff(item.id, Module::Finance).await;
    }

    /// The completion triad announced to the same three consumers.
    async fn announce_complete(&self, item: &PipelineItem) {
        let concept = self.concept_of(item).await;

        self.publisher
            .publish(
                OutboundEvent::ProductionApproved,
                json!({
                    "title": format!("Production Approved: {}", item.title),
                    "message": format!(
                        "Product '{}' approved for production, submit purchase orders",
                        item.title
                    ),
                    "item_id": item.id,
                    "item_number": item.number,
                    "category": item.category,
                    "tech_pack_id": item.tech_pack_id,
                }),
                Some(Module::Operations),
            )
            .await;

        self.publisher
            .publish(
                OutboundEvent::BudgetAllocated,
                json!({
                    "title": format!("Budget Allocation: {}", item.title),
                    "message": format!("Allocate production budget for {}", item.title),
                    "item_id": item.id,
                    "item_number": item.number,
                    "estimated_cost": concept.as_ref().and_then(|c| c.target_cost),
                    "estimated_retail": concept.as_ref().and_then(|c| c.target_retail),
                    "estimated_units": DEFAULT_BATCH_UNITS,
                }),
                Some(Module::Finance),
            )
            .await;

        self.publisher
            .publish(
                OutboundEvent::LaunchScheduled,
                json!({
                    "title": format!("Product Launch: {}", item.title),
                    "message": format!("Schedule marketing campaigns for {}", item.title),
                    "item_id": item.id,
                    "item_number": item.number,
                    "category": item.category,
                    "target_retail": concept.as_ref().and_then(|c| c.target_retail),
                    "sketch_url": concept.as_ref().and_then(|c| c.sketch_url.clone()),
                }),
                Some(Module::Marketing),
            )
            .await;

        info!(item = %item.number, "pipeline completed");
    }

    async fn set_handoff(&self, item_id: Uuid, target: Module) {
        if let Err(e) = self.store.set_handoff_flag(item_id, target).await {
            error!(target = %target, error = %e, "failed to record handoff flag");
        }
    }

    async fn concept_of(&self, item: &PipelineItem) -> Option<Concept> {
        let concept_id = item.concept_id?;
        match self.store.get_concept(concept_id).await {
            Ok(concept) => Some(concept),
            Err(e) => {
                error!(item = %item.number, error = %e, "linked concept lookup failed");
                None
            }
        }
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::*;
use crate::error::Error;
use crate::event_bus::{EventPublisher, Module, OutboundEvent};
use crate::store::Store;

/// Recording publisher double: remembers every publish, delivers nothing
struct RecordingPublisher {
    published: Mutex<Vec<(OutboundEvent, Value, Option<Module>)>>,
}

impl RecordingPublisher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
        })
    }

    async fn published(&self) -> Vec<(OutboundEvent, Value, Option<Module>)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        event_type: OutboundEvent,
        payload: Value,
        target: Option<Module>,
    ) -> Uuid {
        let mut published = self.published.lock().await;
        published.push((event_type, payload, target));
        Uuid::new_v4()
    }
}

async fn setup() -> (Arc<Store>, Arc<RecordingPublisher>, ValidationOrchestrator) {
    let store = Arc::new(Store::in_memory().await.unwrap());
    let publisher = RecordingPublisher::new();
    let orchestrator = ValidationOrchestrator::new(store.clone(), publisher.clone());
    (store, publisher, orchestrator)
}

async fn seed_concept(store: &Store) -> Concept {
    let concept = Concept::new("Selvedge Jeans", "jeans").with_targets(240.0, 60.0);
    store.create_concept(&concept).await.unwrap();
    concept
}

#[tokio::test]
async fn test_request_validation_issues_both_checks() {
    let (store, publisher, orchestrator) = setup().await;
    let concept = seed_concept(&store).await;

    let issue = orchestrator.request_validation(concept.id).await.unwrap();
    assert!(issue.newly_issued);
    assert_eq!(issue.margin.target, Module::Finance);
    assert_eq!(issue.capacity.target, Module::Operations);
    assert!(issue.margin.event_id.is_some());

    let loaded = store.get_concept(concept.id).await.unwrap();
    assert_eq!(loaded.status, ConceptStatus::Validating);
    assert_eq!(loaded.margin_validation, Some(ValidationStatus::Sent));
    assert_eq!(loaded.capacity_validation, Some(ValidationStatus::Sent));

    // One event per check, each carrying its correlation id
    let published = publisher.published().await;
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].0, OutboundEvent::MarginCheckRequest);
    assert_eq!(
        published[0].1["validation_request_id"],
        json!(issue.margin.request_id)
    );
    assert_eq!(published[1].0, OutboundEvent::CapacityCheckRequest);

    let margin = store.get_request(issue.margin.request_id).await.unwrap();
    assert_eq!(margin.status, ValidationStatus::Sent);
    assert!(margin.timeout_at > margin.sent_at + Duration::hours(VALIDATION_TIMEOUT_HOURS - 1));
}

#[tokio::test]
async fn test_request_validation_idempotent_while_open() {
    let (store, publisher, orchestrator) = setup().await;
    let concept = seed_concept(&store).await;

    let first = orchestrator.request_validation(concept.id).await.unwrap();
    let second = orchestrator.request_validation(concept.id).await.unwrap();

    assert!(!second.newly_issued);
    assert_eq!(second.margin.request_id, first.margin.request_id);
    assert_eq!(second.capacity.request_id, first.capacity.request_id);

    // Nothing was republished
    assert_eq!(publisher.published().await.len(), 2);
    assert_eq!(store.requests_for_concept(concept.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_request_validation_unknown_concept() {
    let (_store, _publisher, orchestrator) = setup().await;

    let err = orchestrator.request_validation(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "concept", .. }));
}

#[tokio::test]
async fn test_both_approvals_validate_concept() {
    let (store, _publisher, orchestrator) = setup().await;
    let concept = seed_concept(&store).await;
    let issue = orchestrator.request_validation(concept.id).await.unwrap();

    let outcome = orchestrator
        .handle_response(issue.margin.request_id, true, None, "finance: approved")
        .await
        .unwrap();
    assert_eq!(outcome.status, ValidationStatus::Approved);
    // One gate open, no verdict yet
    assert_eq!(outcome.concept_status, ConceptStatus::Validating);

    let outcome = orchestrator
        .handle_response(issue.capacity.request_id, true, None, "operations: approved")
        .await
        .unwrap();
    assert_eq!(outcome.concept_status, ConceptStatus::Validated);

    let loaded = store.get_concept(concept.id).await.unwrap();
    assert_eq!(loaded.status, ConceptStatus::Validated);
}

#[tokio::test]
async fn test_any_rejection_fails_validation() {
    let (store, _publisher, orchestrator) = setup().await;
    let concept = seed_concept(&store).await;
    let issue = orchestrator.request_validation(concept.id).await.unwrap();

    orchestrator
        .handle_response(
            issue.margin.request_id,
            false,
            Some(json!({"reason": "margin below floor"})),
            "finance: rejected",
        )
        .await
        .unwrap();
    let outcome = orchestrator
        .handle_response(issue.capacity.request_id, true, None, "operations: approved")
        .await
        .unwrap();

    assert_eq!(outcome.concept_status, ConceptStatus::ValidationFailed);
    let margin = store.get_request(issue.margin.request_id).await.unwrap();
    assert_eq!(margin.status, ValidationStatus::Rejected);
    assert!(margin.response_payload.is_some());
}

#[tokio::test]
async fn test_duplicate_response_is_noop() {
    let (store, _publisher, orchestrator) = setup().await;
    let concept = seed_concept(&store).await;
    let issue = orchestrator.request_validation(concept.id).await.unwrap();

    orchestrator
        .handle_response(issue.margin.request_id, true, None, "finance: approved")
        .await
        .unwrap();

    // A contradictory duplicate cannot flip the terminal status
    let outcome = orchestrator
        .handle_response(issue.margin.request_id, false, None, "finance: rejected")
        .await
        .unwrap();
    assert_eq!(outcome.status, ValidationStatus::Approved);

    let loaded = store.get_request(issue.margin.request_id).await.unwrap();
    assert_eq!(loaded.status, ValidationStatus::Approved);
    assert_eq!(loaded.result_summary.as_deref(), Some("finance: approved"));
}

#[tokio::test]
async fn test_response_for_unknown_request() {
    let (_store, _publisher, orchestrator) = setup().await;

    let err = orchestrator
        .handle_response(Uuid::new_v4(), true, None, "finance: approved")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "validation request", .. }));
}

#[tokio::test]
async fn test_check_timeouts_sweeps_expired_pair() {
    let (store, _publisher, orchestrator) = setup().await;
    let concept = seed_concept(&store).await;
    store
        .set_concept_status(concept.id, ConceptStatus::Validating)
        .await
        .unwrap();

    // Two overdue rows, planted directly
    for check in [CheckType::Margin, CheckType::Capacity] {
        let mut request = ValidationRequest::new(concept.id, check, json!({}));
        request.timeout_at = Utc::now() - Duration::hours(2);
        store.create_request(&request).await.unwrap();
    }

    let swept = orchestrator.check_timeouts().await.unwrap();
    assert_eq!(swept, 2);

    let loaded = store.get_concept(concept.id).await.unwrap();
    assert_eq!(loaded.status, ConceptStatus::ValidationFailed);
    assert_eq!(loaded.margin_validation, Some(ValidationStatus::TimedOut));
    assert_eq!(loaded.capacity_validation, Some(ValidationStatus::TimedOut));

    for request in store.requests_for_concept(concept.id).await.unwrap() {
        assert_eq!(request.status, ValidationStatus::TimedOut);
        assert!(request.responded_at.is_none());
    }

    // Sweep is idempotent: the rows are terminal now
    assert_eq!(orchestrator.check_timeouts().await.unwrap(), 0);
}

#[tokio::test]
async fn test_timeout_on_one_check_fails_validation_despite_other_approval() {
    let (store, _publisher, orchestrator) = setup().await;
    let concept = seed_concept(&store).await;
    store
        .set_concept_status(concept.id, ConceptStatus::Validating)
        .await
        .unwrap();

    // Margin overdue, capacity still within its window
    let mut margin = ValidationRequest::new(concept.id, CheckType::Margin, json!({}));
    margin.timeout_at = Utc::now() - Duration::hours(1);
    let capacity = ValidationRequest::new(concept.id, CheckType::Capacity, json!({}));
    store.create_request(&margin).await.unwrap();
    store.create_request(&capacity).await.unwrap();

    orchestrator
        .handle_response(capacity.id, true, None, "operations: approved")
        .await
        .unwrap();

    // Only the overdue row transitions
    assert_eq!(orchestrator.check_timeouts().await.unwrap(), 1);

    let loaded = store.get_concept(concept.id).await.unwrap();
    assert_eq!(loaded.status, ConceptStatus::ValidationFailed);
    assert_eq!(loaded.margin_validation, Some(ValidationStatus::TimedOut));
    assert_eq!(loaded.capacity_validation, Some(ValidationStatus::Approved));
}

#[tokio::test]
async fn test_sweep_skips_unexpired_requests() {
    let (store, _publisher, orchestrator) = setup().await;
    let concept = seed_concept(&store).await;
    orchestrator.request_validation(concept.id).await.unwrap();

    assert_eq!(orchestrator.check_timeouts().await.unwrap(), 0);
    let loaded = store.get_concept(concept.id).await.unwrap();
    assert_eq!(loaded.status, ConceptStatus::Validating);
}

#[tokio::test]
async fn test_failed_concept_gets_fresh_pair_on_reissue() {
    let (store, _publisher, orchestrator) = setup().await;
    let concept = seed_concept(&store).await;
    let first = orchestrator.request_validation(concept.id).await.unwrap();

    orchestrator
        .handle_response(first.margin.request_id, false, None, "finance: rejected")
        .await
        .unwrap();
    orchestrator
        .handle_response(first.capacity.request_id, true, None, "operations: approved")
        .await
        .unwrap();

    // No open rows remain, so a new round issues new ids
    let second = orchestrator.request_validation(concept.id).await.unwrap();
    assert!(second.newly_issued);
    assert_ne!(second.margin.request_id, first.margin.request_id);
    assert_eq!(store.requests_for_concept(concept.id).await.unwrap().len(), 4);

    let loaded = store.get_concept(concept.id).await.unwrap();
    assert_eq!(loaded.status, ConceptStatus::Validating);
}

#[test]
fn test_validation_status_terminality() {
    assert!(!ValidationStatus::Sent.is_terminal());
    assert!(ValidationStatus::Approved.is_terminal());
    assert!(ValidationStatus::Rejected.is_terminal());
    assert!(ValidationStatus::TimedOut.is_terminal());
}

#[test]
fn test_check_type_approvers() {
    assert_eq!(CheckType::Margin.approver(), Module::Finance);
    assert_eq!(CheckType::Capacity.approver(), Module::Operations);
}

#[test]
fn test_concept_margin_math() {
    let concept = Concept::new("Tee", "shirts").with_targets(80.0, 20.0);
    assert_eq!(concept.target_margin, Some(75.0));

    let degenerate = Concept::new("Free", "shirts").with_targets(0.0, 20.0);
    assert_eq!(degenerate.target_margin, None);
}

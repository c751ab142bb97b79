use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::*;
use crate::store::Store;
use crate::validation::{Concept, ConceptStatus, ValidationOrchestrator, ValidationStatus};

/// Handler double that remembers every envelope it sees
struct RecordingHandler {
    seen: Mutex<Vec<EventEnvelope>>,
}

impl RecordingHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> crate::error::Result<()> {
        self.seen.lock().await.push(envelope.clone());
        Ok(())
    }
}

async fn offline_bus() -> (Arc<Store>, Arc<EventBus>) {
    let store = Arc::new(Store::in_memory().await.unwrap());
    // No broker, no fallback endpoints: every transport attempt fails
    let bus = Arc::new(EventBus::new(store.clone(), BusConfig::default()).unwrap());
    (store, bus)
}

fn inbound_envelope(event_type: &str, payload: serde_json::Value) -> EventEnvelope {
    EventEnvelope {
        event_id: Uuid::new_v4(),
        event_type: event_type.to_string(),
        source_module: "finance".to_string(),
        target_module: Some(SOURCE_MODULE.to_string()),
        payload,
        timestamp: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn test_publish_always_audits_and_returns_id() {
    let (store, bus) = offline_bus().await;

    let event_id = bus
        .publish(
            OutboundEvent::PipelineStatus,
            json!({"number": "PD-0001", "phase": "concept"}),
            Some(Module::Executive),
        )
        .await;

    // Exactly one outbound row, finalized as failed since nothing is reachable
    let events = store.list_events(Some(Direction::Outbound), 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, event_id);
    assert_eq!(events[0].counterpart, "executive");
    assert_eq!(events[0].event_type, "pipeline_status");
    assert_eq!(events[0].delivery, DeliveryStatus::Failed);
}

#[tokio::test]
async fn test_publish_broadcast_counterpart() {
    let (store, bus) = offline_bus().await;

    bus.publish(OutboundEvent::PipelineStatus, json!({}), None).await;

    let events = store.list_events(Some(Direction::Outbound), 10).await.unwrap();
    assert_eq!(events[0].counterpart, "broadcast");
}

#[tokio::test]
async fn test_handle_incoming_dispatches_to_registered_handler() {
    let (store, bus) = offline_bus().await;
    let handler = RecordingHandler::new();
    bus.register_handler("margin_check_response", handler.clone()).await;

    let envelope = inbound_envelope("margin_check_response", json!({"approved": true}));
    bus.handle_incoming(envelope.clone()).await;

    let seen = handler.seen.lock().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].event_id, envelope.event_id);

    let events = store.list_events(Some(Direction::Inbound), 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].counterpart, "finance");
    assert_eq!(events[0].delivery, DeliveryStatus::Received);
}

#[tokio::test]
async fn test_handle_incoming_unknown_type_is_audited_and_dropped() {
    let (store, bus) = offline_bus().await;

    bus.handle_incoming(inbound_envelope("mystery_event", json!({}))).await;

    // Still lands in the audit trail even with no handler
    assert_eq!(store.count_events(Direction::Inbound).await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_inbound_delivery_appends_second_row() {
    let (store, bus) = offline_bus().await;

    let envelope = inbound_envelope("margin_check_response", json!({"approved": true}));
    bus.handle_incoming(envelope.clone()).await;
    bus.handle_incoming(envelope).await;

    // Append-only: one row per transmission, same event id on both
    let events = store.list_events(Some(Direction::Inbound), 10).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_id, events[1].event_id);
}

#[tokio::test]
async fn test_validation_response_handler_resolves_request() {
    let (store, bus) = offline_bus().await;
    let orchestrator = Arc::new(ValidationOrchestrator::new(store.clone(), bus.clone()));

    let concept = Concept::new("Bomber", "outerwear").with_targets(260.0, 70.0);
    store.create_concept(&concept).await.unwrap();
    let issue = orchestrator.request_validation(concept.id).await.unwrap();

    let handler = Arc::new(ValidationResponseHandler::new(orchestrator));
    handler
        .handle(&inbound_envelope(
            "margin_check_response",
            json!({
                "validation_request_id": issue.margin.request_id.to_string(),
                "approved": true,
                "margin": 73.0,
            }),
        ))
        .await
        .unwrap();

    let request = store.get_request(issue.margin.request_id).await.unwrap();
    assert_eq!(request.status, ValidationStatus::Approved);
    assert_eq!(request.result_summary.as_deref(), Some("finance: approved"));
    assert_eq!(
        store.get_concept(concept.id).await.unwrap().status,
        ConceptStatus::Validating
    );
}

#[tokio::test]
async fn test_validation_response_handler_requires_correlation_id() {
    let (store, bus) = offline_bus().await;
    let orchestrator = Arc::new(ValidationOrchestrator::new(store, bus));
    let handler = ValidationResponseHandler::new(orchestrator);

    let result = handler
        .handle(&inbound_envelope("margin_check_response", json!({"approved": true})))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_approval_decided_handler_ignores_other_modules() {
    let handler = ApprovalDecidedHandler;

    // Neither of these should error; decisions are audit-only
    handler
        .handle(&inbound_envelope(
            "approval_decided",
            json!({"requesting_module": "operations", "status": "approved"}),
        ))
        .await
        .unwrap();
    handler
        .handle(&inbound_envelope(
            "approval_decided",
            json!({"requesting_module": SOURCE_MODULE, "status": "rejected"}),
        ))
        .await
        .unwrap();
}

#[test]
fn test_envelope_wire_shape() {
    let envelope = EventEnvelope::outbound(
        OutboundEvent::MarginCheckRequest,
        json!({"concept_number": "CN-0001"}),
        Some(Module::Finance),
    );

    assert_eq!(envelope.source_module, SOURCE_MODULE);
    assert_eq!(envelope.target_module.as_deref(), Some("finance"));

    let wire: serde_json::Value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(wire["event_type"], "margin_check_request");
    assert_eq!(wire["payload"]["concept_number"], "CN-0001");

    let parsed: EventEnvelope = serde_json::from_value(wire).unwrap();
    assert_eq!(parsed.event_id, envelope.event_id);
}

#[test]
fn test_module_channels() {
    assert_eq!(Module::Finance.channel(), "atelier:events:finance");
    assert_eq!(Module::Executive.channel(), "atelier:events:executive");
}

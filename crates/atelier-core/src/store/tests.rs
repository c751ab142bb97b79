use super::*;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::error::Error;
use crate::event_bus::{DeliveryStatus, Direction, EventEnvelope, EventRecord, Module, OutboundEvent};
use crate::pipeline::{Phase, PipelineItem};
use crate::techpack::TechPack;
use crate::validation::{CheckType, Concept, ConceptStatus, ValidationRequest, ValidationStatus};

#[tokio::test]
async fn test_pipeline_roundtrip() {
    let store = Store::in_memory().await.unwrap();

    let item = PipelineItem::new("Selvedge Jacket", "jacket");
    store.create_pipeline(&item).await.unwrap();

    let loaded = store.get_pipeline(item.id).await.unwrap();
    assert_eq!(loaded.number, item.number);
    assert_eq!(loaded.current_phase, Phase::Discovery);
    assert!(loaded.phase_entered.contains_key(&Phase::Discovery));
    assert!(!loaded.handoff_to_operations);
}

#[tokio::test]
async fn test_get_pipeline_not_found() {
    let store = Store::in_memory().await.unwrap();

    let err = store.get_pipeline(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "pipeline item", .. }));
}

#[tokio::test]
async fn test_update_pipeline_phase_records_entry_and_notes() {
    let store = Store::in_memory().await.unwrap();

    let item = PipelineItem::new("Raw Denim", "jeans");
    store.create_pipeline(&item).await.unwrap();

    let now = Utc::now();
    let updated = store
        .update_pipeline_phase(item.id, Phase::Concept, now, Some("promising swatch"))
        .await
        .unwrap();

    assert_eq!(updated.current_phase, Phase::Concept);
    assert_eq!(updated.phase_entered.get(&Phase::Concept), Some(&now));
    assert_eq!(
        updated.phase_notes.get(&Phase::Concept).map(String::as_str),
        Some("promising swatch")
    );

    // Survives a reload
    let reloaded = store.get_pipeline(item.id).await.unwrap();
    assert_eq!(reloaded.current_phase, Phase::Concept);
    assert!(reloaded.phase_entered.contains_key(&Phase::Concept));
}

#[tokio::test]
async fn test_list_pipelines_filters_by_phase() {
    let store = Store::in_memory().await.unwrap();

    let a = PipelineItem::new("A", "jeans");
    let b = PipelineItem::new("B", "jacket");
    store.create_pipeline(&a).await.unwrap();
    store.create_pipeline(&b).await.unwrap();
    store
        .update_pipeline_phase(b.id, Phase::Concept, Utc::now(), None)
        .await
        .unwrap();

    let all = store.list_pipelines(None).await.unwrap();
    assert_eq!(all.len(), 2);

    let discovery = store.list_pipelines(Some(Phase::Discovery)).await.unwrap();
    assert_eq!(discovery.len(), 1);
    assert_eq!(discovery[0].id, a.id);
}

#[tokio::test]
async fn test_handoff_flags() {
    let store = Store::in_memory().await.unwrap();

    let item = PipelineItem::new("Chore Coat", "jacket");
    store.create_pipeline(&item).await.unwrap();

    store.set_handoff_flag(item.id, Module::Operations).await.unwrap();
    store.set_handoff_flag(item.id, Module::Finance).await.unwrap();

    let loaded = store.get_pipeline(item.id).await.unwrap();
    assert!(loaded.handoff_to_operations);
    assert!(loaded.handoff_to_finance);
    assert!(!loaded.handoff_to_marketing);

    // Executive has no handoff column
    assert!(store.set_handoff_flag(item.id, Module::Executive).await.is_err());
}

#[tokio::test]
async fn test_concept_roundtrip_and_status() {
    let store = Store::in_memory().await.unwrap();

    let concept = Concept::new("Wide Leg Trouser", "trousers").with_targets(180.0, 45.0);
    store.create_concept(&concept).await.unwrap();

    let loaded = store.get_concept(concept.id).await.unwrap();
    assert_eq!(loaded.status, ConceptStatus::Draft);
    assert_eq!(loaded.target_retail, Some(180.0));
    assert_eq!(loaded.target_margin, Some(75.0));

    store
        .set_concept_status(concept.id, ConceptStatus::Validating)
        .await
        .unwrap();
    store
        .set_check_status(concept.id, CheckType::Margin, ValidationStatus::Approved)
        .await
        .unwrap();
    store
        .set_executive_approval(concept.id, ValidationStatus::Approved)
        .await
        .unwrap();

    let loaded = store.get_concept(concept.id).await.unwrap();
    assert_eq!(loaded.status, ConceptStatus::Validating);
    assert_eq!(loaded.margin_validation, Some(ValidationStatus::Approved));
    assert_eq!(loaded.capacity_validation, None);
    assert_eq!(loaded.executive_approval, Some(ValidationStatus::Approved));
}

#[tokio::test]
async fn test_finalize_request_first_writer_wins() {
    let store = Store::in_memory().await.unwrap();

    let concept = Concept::new("Parka", "outerwear");
    store.create_concept(&concept).await.unwrap();

    let request = ValidationRequest::new(concept.id, CheckType::Margin, json!({}));
    store.create_request(&request).await.unwrap();

    let first = store
        .finalize_request(
            request.id,
            ValidationStatus::Approved,
            Some(&json!({"margin": 72.0})),
            "finance: approved",
            Some(Utc::now()),
        )
        .await
        .unwrap();
    assert!(first);

    // Second writer loses: the row is already terminal
    let second = store
        .finalize_request(
            request.id,
            ValidationStatus::TimedOut,
            None,
            "timed out",
            None,
        )
        .await
        .unwrap();
    assert!(!second);

    let loaded = store.get_request(request.id).await.unwrap();
    assert_eq!(loaded.status, ValidationStatus::Approved);
    assert_eq!(loaded.result_summary.as_deref(), Some("finance: approved"));
    assert!(loaded.responded_at.is_some());
}

#[tokio::test]
async fn test_open_and_expired_requests() {
    let store = Store::in_memory().await.unwrap();

    let concept = Concept::new("Cardigan", "knitwear");
    store.create_concept(&concept).await.unwrap();

    let mut expired = ValidationRequest::new(concept.id, CheckType::Margin, json!({}));
    expired.timeout_at = Utc::now() - Duration::hours(1);
    let fresh = ValidationRequest::new(concept.id, CheckType::Capacity, json!({}));
    store.create_request(&expired).await.unwrap();
    store.create_request(&fresh).await.unwrap();

    let open = store.open_requests_for_concept(concept.id).await.unwrap();
    assert_eq!(open.len(), 2);

    let due = store.expired_requests(Utc::now()).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, expired.id);

    // Terminal rows leave both sets
    store
        .finalize_request(expired.id, ValidationStatus::TimedOut, None, "timed out", None)
        .await
        .unwrap();
    assert_eq!(store.open_requests_for_concept(concept.id).await.unwrap().len(), 1);
    assert!(store.expired_requests(Utc::now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_event_audit_trail() {
    let store = Store::in_memory().await.unwrap();

    let envelope = EventEnvelope::outbound(
        OutboundEvent::PipelineStatus,
        json!({"number": "PD-0001"}),
        Some(Module::Executive),
    );
    let record = EventRecord::outbound(&envelope);
    store.insert_event(&record).await.unwrap();
    store
        .set_event_delivery(record.id, DeliveryStatus::Broker)
        .await
        .unwrap();

    let events = store.list_events(Some(Direction::Outbound), 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, envelope.event_id);
    assert_eq!(events[0].counterpart, "executive");
    assert_eq!(events[0].delivery, DeliveryStatus::Broker);

    assert_eq!(store.count_events(Direction::Outbound).await.unwrap(), 1);
    assert_eq!(store.count_events(Direction::Inbound).await.unwrap(), 0);
}

#[tokio::test]
async fn test_tech_pack_roundtrip_and_link() {
    let store = Store::in_memory().await.unwrap();

    let item = PipelineItem::new("Overshirt", "shirts");
    store.create_pipeline(&item).await.unwrap();

    let pack = TechPack::draft("Overshirt", "shirts");
    store.create_tech_pack(&pack).await.unwrap();
    store.link_tech_pack(item.id, pack.id).await.unwrap();

    let loaded = store.get_tech_pack(pack.id).await.unwrap();
    assert_eq!(loaded.status, "draft");
    assert!(loaded.number.starts_with("TP-"));

    let item = store.get_pipeline(item.id).await.unwrap();
    assert_eq!(item.tech_pack_id, Some(pack.id));
}

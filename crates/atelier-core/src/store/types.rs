//! Raw database rows and their conversions into domain types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::Error;
use crate::event_bus::{DeliveryStatus, Direction, EventRecord, Module};
use crate::pipeline::{Phase, PipelineItem};
use crate::techpack::TechPack;
use crate::validation::{CheckType, Concept, ConceptStatus, ValidationRequest, ValidationStatus};

fn parse_uuid(s: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("corrupt uuid column: {e}")))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> Result<T, Error> {
    s.parse().map_err(Error::Internal)
}

/// Raw pipeline item row
#[derive(Debug, FromRow)]
pub struct PipelineRow {
    pub id: String,
    pub number: String,
    pub title: String,
    pub category: String,
    pub current_phase: String,
    pub concept_id: Option<String>,
    pub tech_pack_id: Option<String>,
    pub handoff_to_operations: bool,
    pub handoff_to_marketing: bool,
    pub handoff_to_finance: bool,
    pub phase_entered: String,
    pub phase_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PipelineRow> for PipelineItem {
    type Error = Error;

    fn try_from(row: PipelineRow) -> Result<Self, Error> {
        let phase_entered: HashMap<Phase, DateTime<Utc>> =
            serde_json::from_str(&row.phase_entered)?;
        let phase_notes: HashMap<Phase, String> = serde_json::from_str(&row.phase_notes)?;
        Ok(PipelineItem {
            id: parse_uuid(&row.id)?,
            number: row.number,
            title: row.title,
            category: row.category,
            current_phase: parse_enum(&row.current_phase)?,
            concept_id: row.concept_id.as_deref().map(parse_uuid).transpose()?,
            tech_pack_id: row.tech_pack_id.as_deref().map(parse_uuid).transpose()?,
            handoff_to_operations: row.handoff_to_operations,
            handoff_to_marketing: row.handoff_to_marketing,
            handoff_to_finance: row.handoff_to_finance,
            phase_entered,
            phase_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Raw concept row
#[derive(Debug, FromRow)]
pub struct ConceptRow {
    pub id: String,
    pub number: String,
    pub title: String,
    pub category: String,
    pub status: String,
    pub margin_validation: Option<String>,
    pub capacity_validation: Option<String>,
    pub executive_approval: Option<String>,
    pub target_retail: Option<f64>,
    pub target_cost: Option<f64>,
    pub target_margin: Option<f64>,
    pub brief: Option<String>,
    pub sketch_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ConceptRow> for Concept {
    type Error = Error;

    fn try_from(row: ConceptRow) -> Result<Self, Error> {
        Ok(Concept {
            id: parse_uuid(&row.id)?,
            number: row.number,
            title: row.title,
            category: row.category,
            status: parse_enum::<ConceptStatus>(&row.status)?,
            margin_validation: row
                .margin_validation
                .as_deref()
                .map(parse_enum::<ValidationStatus>)
                .transpose()?,
            capacity_validation: row
                .capacity_validation
                .as_deref()
                .map(parse_enum::<ValidationStatus>)
                .transpose()?,
            executive_approval: row
                .executive_approval
                .as_deref()
                .map(parse_enum::<ValidationStatus>)
                .transpose()?,
            target_retail: row.target_retail,
            target_cost: row.target_cost,
            target_margin: row.target_margin,
            brief: row.brief,
            sketch_url: row.sketch_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Raw validation request row
#[derive(Debug, FromRow)]
pub struct RequestRow {
    pub id: String,
    pub concept_id: String,
    pub check_type: String,
    pub target_module: String,
    pub status: String,
    pub request_payload: String,
    pub response_payload: Option<String>,
    pub result_summary: Option<String>,
    pub event_id: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl TryFrom<RequestRow> for ValidationRequest {
    type Error = Error;

    fn try_from(row: RequestRow) -> Result<Self, Error> {
        Ok(ValidationRequest {
            id: parse_uuid(&row.id)?,
            concept_id: parse_uuid(&row.concept_id)?,
            check_type: parse_enum::<CheckType>(&row.check_type)?,
            target_module: parse_enum::<Module>(&row.target_module)?,
            status: parse_enum::<ValidationStatus>(&row.status)?,
            request_payload: serde_json::from_str(&row.request_payload)?,
            response_payload: row
                .response_payload
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            result_summary: row.result_summary,
            event_id: row.event_id.as_deref().map(parse_uuid).transpose()?,
            sent_at: row.sent_at,
            timeout_at: row.timeout_at,
            responded_at: row.responded_at,
        })
    }
}

/// Raw audit event row
#[derive(Debug, FromRow)]
pub struct EventRow {
    pub id: String,
    pub event_id: String,
    pub direction: String,
    pub counterpart: String,
    pub event_type: String,
    pub payload: String,
    pub delivery: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for EventRecord {
    type Error = Error;

    fn try_from(row: EventRow) -> Result<Self, Error> {
        Ok(EventRecord {
            id: parse_uuid(&row.id)?,
            event_id: parse_uuid(&row.event_id)?,
            direction: parse_enum::<Direction>(&row.direction)?,
            counterpart: row.counterpart,
            event_type: row.event_type,
            payload: serde_json::from_str(&row.payload)?,
            delivery: parse_enum::<DeliveryStatus>(&row.delivery)?,
            created_at: row.created_at,
        })
    }
}

/// Raw tech pack row
#[derive(Debug, FromRow)]
pub struct TechPackRow {
    pub id: String,
    pub number: String,
    pub style_name: String,
    pub category: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TechPackRow> for TechPack {
    type Error = Error;

    fn try_from(row: TechPackRow) -> Result<Self, Error> {
        Ok(TechPack {
            id: parse_uuid(&row.id)?,
            number: row.number,
            style_name: row.style_name,
            category: row.category,
            status: row.status,
            created_at: row.created_at,
        })
    }
}

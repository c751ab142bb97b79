//! Validation protocol types: concepts, check requests, statuses.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::event_bus::Module;

/// How long an approver has before a request is swept as timed out
pub const VALIDATION_TIMEOUT_HOURS: i64 = 48;

/// Default production batch size quoted in capacity checks and budget requests
pub const DEFAULT_BATCH_UNITS: u32 = 500;

/// Status of one validation request.
///
/// `Sent` is the only non-terminal status; a terminal row is never
/// mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Awaiting a response from the approver
    Sent,
    /// Approver accepted
    Approved,
    /// Approver declined
    Rejected,
    /// Deadline passed without a response
    TimedOut,
}

impl ValidationStatus {
    /// Whether this status admits no further changes
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, ValidationStatus::Sent)
    }

    /// Stable string form (matches the serde representation)
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStatus::Sent => "sent",
            ValidationStatus::Approved => "approved",
            ValidationStatus::Rejected => "rejected",
            ValidationStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(ValidationStatus::Sent),
            "approved" => Ok(ValidationStatus::Approved),
            "rejected" => Ok(ValidationStatus::Rejected),
            "timed_out" => Ok(ValidationStatus::TimedOut),
            other => Err(format!("unknown validation status: {other}")),
        }
    }
}

/// The two independent approval gates every concept must pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    /// Margin review by the finance module
    Margin,
    /// Production capacity review by the operations module
    Capacity,
}

impl CheckType {
    /// The module that answers this check
    #[must_use]
    pub fn approver(self) -> Module {
        match self {
            CheckType::Margin => Module::Finance,
            CheckType::Capacity => Module::Operations,
        }
    }

    /// Stable string form
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CheckType::Margin => "margin",
            CheckType::Capacity => "capacity",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "margin" => Ok(CheckType::Margin),
            "capacity" => Ok(CheckType::Capacity),
            other => Err(format!("unknown check type: {other}")),
        }
    }
}

/// Concept lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptStatus {
    /// Creative work done, not yet sent for validation
    Draft,
    /// Both checks issued, at least one still open
    Validating,
    /// Both checks approved
    Validated,
    /// At least one check rejected or timed out
    ValidationFailed,
}

impl ConceptStatus {
    /// Stable string form
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConceptStatus::Draft => "draft",
            ConceptStatus::Validating => "validating",
            ConceptStatus::Validated => "validated",
            ConceptStatus::ValidationFailed => "validation_failed",
        }
    }
}

impl fmt::Display for ConceptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConceptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ConceptStatus::Draft),
            "validating" => Ok(ConceptStatus::Validating),
            "validated" => Ok(ConceptStatus::Validated),
            "validation_failed" => Ok(ConceptStatus::ValidationFailed),
            other => Err(format!("unknown concept status: {other}")),
        }
    }
}

/// A product concept under validation.
///
/// Creative fields (brief, sketch) are produced by external collaborators;
/// this core only reads them. The validation fields are owned here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    /// Unique concept id
    pub id: Uuid,
    /// Human-readable number, e.g. `CN-1a2b3c4d`
    pub number: String,
    /// Concept title
    pub title: String,
    /// Product category
    pub category: String,
    /// Lifecycle status
    pub status: ConceptStatus,
    /// Latest margin check outcome mirrored from its request
    pub margin_validation: Option<ValidationStatus>,
    /// Latest capacity check outcome mirrored from its request
    pub capacity_validation: Option<ValidationStatus>,
    /// Executive sign-off, set during the approval phase
    pub executive_approval: Option<ValidationStatus>,
    /// Target retail price
    pub target_retail: Option<f64>,
    /// Target unit cost
    pub target_cost: Option<f64>,
    /// Target margin percentage
    pub target_margin: Option<f64>,
    /// Collaborator-written design brief
    pub brief: Option<String>,
    /// Collaborator-produced sketch URL
    pub sketch_url: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Concept {
    /// Create a new draft concept
    #[must_use]
    pub fn new(title: impl Into<String>, category: impl Into<String>) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            number: format!("CN-{}", &id.simple().to_string()[..8]),
            title: title.into(),
            category: category.into(),
            status: ConceptStatus::Draft,
            margin_validation: None,
            capacity_validation: None,
            executive_approval: None,
            target_retail: None,
            target_cost: None,
            target_margin: None,
            brief: None,
            sketch_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set pricing targets
    #[must_use]
    pub fn with_targets(mut self, retail: f64, cost: f64) -> Self {
        self.target_retail = Some(retail);
        self.target_cost = Some(cost);
        if retail > 0.0 {
            self.target_margin = Some((retail - cost) / retail * 100.0);
        }
        self
    }

    /// Outcome for one checker, if mirrored yet
    #[must_use]
    pub fn check_status(&self, check: CheckType) -> Option<ValidationStatus> {
        match check {
            CheckType::Margin => self.margin_validation,
            CheckType::Capacity => self.capacity_validation,
        }
    }
}

/// One tracked request to an approver module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Unique request id (also the correlation id on the wire)
    pub id: Uuid,
    /// Owning concept
    pub concept_id: Uuid,
    /// Which gate this request covers
    pub check_type: CheckType,
    /// Module the request was sent to
    pub target_module: Module,
    /// Current status
    pub status: ValidationStatus,
    /// Payload sent with the request event
    pub request_payload: Value,
    /// Payload received with the response, if any
    pub response_payload: Option<Value>,
    /// Human-readable outcome summary
    pub result_summary: Option<String>,
    /// Outbound bus event id, once published
    pub event_id: Option<Uuid>,
    /// When the request was issued
    pub sent_at: DateTime<Utc>,
    /// Deadline for the sweep (`sent_at` + 48h)
    pub timeout_at: DateTime<Utc>,
    /// When a response arrived; set iff status is Approved or Rejected
    pub responded_at: Option<DateTime<Utc>>,
}

impl ValidationRequest {
    /// Create a fresh request in `Sent` with the standard deadline
    #[must_use]
    pub fn new(concept_id: Uuid, check_type: CheckType, request_payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            concept_id,
            check_type,
            target_module: check_type.approver(),
            status: ValidationStatus::Sent,
            request_payload,
            response_payload: None,
            result_summary: None,
            event_id: None,
            sent_at: now,
            timeout_at: now + Duration::hours(VALIDATION_TIMEOUT_HOURS),
            responded_at: None,
        }
    }
}

/// Descriptor returned to the caller when a request is issued
#[derive(Debug, Clone, Serialize)]
pub struct RequestDescriptor {
    /// Request id
    pub request_id: Uuid,
    /// Gate covered
    pub check_type: CheckType,
    /// Approver module
    pub target: Module,
    /// Outbound bus event id
    pub event_id: Option<Uuid>,
    /// Sweep deadline
    pub timeout_at: DateTime<Utc>,
}

/// The request pair created (or found open) by `request_validation`
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    /// Owning concept
    pub concept_id: Uuid,
    /// Margin check descriptor
    pub margin: RequestDescriptor,
    /// Capacity check descriptor
    pub capacity: RequestDescriptor,
    /// False when open requests already existed and nothing was reissued
    pub newly_issued: bool,
}

/// Result of processing one validation response
#[derive(Debug, Clone, Serialize)]
pub struct ResponseOutcome {
    /// Request id
    pub request_id: Uuid,
    /// Final request status
    pub status: ValidationStatus,
    /// Owning concept
    pub concept_id: Uuid,
    /// Concept status after aggregation
    pub concept_status: ConceptStatus,
}

//! Wire envelope, counterpart modules, event-type names, and audit records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Name of this module on the wire
pub const SOURCE_MODULE: &str = "design";

/// Channel prefix shared by all modules on the broker
pub const CHANNEL_PREFIX: &str = "atelier:events";

/// The counterpart modules this core talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    /// Finance (margin checks, budget allocation)
    Finance,
    /// Operations (capacity checks, production)
    Operations,
    /// Marketing (briefs, launch campaigns)
    Marketing,
    /// Executive (dashboard, approvals)
    Executive,
}

impl Module {
    /// Stable string form (matches the serde representation)
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Module::Finance => "finance",
            Module::Operations => "operations",
            Module::Marketing => "marketing",
            Module::Executive => "executive",
        }
    }

    /// Broker channel this module listens on
    #[must_use]
    pub fn channel(self) -> String {
        format!("{CHANNEL_PREFIX}:{}", self.as_str())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "finance" => Ok(Module::Finance),
            "operations" => Ok(Module::Operations),
            "marketing" => Ok(Module::Marketing),
            "executive" => Ok(Module::Executive),
            other => Err(format!("unknown module: {other}")),
        }
    }
}

/// Event types this core emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Margin validation request to finance
    MarginCheckRequest,
    /// Capacity validation request to operations
    CapacityCheckRequest,
    /// Low-priority phase notification to the executive dashboard
    PipelineStatus,
    /// Handoff: tech pack toward operations
    ProductionHandoff,
    /// Handoff: brief toward marketing
    MarketingBrief,
    /// Handoff: budget request toward finance
    BudgetRequest,
    /// Completion: production green light toward operations
    ProductionApproved,
    /// Completion: budget allocation toward finance
    BudgetAllocated,
    /// Completion: launch scheduling toward marketing
    LaunchScheduled,
}

impl OutboundEvent {
    /// Wire name of the event type
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OutboundEvent::MarginCheckRequest => "margin_check_request",
            OutboundEvent::CapacityCheckRequest => "capacity_check_request",
            OutboundEvent::PipelineStatus => "pipeline_status",
            OutboundEvent::ProductionHandoff => "production_handoff",
            OutboundEvent::MarketingBrief => "marketing_brief",
            OutboundEvent::BudgetRequest => "budget_request",
            OutboundEvent::ProductionApproved => "production_approved",
            OutboundEvent::BudgetAllocated => "budget_allocated",
            OutboundEvent::LaunchScheduled => "launch_scheduled",
        }
    }
}

impl fmt::Display for OutboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event types this core consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEvent {
    /// Finance answering a margin check
    MarginCheckResponse,
    /// Operations answering a capacity check
    CapacityCheckResponse,
    /// Executive decision notice (audit only, no state transition)
    ApprovalDecided,
}

impl InboundEvent {
    /// Wire name of the event type
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InboundEvent::MarginCheckResponse => "margin_check_response",
            InboundEvent::CapacityCheckResponse => "capacity_check_response",
            InboundEvent::ApprovalDecided => "approval_decided",
        }
    }
}

/// The wire shape shared by outbound publish and inbound handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Fresh unique id per transmission
    pub event_id: Uuid,
    /// Event type name
    pub event_type: String,
    /// Module that emitted the event
    pub source_module: String,
    /// Addressee; `None` means broadcast
    pub target_module: Option<String>,
    /// Event payload
    pub payload: Value,
    /// Emission time
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Build an outbound envelope from this module
    #[must_use]
    pub fn outbound(event_type: OutboundEvent, payload: Value, target: Option<Module>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.as_str().to_string(),
            source_module: SOURCE_MODULE.to_string(),
            target_module: target.map(|m| m.as_str().to_string()),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Direction of an audited transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Published by this module
    Outbound,
    /// Received from a counterpart
    Inbound,
}

impl Direction {
    /// Stable string form
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Inbound => "inbound",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outbound" => Ok(Direction::Outbound),
            "inbound" => Ok(Direction::Inbound),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// How an audited transmission left (or entered) this module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Outbound row written, transports not yet resolved
    Sent,
    /// Broker accepted it and had at least one listener
    Broker,
    /// Delivered through the direct HTTP fallback
    Fallback,
    /// Both transports failed (or no fallback endpoint configured)
    Failed,
    /// Inbound message recorded
    Received,
}

impl DeliveryStatus {
    /// Stable string form
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Broker => "broker",
            DeliveryStatus::Fallback => "fallback",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Received => "received",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryStatus::Sent),
            "broker" => Ok(DeliveryStatus::Broker),
            "fallback" => Ok(DeliveryStatus::Fallback),
            "failed" => Ok(DeliveryStatus::Failed),
            "received" => Ok(DeliveryStatus::Received),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

/// Append-only audit record of one bus transmission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Audit row id
    pub id: Uuid,
    /// Envelope event id (not unique: a duplicate delivery through the
    /// fallback path produces a second inbound row for the same event)
    pub event_id: Uuid,
    /// Transmission direction
    pub direction: Direction,
    /// Counterpart module name, or "broadcast"
    pub counterpart: String,
    /// Event type name
    pub event_type: String,
    /// Full envelope as sent or received
    pub payload: Value,
    /// Delivery outcome
    pub delivery: DeliveryStatus,
    /// When the record was written
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    /// Audit row for an envelope about to be published
    #[must_use]
    pub fn outbound(envelope: &EventEnvelope) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: envelope.event_id,
            direction: Direction::Outbound,
            counterpart: envelope
                .target_module
                .clone()
                .unwrap_or_else(|| "broadcast".to_string()),
            event_type: envelope.event_type.clone(),
            payload: serde_json::to_value(envelope).unwrap_or(Value::Null),
            delivery: DeliveryStatus::Sent,
            created_at: Utc::now(),
        }
    }

    /// Audit row for an envelope just received
    #[must_use]
    pub fn inbound(envelope: &EventEnvelope) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: envelope.event_id,
            direction: Direction::Inbound,
            counterpart: envelope.source_module.clone(),
            event_type: envelope.event_type.clone(),
            payload: serde_json::to_value(envelope).unwrap_or(Value::Null),
            delivery: DeliveryStatus::Received,
            created_at: Utc::now(),
        }
    }
}

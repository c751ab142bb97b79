//! Pipeline phases, transition table, and the pipeline item record.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One discrete stage of a pipeline item's lifecycle.
///
/// `Complete` and `Cancelled` are absorbing: no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Opportunity identified, nothing committed yet
    Discovery,
    /// Concept work in progress
    Concept,
    /// Waiting on margin/capacity validation
    Validation,
    /// Executive approval gate
    Approval,
    /// Tech pack production
    TechnicalDesign,
    /// Broadcasting the finished item downstream
    Handoff,
    /// Terminal: shipped to all consumers
    Complete,
    /// Terminal: abandoned
    Cancelled,
}

impl Phase {
    /// Phases reachable from this one.
    ///
    /// This table is the single source of truth for legal transitions;
    /// both `advance` and `set_phase` consult it.
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [Phase] {
        match self {
            Phase::Discovery => &[Phase::Concept, Phase::Cancelled],
            Phase::Concept => &[Phase::Validation, Phase::Cancelled],
            Phase::Validation => &[Phase::Approval, Phase::Concept, Phase::Cancelled],
            Phase::Approval => &[Phase::TechnicalDesign, Phase::Concept, Phase::Cancelled],
            Phase::TechnicalDesign => &[Phase::Handoff, Phase::Cancelled],
            Phase::Handoff => &[Phase::Complete],
            Phase::Complete | Phase::Cancelled => &[],
        }
    }

    /// Whether this phase has no outgoing transitions
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Whether `target` is a legal next phase
    #[must_use]
    pub fn can_transition_to(self, target: Phase) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Stable string form (matches the serde representation)
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Discovery => "discovery",
            Phase::Concept => "concept",
            Phase::Validation => "validation",
            Phase::Approval => "approval",
            Phase::TechnicalDesign => "technical_design",
            Phase::Handoff => "handoff",
            Phase::Complete => "complete",
            Phase::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovery" => Ok(Phase::Discovery),
            "concept" => Ok(Phase::Concept),
            "validation" => Ok(Phase::Validation),
            "approval" => Ok(Phase::Approval),
            "technical_design" => Ok(Phase::TechnicalDesign),
            "handoff" => Ok(Phase::Handoff),
            "complete" => Ok(Phase::Complete),
            "cancelled" => Ok(Phase::Cancelled),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

/// One product under development
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineItem {
    /// Unique item id
    pub id: Uuid,
    /// Human-readable number, e.g. `PD-1a2b3c4d`
    pub number: String,
    /// Working title
    pub title: String,
    /// Product category (jeans, jacket, ...)
    pub category: String,
    /// Current lifecycle phase
    pub current_phase: Phase,
    /// Linked concept, if one has been promoted
    pub concept_id: Option<Uuid>,
    /// Linked tech pack, once generated
    pub tech_pack_id: Option<Uuid>,
    /// Handoff broadcast attempted toward operations
    pub handoff_to_operations: bool,
    /// Handoff broadcast attempted toward marketing
    pub handoff_to_marketing: bool,
    /// Handoff broadcast attempted toward finance
    pub handoff_to_finance: bool,
    /// Sparse map of phase entry times
    pub phase_entered: HashMap<Phase, DateTime<Utc>>,
    /// Free-text notes keyed by phase
    pub phase_notes: HashMap<Phase, String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl PipelineItem {
    /// Create a new item in `Discovery`
    #[must_use]
    pub fn new(title: impl Into<String>, category: impl Into<String>) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let mut phase_entered = HashMap::new();
        phase_entered.insert(Phase::Discovery, now);
        Self {
            id,
            number: format!("PD-{}", &id.simple().to_string()[..8]),
            title: title.into(),
            category: category.into(),
            current_phase: Phase::Discovery,
            concept_id: None,
            tech_pack_id: None,
            handoff_to_operations: false,
            handoff_to_marketing: false,
            handoff_to_finance: false,
            phase_entered,
            phase_notes: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a concept reference
    #[must_use]
    pub fn with_concept(mut self, concept_id: Uuid) -> Self {
        self.concept_id = Some(concept_id);
        self
    }
}

/// Result of one executed phase transition
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    /// Item id
    pub item_id: Uuid,
    /// Item number
    pub number: String,
    /// Phase before the transition
    pub old_phase: Phase,
    /// Phase after the transition
    pub new_phase: Phase,
    /// When the transition was persisted
    pub transitioned_at: DateTime<Utc>,
}

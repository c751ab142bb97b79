//! Error types for atelier-core
//!
//! Everything a caller can act on is a distinct variant; delivery failures
//! are deliberately absent because `publish` is fire-and-forget and never
//! surfaces them as errors.

use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::Phase;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Referenced record does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind (pipeline item, concept, validation request, ...)
        kind: &'static str,
        /// Record id
        id: Uuid,
    },

    /// Requested phase is not reachable from the current phase
    #[error("cannot transition from {from} to {to} (allowed: {})", format_phases(allowed))]
    IllegalTransition {
        /// Current phase
        from: Phase,
        /// Requested phase
        to: Phase,
        /// Phases reachable from `from`
        allowed: Vec<Phase>,
    },

    /// Auto-advance could not determine a next phase
    #[error("cannot advance from {phase}: {reason}")]
    PrerequisiteNotMet {
        /// Phase the item is stuck in
        phase: Phase,
        /// Why the prerequisite is unmet
        reason: String,
    },

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (corrupt row, invalid config, ...)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

fn format_phases(phases: &[Phase]) -> String {
    phases
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

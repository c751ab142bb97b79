//! Validation - cross-module approval protocol
//!
//! Two independent gates (margin via finance, capacity via operations)
//! per concept, each a tracked request with a 48h deadline. Both must
//! approve for the concept to validate; there is no partial credit.

pub mod orchestrator;
pub mod sweep;
pub mod types;

pub use orchestrator::ValidationOrchestrator;
pub use sweep::DEFAULT_SWEEP_INTERVAL;
pub use types::{
    CheckType, Concept, ConceptStatus, RequestDescriptor, ResponseOutcome, ValidationIssue,
    ValidationRequest, ValidationStatus, DEFAULT_BATCH_UNITS, VALIDATION_TIMEOUT_HOURS,
};

#[cfg(test)]
mod tests;

//! Atelier Core - Product Approval Coordination
//!
//! This crate provides the coordination core for the atelier's design
//! module, including:
//! - Pipeline: Phase state machine for products in development
//! - Validation: Margin/capacity approval protocol with timeout sweep
//! - Event bus: Redis pub/sub delivery with HTTP fallback and audit trail
//! - Store: SQLite persistence shared by all tasks
//! - Tech packs: Skeleton technical specification generation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event_bus;
pub mod pipeline;
pub mod store;
pub mod techpack;
pub mod validation;

pub use error::{Error, Result};
pub use event_bus::{
    BusConfig, DeliveryStatus, Direction, EventBus, EventEnvelope, EventHandler, EventPublisher,
    EventRecord, InboundEvent, Module, ModuleEndpoints, OutboundEvent,
};
pub use pipeline::{Phase, PipelineEngine, PipelineItem, TransitionReport};
pub use store::Store;
pub use techpack::{DraftTechPackGenerator, TechPack, TechPackGenerator};
pub use validation::{
    CheckType, Concept, ConceptStatus, RequestDescriptor, ResponseOutcome, ValidationIssue,
    ValidationOrchestrator, ValidationRequest, ValidationStatus, DEFAULT_SWEEP_INTERVAL,
    VALIDATION_TIMEOUT_HOURS,
};

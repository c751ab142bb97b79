//! Pipeline - phase state machine for products in development
//!
//! Every item moves through a fixed transition graph; entering a phase
//! fires its side effects (validation requests, tech pack generation,
//! downstream broadcasts) after the transition is persisted.

pub mod engine;
pub mod types;

pub use engine::PipelineEngine;
pub use types::{Phase, PipelineItem, TransitionReport};

//! Technical-package generation seam.
//!
//! Tech pack content (measurements, grading, rendering) is produced by an
//! external collaborator; the pipeline engine only needs "generate one for
//! this concept and give me the reference". `DraftTechPackGenerator` is the
//! built-in implementation that creates a skeleton record from the concept.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::store::Store;

/// Minimal technical-package record the engine links to a pipeline item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechPack {
    /// Unique tech pack id
    pub id: Uuid,
    /// Human-readable number, e.g. `TP-1a2b3c4d`
    pub number: String,
    /// Style name, copied from the concept title
    pub style_name: String,
    /// Product category
    pub category: String,
    /// Collaborator-owned status (draft until the collaborator finishes)
    pub status: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl TechPack {
    /// Create a skeleton tech pack for a concept
    #[must_use]
    pub fn draft(style_name: impl Into<String>, category: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            number: format!("TP-{}", &id.simple().to_string()[..8]),
            style_name: style_name.into(),
            category: category.into(),
            status: "draft".to_string(),
            created_at: Utc::now(),
        }
    }
}

/// The generation collaborator, seen from the engine's side
#[async_trait]
pub trait TechPackGenerator: Send + Sync {
    /// Generate a tech pack for the concept and return its reference
    async fn generate_from_concept(&self, concept_id: Uuid) -> Result<TechPack>;
}

/// Store-backed generator that produces a skeleton record.
///
/// Stands in for the real generation collaborator; the engine does not
/// care which implementation is wired in.
pub struct DraftTechPackGenerator {
    store: Arc<Store>,
}

impl DraftTechPackGenerator {
    /// Create a generator over the shared store
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TechPackGenerator for DraftTechPackGenerator {
    async fn generate_from_concept(&self, concept_id: Uuid) -> Result<TechPack> {
        let concept = self.store.get_concept(concept_id).await?;
        let pack = TechPack::draft(concept.title, concept.category);
        self.store.create_tech_pack(&pack).await?;
        Ok(pack)
    }
}

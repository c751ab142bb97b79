//! SQLite persistence for the shared mutable records.
//!
//! The store is the only state shared between request handlers, the bus
//! listener, and the sweep task; every cross-task race is resolved here by
//! row-level guards (see `finalize_request`).

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use uuid::Uuid;

use super::types::{ConceptRow, EventRow, PipelineRow, RequestRow, TechPackRow};
use crate::error::{Error, Result};
use crate::event_bus::{DeliveryStatus, Direction, EventRecord, Module};
use crate::pipeline::{Phase, PipelineItem};
use crate::techpack::TechPack;
use crate::validation::{CheckType, Concept, ConceptStatus, ValidationRequest, ValidationStatus};

/// SQLite-backed store for pipeline items, concepts, validation requests,
/// tech packs, and the event audit trail.
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Open (or create) a database file and run migrations
    pub async fn from_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("failed to create data directory: {e}")))?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database for tests.
    ///
    /// Single connection: each sqlite `:memory:` connection is its own
    /// database, so pooling more than one would split the data.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_items (
                id TEXT PRIMARY KEY,
                number TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                current_phase TEXT NOT NULL,
                concept_id TEXT,
                tech_pack_id TEXT,
                handoff_to_operations BOOLEAN NOT NULL DEFAULT FALSE,
                handoff_to_marketing BOOLEAN NOT NULL DEFAULT FALSE,
                handoff_to_finance BOOLEAN NOT NULL DEFAULT FALSE,
                phase_entered TEXT NOT NULL DEFAULT '{}',
                phase_notes TEXT NOT NULL DEFAULT '{}',
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS concepts (
                id TEXT PRIMARY KEY,
                number TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL,
                margin_validation TEXT,
                capacity_validation TEXT,
                executive_approval TEXT,
                target_retail REAL,
                target_cost REAL,
                target_margin REAL,
                brief TEXT,
                sketch_url TEXT,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS validation_requests (
                id TEXT PRIMARY KEY,
                concept_id TEXT NOT NULL,
                check_type TEXT NOT NULL,
                target_module TEXT NOT NULL,
                status TEXT NOT NULL,
                request_payload TEXT NOT NULL,
                response_payload TEXT,
                result_summary TEXT,
                event_id TEXT,
                sent_at TIMESTAMP NOT NULL,
                timeout_at TIMESTAMP NOT NULL,
                responded_at TIMESTAMP,
                FOREIGN KEY (concept_id) REFERENCES concepts(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                event_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                counterpart TEXT NOT NULL,
                event_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                delivery TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tech_packs (
                id TEXT PRIMARY KEY,
                number TEXT NOT NULL UNIQUE,
                style_name TEXT NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pipeline_phase ON pipeline_items(current_phase)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_requests_concept ON validation_requests(concept_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_requests_status ON validation_requests(status, timeout_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_direction ON events(direction)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ---- pipeline items ----

    /// Insert a new pipeline item
    pub async fn create_pipeline(&self, item: &PipelineItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_items (
                id, number, title, category, current_phase, concept_id, tech_pack_id,
                handoff_to_operations, handoff_to_marketing, handoff_to_finance,
                phase_entered, phase_notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(&item.number)
        .bind(&item.title)
        .bind(&item.category)
        .bind(item.current_phase.as_str())
        .bind(item.concept_id.map(|id| id.to_string()))
        .bind(item.tech_pack_id.map(|id| id.to_string()))
        .bind(item.handoff_to_operations)
        .bind(item.handoff_to_marketing)
        .bind(item.handoff_to_finance)
        .bind(serde_json::to_string(&item.phase_entered)?)
        .bind(serde_json::to_string(&item.phase_notes)?)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch one pipeline item
    pub async fn get_pipeline(&self, id: Uuid) -> Result<PipelineItem> {
        let row: PipelineRow = sqlx::query_as("SELECT * FROM pipeline_items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound {
                kind: "pipeline item",
                id,
            })?;

        row.try_into()
    }

    /// List items, optionally filtered by phase, newest first
    pub async fn list_pipelines(&self, phase: Option<Phase>) -> Result<Vec<PipelineItem>> {
        let rows: Vec<PipelineRow> = match phase {
            Some(p) => {
                sqlx::query_as(
                    "SELECT * FROM pipeline_items WHERE current_phase = ? ORDER BY updated_at DESC",
                )
                .bind(p.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM pipeline_items ORDER BY updated_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Persist a phase transition: new phase, entry timestamp, optional note.
    ///
    /// Returns the updated item. This runs BEFORE any side effect fires, so
    /// a failed publish can never roll back a legitimate transition.
    pub async fn update_pipeline_phase(
        &self,
        id: Uuid,
        phase: Phase,
        entered_at: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<PipelineItem> {
        let mut item = self.get_pipeline(id).await?;
        item.current_phase = phase;
        item.phase_entered.insert(phase, entered_at);
        if let Some(n) = notes {
            item.phase_notes.insert(phase, n.to_string());
        }
        item.updated_at = entered_at;

        sqlx::query(
            r#"
            UPDATE pipeline_items
            SET current_phase = ?, phase_entered = ?, phase_notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(phase.as_str())
        .bind(serde_json::to_string(&item.phase_entered)?)
        .bind(serde_json::to_string(&item.phase_notes)?)
        .bind(entered_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(item)
    }

    /// Attach a concept reference to an item
    pub async fn link_concept(&self, id: Uuid, concept_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pipeline_items SET concept_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(concept_id.to_string())
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound {
                kind: "pipeline item",
                id,
            });
        }
        Ok(())
    }

    /// Attach a tech pack reference to an item
    pub async fn link_tech_pack(&self, id: Uuid, tech_pack_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pipeline_items SET tech_pack_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(tech_pack_id.to_string())
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound {
                kind: "pipeline item",
                id,
            });
        }
        Ok(())
    }

    /// Record that a handoff publish was attempted toward `target`
    pub async fn set_handoff_flag(&self, id: Uuid, target: Module) -> Result<()> {
        let column = match target {
            Module::Operations => "handoff_to_operations",
            Module::Marketing => "handoff_to_marketing",
            Module::Finance => "handoff_to_finance",
            Module::Executive => {
                return Err(Error::Internal(
                    "executive is not a handoff target".to_string(),
                ))
            }
        };

        // column name comes from the match above, never from input
        let sql =
            format!("UPDATE pipeline_items SET {column} = TRUE, updated_at = ? WHERE id = ?");
        sqlx::query(&sql)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ---- concepts ----

    /// Insert a new concept
    pub async fn create_concept(&self, concept: &Concept) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO concepts (
                id, number, title, category, status,
                margin_validation, capacity_validation, executive_approval,
                target_retail, target_cost, target_margin, brief, sketch_url,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(concept.id.to_string())
        .bind(&concept.number)
        .bind(&concept.title)
        .bind(&concept.category)
        .bind(concept.status.as_str())
        .bind(concept.margin_validation.map(ValidationStatus::as_str))
        .bind(concept.capacity_validation.map(ValidationStatus::as_str))
        .bind(concept.executive_approval.map(ValidationStatus::as_str))
        .bind(concept.target_retail)
        .bind(concept.target_cost)
        .bind(concept.target_margin)
        .bind(&concept.brief)
        .bind(&concept.sketch_url)
        .bind(concept.created_at)
        .bind(concept.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch one concept
    pub async fn get_concept(&self, id: Uuid) -> Result<Concept> {
        let row: ConceptRow = sqlx::query_as("SELECT * FROM concepts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound {
                kind: "concept",
                id,
            })?;

        row.try_into()
    }

    /// List concepts, newest first
    pub async fn list_concepts(&self, limit: i64) -> Result<Vec<Concept>> {
        let rows: Vec<ConceptRow> =
            sqlx::query_as("SELECT * FROM concepts ORDER BY updated_at DESC LIMIT ?")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Set the concept lifecycle status
    pub async fn set_concept_status(&self, id: Uuid, status: ConceptStatus) -> Result<()> {
        let result = sqlx::query("UPDATE concepts SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound {
                kind: "concept",
                id,
            });
        }
        Ok(())
    }

    /// Mirror a per-checker outcome onto the concept
    pub async fn set_check_status(
        &self,
        id: Uuid,
        check: CheckType,
        status: ValidationStatus,
    ) -> Result<()> {
        let sql = match check {
            CheckType::Margin => {
                "UPDATE concepts SET margin_validation = ?, updated_at = ? WHERE id = ?"
            }
            CheckType::Capacity => {
                "UPDATE concepts SET capacity_validation = ?, updated_at = ? WHERE id = ?"
            }
        };

        sqlx::query(sql)
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record the executive sign-off
    pub async fn set_executive_approval(&self, id: Uuid, status: ValidationStatus) -> Result<()> {
        sqlx::query("UPDATE concepts SET executive_approval = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ---- validation requests ----

    /// Insert a new validation request
    pub async fn create_request(&self, request: &ValidationRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO validation_requests (
                id, concept_id, check_type, target_module, status,
                request_payload, response_payload, result_summary, event_id,
                sent_at, timeout_at, responded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.concept_id.to_string())
        .bind(request.check_type.as_str())
        .bind(request.target_module.as_str())
        .bind(request.status.as_str())
        .bind(serde_json::to_string(&request.request_payload)?)
        .bind(
            request
                .response_payload
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(&request.result_summary)
        .bind(request.event_id.map(|id| id.to_string()))
        .bind(request.sent_at)
        .bind(request.timeout_at)
        .bind(request.responded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch one validation request
    pub async fn get_request(&self, id: Uuid) -> Result<ValidationRequest> {
        let row: RequestRow = sqlx::query_as("SELECT * FROM validation_requests WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound {
                kind: "validation request",
                id,
            })?;

        row.try_into()
    }

    /// Record the outbound bus event id on a request
    pub async fn set_request_event_id(&self, id: Uuid, event_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE validation_requests SET event_id = ? WHERE id = ?")
            .bind(event_id.to_string())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// All requests for a concept, most recent first
    pub async fn requests_for_concept(&self, concept_id: Uuid) -> Result<Vec<ValidationRequest>> {
        let rows: Vec<RequestRow> = sqlx::query_as(
            "SELECT * FROM validation_requests WHERE concept_id = ? ORDER BY sent_at DESC",
        )
        .bind(concept_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Requests for a concept that are still awaiting a response
    pub async fn open_requests_for_concept(
        &self,
        concept_id: Uuid,
    ) -> Result<Vec<ValidationRequest>> {
        let rows: Vec<RequestRow> = sqlx::query_as(
            "SELECT * FROM validation_requests WHERE concept_id = ? AND status = 'sent' ORDER BY sent_at DESC",
        )
        .bind(concept_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// All `Sent` requests whose deadline has passed
    pub async fn expired_requests(&self, now: DateTime<Utc>) -> Result<Vec<ValidationRequest>> {
        let rows: Vec<RequestRow> = sqlx::query_as(
            "SELECT * FROM validation_requests WHERE status = 'sent' AND timeout_at <= ?",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Move a request from `Sent` to a terminal status.
    ///
    /// The `AND status = 'sent'` guard makes concurrent response handling
    /// and the timeout sweep race-safe: first writer wins, the loser's
    /// update affects zero rows and this returns `false`.
    pub async fn finalize_request(
        &self,
        id: Uuid,
        status: ValidationStatus,
        response_payload: Option<&serde_json::Value>,
        summary: &str,
        responded_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE validation_requests
            SET status = ?, response_payload = ?, result_summary = ?, responded_at = ?
            WHERE id = ? AND status = 'sent'
            "#,
        )
        .bind(status.as_str())
        .bind(response_payload.map(serde_json::to_string).transpose()?)
        .bind(summary)
        .bind(responded_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ---- event audit trail ----

    /// Append an audit row (never updated except for outbound delivery resolution)
    pub async fn insert_event(&self, record: &EventRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (
                id, event_id, direction, counterpart, event_type, payload, delivery, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.event_id.to_string())
        .bind(record.direction.as_str())
        .bind(&record.counterpart)
        .bind(&record.event_type)
        .bind(serde_json::to_string(&record.payload)?)
        .bind(record.delivery.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Finalize the delivery outcome on an outbound audit row
    pub async fn set_event_delivery(&self, id: Uuid, delivery: DeliveryStatus) -> Result<()> {
        sqlx::query("UPDATE events SET delivery = ? WHERE id = ?")
            .bind(delivery.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// List audit rows, newest first
    pub async fn list_events(
        &self,
        direction: Option<Direction>,
        limit: i64,
    ) -> Result<Vec<EventRecord>> {
        let rows: Vec<EventRow> = match direction {
            Some(d) => {
                sqlx::query_as(
                    "SELECT * FROM events WHERE direction = ? ORDER BY created_at DESC LIMIT ?",
                )
                .bind(d.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM events ORDER BY created_at DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Count audit rows by direction (used by tests and health checks)
    pub async fn count_events(&self, direction: Direction) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events WHERE direction = ?")
            .bind(direction.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    // ---- tech packs ----

    /// Insert a tech pack record
    pub async fn create_tech_pack(&self, pack: &TechPack) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tech_packs (id, number, style_name, category, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(pack.id.to_string())
        .bind(&pack.number)
        .bind(&pack.style_name)
        .bind(&pack.category)
        .bind(&pack.status)
        .bind(pack.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch one tech pack
    pub async fn get_tech_pack(&self, id: Uuid) -> Result<TechPack> {
        let row: TechPackRow = sqlx::query_as("SELECT * FROM tech_packs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound {
                kind: "tech pack",
                id,
            })?;

        row.try_into()
    }

    /// Ping the database (health checks)
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

//! The [`SessionStore`] trait and its error type.

use foxtale_core::run::RunStatus;
use foxtale_core::types::{RunId, SceneNumber};

use crate::record::{SceneOutcome, SessionRecord};

/// Errors from session store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists for the run (never created, or expired and purged).
    #[error("Run '{0}' not found")]
    NotFound(RunId),

    /// The backing database failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored scene map could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Externally addressable, per-run keyed store.
///
/// Implementations must be safe for concurrent writers: one writer per
/// scene key plus the orchestrator setting run-level status. Late writes
/// (after the orchestrator has given up on a run) are accepted as long
/// as the record still exists.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Create the record for a new run with every scene pending.
    async fn create(&self, record: SessionRecord) -> Result<(), StoreError>;

    /// Mark a scene as dispatched. A no-op if the scene already left
    /// pending (the monotonic order never reverts).
    async fn mark_in_flight(&self, run_id: RunId, scene_number: SceneNumber)
        -> Result<(), StoreError>;

    /// Record a terminal outcome for a scene. Terminal entries are never
    /// overwritten.
    async fn put_result(
        &self,
        run_id: RunId,
        scene_number: SceneNumber,
        outcome: SceneOutcome,
    ) -> Result<(), StoreError>;

    /// Set the run-level status. Once a run is terminal its status is
    /// not downgraded back to processing.
    async fn set_run_status(&self, run_id: RunId, status: RunStatus) -> Result<(), StoreError>;

    /// Fetch the full record for a run.
    async fn get(&self, run_id: RunId) -> Result<SessionRecord, StoreError>;

    /// IDs of runs still processing and not yet expired.
    async fn list_active(&self) -> Result<Vec<RunId>, StoreError>;

    /// Delete expired records; returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

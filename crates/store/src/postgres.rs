//! Postgres-backed [`SessionStore`].
//!
//! The deployment implementation: the record lives in a `story_runs`
//! row, so the orchestrator and the request-serving process can run in
//! different tasks, processes, or instances and still observe the same
//! state. Monotonicity guards are enforced in SQL so a late or replayed
//! write cannot revert a terminal scene entry.

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::PgPool;

use foxtale_core::run::{RunStatus, SceneStatus};
use foxtale_core::types::{RunId, SceneNumber, Timestamp};

use crate::record::{SceneOutcome, SceneRecord, SessionRecord};
use crate::store::{SessionStore, StoreError};

/// Session store over a shared Postgres pool.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the store's migrations (idempotent).
    pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }

    /// Error if no row exists for `run_id`.
    async fn ensure_exists(&self, run_id: RunId) -> Result<(), StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM story_runs WHERE run_id = $1)")
                .bind(run_id)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::NotFound(run_id))
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, record: SessionRecord) -> Result<(), StoreError> {
        let scenes = serde_json::to_value(&record.scenes)?;
        sqlx::query(
            "INSERT INTO story_runs (run_id, status, total_scenes, scenes, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.run_id)
        .bind(run_status_str(record.status))
        .bind(record.total_scenes as i32)
        .bind(scenes)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_in_flight(
        &self,
        run_id: RunId,
        scene_number: SceneNumber,
    ) -> Result<(), StoreError> {
        let mut entry = SceneRecord::pending();
        entry.status = SceneStatus::InFlight;
        let entry = serde_json::to_value(&entry)?;

        let result = sqlx::query(
            "UPDATE story_runs \
             SET scenes = jsonb_set(scenes, ARRAY[$2::text], $3::jsonb, true) \
             WHERE run_id = $1 \
               AND COALESCE(scenes #>> ARRAY[$2::text, 'status'], 'pending') = 'pending'",
        )
        .bind(run_id)
        .bind(scene_number.to_string())
        .bind(entry)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Either the run is gone or the scene already left pending;
            // only the former is an error.
            self.ensure_exists(run_id).await?;
        }
        Ok(())
    }

    async fn put_result(
        &self,
        run_id: RunId,
        scene_number: SceneNumber,
        outcome: SceneOutcome,
    ) -> Result<(), StoreError> {
        let entry = match outcome {
            SceneOutcome::Succeeded { url, prompt } => SceneRecord {
                status: SceneStatus::Succeeded,
                url: Some(url),
                error: None,
                prompt: Some(prompt),
            },
            SceneOutcome::Failed { error } => SceneRecord {
                status: SceneStatus::Failed,
                url: None,
                error: Some(error),
                prompt: None,
            },
        };
        let entry = serde_json::to_value(&entry)?;

        let result = sqlx::query(
            "UPDATE story_runs \
             SET scenes = jsonb_set(scenes, ARRAY[$2::text], $3::jsonb, true) \
             WHERE run_id = $1 \
               AND COALESCE(scenes #>> ARRAY[$2::text, 'status'], 'pending') \
                   NOT IN ('succeeded', 'failed')",
        )
        .bind(run_id)
        .bind(scene_number.to_string())
        .bind(entry)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.ensure_exists(run_id).await?;
        }
        Ok(())
    }

    async fn set_run_status(&self, run_id: RunId, status: RunStatus) -> Result<(), StoreError> {
        // Once a run is terminal its status row is frozen.
        let result = sqlx::query(
            "UPDATE story_runs SET status = $2 \
             WHERE run_id = $1 AND status = 'processing'",
        )
        .bind(run_id)
        .bind(run_status_str(status))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.ensure_exists(run_id).await?;
        }
        Ok(())
    }

    async fn get(&self, run_id: RunId) -> Result<SessionRecord, StoreError> {
        let row: Option<(String, i32, serde_json::Value, Timestamp, Timestamp)> = sqlx::query_as(
            "SELECT status, total_scenes, scenes, created_at, expires_at \
             FROM story_runs WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        let (status, total_scenes, scenes, created_at, expires_at) =
            row.ok_or(StoreError::NotFound(run_id))?;

        let scenes: BTreeMap<SceneNumber, SceneRecord> = serde_json::from_value(scenes)?;
        let mut record = SessionRecord {
            run_id,
            status: parse_run_status(&status)?,
            scenes,
            completed_scenes: 0,
            total_scenes: total_scenes as u32,
            created_at,
            expires_at,
        };
        record.completed_scenes = record.recount_terminal();
        Ok(record)
    }

    async fn list_active(&self) -> Result<Vec<RunId>, StoreError> {
        let ids: Vec<RunId> = sqlx::query_scalar(
            "SELECT run_id FROM story_runs \
             WHERE status = 'processing' AND expires_at > $1 \
             ORDER BY created_at",
        )
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM story_runs WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        let purged = result.rows_affected();
        if purged > 0 {
            tracing::info!(purged, "Purged expired story runs");
        }
        Ok(purged)
    }
}

/// Stable text form of a run status for the `status` column.
fn run_status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Processing => "processing",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
    }
}

/// Inverse of [`run_status_str`].
fn parse_run_status(s: &str) -> Result<RunStatus, StoreError> {
    match s {
        "processing" => Ok(RunStatus::Processing),
        "completed" => Ok(RunStatus::Completed),
        "failed" => Ok(RunStatus::Failed),
        other => Err(StoreError::Serialization(serde::de::Error::custom(
            format!("unknown run status '{other}'"),
        ))),
    }
}

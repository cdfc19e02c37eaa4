//! In-memory [`SessionStore`] for tests and single-process development.
//!
//! Correct only when every reader and writer shares this process; the
//! Postgres implementation is the deployment default for exactly that
//! reason.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use foxtale_core::run::RunStatus;
use foxtale_core::types::{RunId, SceneNumber};

use crate::record::{SceneOutcome, SessionRecord};
use crate::store::{SessionStore, StoreError};

/// `RwLock<HashMap>`-backed store.
#[derive(Default)]
pub struct InMemorySessionStore {
    runs: RwLock<HashMap<RunId, SessionRecord>>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, record: SessionRecord) -> Result<(), StoreError> {
        self.runs.write().await.insert(record.run_id, record);
        Ok(())
    }

    async fn mark_in_flight(
        &self,
        run_id: RunId,
        scene_number: SceneNumber,
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let record = runs.get_mut(&run_id).ok_or(StoreError::NotFound(run_id))?;
        record.apply_in_flight(scene_number);
        Ok(())
    }

    async fn put_result(
        &self,
        run_id: RunId,
        scene_number: SceneNumber,
        outcome: SceneOutcome,
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let record = runs.get_mut(&run_id).ok_or(StoreError::NotFound(run_id))?;
        record.apply_result(scene_number, &outcome);
        Ok(())
    }

    async fn set_run_status(&self, run_id: RunId, status: RunStatus) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let record = runs.get_mut(&run_id).ok_or(StoreError::NotFound(run_id))?;
        // A terminal run status is never downgraded back to processing.
        if record.status == RunStatus::Processing || status != RunStatus::Processing {
            record.status = status;
        }
        Ok(())
    }

    async fn get(&self, run_id: RunId) -> Result<SessionRecord, StoreError> {
        self.runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or(StoreError::NotFound(run_id))
    }

    async fn list_active(&self) -> Result<Vec<RunId>, StoreError> {
        let now = Utc::now();
        Ok(self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.status == RunStatus::Processing && !r.is_expired(now))
            .map(|r| r.run_id)
            .collect())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, r| !r.is_expired(now));
        Ok((before - runs.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn new_record() -> SessionRecord {
        SessionRecord::standard(uuid::Uuid::new_v4(), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let store = InMemorySessionStore::new();
        let record = new_record();
        let run_id = record.run_id;

        store.create(record).await.unwrap();
        let fetched = store.get(run_id).await.unwrap();
        assert_eq!(fetched.run_id, run_id);
        assert_eq!(fetched.completed_scenes, 0);
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let store = InMemorySessionStore::new();
        let err = store.get(uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn out_of_order_results_land_independently() {
        let store = InMemorySessionStore::new();
        let record = new_record();
        let run_id = record.run_id;
        store.create(record).await.unwrap();

        // Scene 15 finishes before scene 2 was even dispatched.
        store.mark_in_flight(run_id, 15).await.unwrap();
        store
            .put_result(
                run_id,
                15,
                SceneOutcome::Succeeded {
                    url: "https://img.example/15.png".to_string(),
                    prompt: "p15".to_string(),
                },
            )
            .await
            .unwrap();

        let fetched = store.get(run_id).await.unwrap();
        assert_eq!(
            fetched.scenes[&15].url.as_deref(),
            Some("https://img.example/15.png")
        );
        assert_eq!(
            fetched.scenes[&2].status,
            foxtale_core::run::SceneStatus::Pending
        );
        assert_eq!(fetched.completed_scenes, 1);
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_clobber() {
        let store = Arc::new(InMemorySessionStore::new());
        let record = new_record();
        let run_id = record.run_id;
        store.create(record).await.unwrap();

        let mut handles = Vec::new();
        for n in 1..=20u8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.mark_in_flight(run_id, n).await.unwrap();
                store
                    .put_result(
                        run_id,
                        n,
                        SceneOutcome::Succeeded {
                            url: format!("u{n}"),
                            prompt: format!("p{n}"),
                        },
                    )
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let fetched = store.get(run_id).await.unwrap();
        assert_eq!(fetched.completed_scenes, 20);
        for n in 1..=20u8 {
            assert_eq!(fetched.scenes[&n].url.as_deref(), Some(&*format!("u{n}")));
        }
    }

    #[tokio::test]
    async fn terminal_run_status_not_downgraded() {
        let store = InMemorySessionStore::new();
        let record = new_record();
        let run_id = record.run_id;
        store.create(record).await.unwrap();

        store
            .set_run_status(run_id, RunStatus::Completed)
            .await
            .unwrap();
        store
            .set_run_status(run_id, RunStatus::Processing)
            .await
            .unwrap();
        assert_eq!(
            store.get(run_id).await.unwrap().status,
            RunStatus::Completed
        );
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = InMemorySessionStore::new();
        let expired = SessionRecord::standard(uuid::Uuid::new_v4(), Duration::ZERO);
        let live = new_record();
        let live_id = live.run_id;
        store.create(expired).await.unwrap();
        store.create(live).await.unwrap();

        let purged = store.purge_expired().await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get(live_id).await.is_ok());
    }

    #[tokio::test]
    async fn list_active_excludes_terminal_runs() {
        let store = InMemorySessionStore::new();
        let a = new_record();
        let b = new_record();
        let a_id = a.run_id;
        let b_id = b.run_id;
        store.create(a).await.unwrap();
        store.create(b).await.unwrap();
        store
            .set_run_status(b_id, RunStatus::Completed)
            .await
            .unwrap();

        let active = store.list_active().await.unwrap();
        assert_eq!(active, vec![a_id]);
    }
}

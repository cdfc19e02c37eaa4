//! Integration tests for the Postgres session store.
//!
//! Each test gets its own database via `#[sqlx::test]`, with this
//! crate's migrations applied.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use foxtale_core::run::{RunStatus, SceneStatus};
use foxtale_store::{PgSessionStore, SceneOutcome, SessionRecord, SessionStore, StoreError};

fn new_record() -> SessionRecord {
    SessionRecord::standard(uuid::Uuid::new_v4(), Duration::from_secs(3600))
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn create_and_get_round_trip(pool: PgPool) {
    let store = PgSessionStore::new(pool);
    let record = new_record();
    let run_id = record.run_id;

    store.create(record).await.unwrap();

    let fetched = store.get(run_id).await.unwrap();
    assert_eq!(fetched.run_id, run_id);
    assert_eq!(fetched.total_scenes, 20);
    assert_eq!(fetched.completed_scenes, 0);
    assert_eq!(fetched.status, RunStatus::Processing);
    assert_eq!(fetched.scenes.len(), 20);
}

#[sqlx::test(migrations = "./migrations")]
async fn unknown_run_is_not_found(pool: PgPool) {
    let store = PgSessionStore::new(pool);
    let err = store.get(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// ---------------------------------------------------------------------------
// Scene writes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn scene_result_lands_out_of_order(pool: PgPool) {
    let store = PgSessionStore::new(pool);
    let record = new_record();
    let run_id = record.run_id;
    store.create(record).await.unwrap();

    // Scene 15 completes while scene 2 is still pending.
    store.mark_in_flight(run_id, 15).await.unwrap();
    store
        .put_result(
            run_id,
            15,
            SceneOutcome::Succeeded {
                url: "https://img.example/15.png".to_string(),
                prompt: "prompt 15".to_string(),
            },
        )
        .await
        .unwrap();

    let fetched = store.get(run_id).await.unwrap();
    assert_eq!(fetched.scenes[&15].status, SceneStatus::Succeeded);
    assert_eq!(
        fetched.scenes[&15].url.as_deref(),
        Some("https://img.example/15.png")
    );
    assert_eq!(fetched.scenes[&2].status, SceneStatus::Pending);
    assert_eq!(fetched.completed_scenes, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn terminal_scene_entry_is_frozen(pool: PgPool) {
    let store = PgSessionStore::new(pool);
    let record = new_record();
    let run_id = record.run_id;
    store.create(record).await.unwrap();

    store.mark_in_flight(run_id, 7).await.unwrap();
    store
        .put_result(
            run_id,
            7,
            SceneOutcome::Failed {
                error: "retries exhausted".to_string(),
            },
        )
        .await
        .unwrap();

    // A late success write must be a no-op.
    store
        .put_result(
            run_id,
            7,
            SceneOutcome::Succeeded {
                url: "late".to_string(),
                prompt: "late".to_string(),
            },
        )
        .await
        .unwrap();

    let fetched = store.get(run_id).await.unwrap();
    assert_eq!(fetched.scenes[&7].status, SceneStatus::Failed);
    assert_eq!(fetched.scenes[&7].error.as_deref(), Some("retries exhausted"));
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_scene_writers(pool: PgPool) {
    let store = std::sync::Arc::new(PgSessionStore::new(pool));
    let record = new_record();
    let run_id = record.run_id;
    store.create(record).await.unwrap();

    let mut handles = Vec::new();
    for n in 1..=20u8 {
        let store = std::sync::Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.mark_in_flight(run_id, n).await.unwrap();
            store
                .put_result(
                    run_id,
                    n,
                    SceneOutcome::Succeeded {
                        url: format!("https://img.example/{n}.png"),
                        prompt: format!("prompt {n}"),
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
        assert_eq!(
            fetched.scenes[&n].url.as_deref(),
            Some(&*format!("https://img.example/{n}.png"))
        );
    }
}

// ---------------------------------------------------------------------------
// Separate reader context (the isolated-memory defect guard)
// ---------------------------------------------------------------------------

/// A record written through one store handle must be readable through a
/// completely independent handle on a fresh connection pool — nothing
/// may live only in the writer's process memory.
#[sqlx::test(migrations = "./migrations")]
async fn record_readable_from_independent_pool(pool: PgPool) {
    let writer = PgSessionStore::new(pool.clone());
    let record = new_record();
    let run_id = record.run_id;
    writer.create(record).await.unwrap();
    writer.mark_in_flight(run_id, 3).await.unwrap();
    writer
        .put_result(
            run_id,
            3,
            SceneOutcome::Succeeded {
                url: "https://img.example/3.png".to_string(),
                prompt: "prompt 3".to_string(),
            },
        )
        .await
        .unwrap();

    // Build a second pool against the same database, as a separately
    // started reader process would.
    let options = (*pool.connect_options()).clone();
    let reader_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    let reader = PgSessionStore::new(reader_pool);

    let fetched = reader.get(run_id).await.unwrap();
    assert_eq!(fetched.scenes[&3].status, SceneStatus::Succeeded);
    assert_eq!(fetched.completed_scenes, 1);
}

// ---------------------------------------------------------------------------
// Run status and TTL
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn terminal_run_status_not_downgraded(pool: PgPool) {
    let store = PgSessionStore::new(pool);
    let record = new_record();
    let run_id = record.run_id;
    store.create(record).await.unwrap();

    store
        .set_run_status(run_id, RunStatus::Completed)
        .await
        .unwrap();
    store
        .set_run_status(run_id, RunStatus::Failed)
        .await
        .unwrap();

    assert_eq!(store.get(run_id).await.unwrap().status, RunStatus::Completed);
}

#[sqlx::test(migrations = "./migrations")]
async fn purge_removes_only_expired(pool: PgPool) {
    let store = PgSessionStore::new(pool);

    let expired = SessionRecord::standard(uuid::Uuid::new_v4(), Duration::ZERO);
    let live = new_record();
    let live_id = live.run_id;
    store.create(expired).await.unwrap();
    store.create(live).await.unwrap();

    let purged = store.purge_expired().await.unwrap();
    assert_eq!(purged, 1);
    assert!(store.get(live_id).await.is_ok());
}

#[sqlx::test(migrations = "./migrations")]
async fn list_active_excludes_completed(pool: PgPool) {
    let store = PgSessionStore::new(pool);
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

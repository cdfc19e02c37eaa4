//! Background tasks owned by the server process.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use foxtale_store::SessionStore;

/// Spawn the session TTL sweeper.
///
/// Periodically deletes expired session records so abandoned runs do
/// not accumulate. Runs until `cancel` fires.
pub fn spawn_purge_sweeper(
    store: Arc<dyn SessionStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so startup is quiet.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Session sweeper stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = store.purge_expired().await {
                        tracing::warn!(error = %e, "Session purge failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use foxtale_store::{InMemorySessionStore, SessionRecord};

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_expired_sessions() {
        let store = Arc::new(InMemorySessionStore::new());
        store
            .create(SessionRecord::standard(
                uuid::Uuid::new_v4(),
                Duration::ZERO,
            ))
            .await
            .unwrap();
        let live_id = uuid::Uuid::new_v4();
        store
            .create(SessionRecord::standard(live_id, Duration::from_secs(7200)))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_purge_sweeper(
            store.clone() as Arc<dyn SessionStore>,
            Duration::from_secs(60),
            cancel.clone(),
        );

        // Let one sweep run.
        tokio::time::sleep(Duration::from_secs(61)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(store.get(live_id).await.is_ok());
        assert_eq!(store.list_active().await.unwrap(), vec![live_id]);
    }
}

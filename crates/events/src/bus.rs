//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`RunEvent`]s. It is
//! shared via `Arc<EventBus>` between the orchestrator (publisher) and
//! the streaming handlers (subscribers).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use foxtale_core::types::{RunId, SceneNumber};

// ---------------------------------------------------------------------------
// RunEvent
// ---------------------------------------------------------------------------

/// What happened within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    /// A scene finished with an image URL.
    SceneCompleted,
    /// A scene exhausted its retries.
    SceneFailed,
    /// Every scene reached a terminal state.
    RunCompleted,
    /// The run was abandoned by the watchdog.
    RunFailed,
}

/// A progress event for one run.
///
/// Scene-level events carry the scene number and, on success, the
/// uploaded image URL. Run-level events carry only the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// The run this event belongs to.
    pub run_id: RunId,

    /// What happened.
    pub kind: RunEventKind,

    /// The scene concerned, for scene-level events.
    pub scene_number: Option<SceneNumber>,

    /// Hosted image URL, for [`RunEventKind::SceneCompleted`].
    pub url: Option<String>,

    /// Failure detail, for the failed kinds.
    pub error: Option<String>,

    /// Scenes in a terminal state after this event.
    pub completed_scenes: u32,

    /// Total scenes in the run.
    pub total_scenes: u32,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl RunEvent {
    /// A scene succeeded with `url`.
    pub fn scene_completed(
        run_id: RunId,
        scene_number: SceneNumber,
        url: impl Into<String>,
        completed_scenes: u32,
        total_scenes: u32,
    ) -> Self {
        Self {
            run_id,
            kind: RunEventKind::SceneCompleted,
            scene_number: Some(scene_number),
            url: Some(url.into()),
            error: None,
            completed_scenes,
            total_scenes,
            timestamp: Utc::now(),
        }
    }

    /// A scene failed permanently.
    pub fn scene_failed(
        run_id: RunId,
        scene_number: SceneNumber,
        error: impl Into<String>,
        completed_scenes: u32,
        total_scenes: u32,
    ) -> Self {
        Self {
            run_id,
            kind: RunEventKind::SceneFailed,
            scene_number: Some(scene_number),
            url: None,
            error: Some(error.into()),
            completed_scenes,
            total_scenes,
            timestamp: Utc::now(),
        }
    }

    /// All scenes are terminal.
    pub fn run_completed(run_id: RunId, completed_scenes: u32, total_scenes: u32) -> Self {
        Self {
            run_id,
            kind: RunEventKind::RunCompleted,
            scene_number: None,
            url: None,
            error: None,
            completed_scenes,
            total_scenes,
            timestamp: Utc::now(),
        }
    }

    /// The run was abandoned.
    pub fn run_failed(
        run_id: RunId,
        error: impl Into<String>,
        completed_scenes: u32,
        total_scenes: u32,
    ) -> Self {
        Self {
            run_id,
            kind: RunEventKind::RunFailed,
            scene_number: None,
            url: None,
            error: Some(error.into()),
            completed_scenes,
            total_scenes,
            timestamp: Utc::now(),
        }
    }

    /// Whether this is a run-level terminal event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            RunEventKind::RunCompleted | RunEventKind::RunFailed
        )
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so any number of streaming clients can
/// independently receive every published [`RunEvent`]. Subscribers
/// filter by `run_id` on their side.
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are
    /// dropped and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// the session store remains the authoritative record.
    pub fn publish(&self, event: RunEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let run_id = uuid::Uuid::new_v4();

        bus.publish(RunEvent::scene_completed(
            run_id,
            3,
            "https://img.example/3.png",
            1,
            20,
        ));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.run_id, run_id);
        assert_eq!(received.kind, RunEventKind::SceneCompleted);
        assert_eq!(received.scene_number, Some(3));
        assert_eq!(received.url.as_deref(), Some("https://img.example/3.png"));
        assert_eq!(received.completed_scenes, 1);
        assert_eq!(received.total_scenes, 20);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        let run_id = uuid::Uuid::new_v4();

        bus.publish(RunEvent::run_completed(run_id, 20, 20));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1.run_id, run_id);
        assert_eq!(e2.run_id, run_id);
        assert!(e1.is_terminal());
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        // No subscribers — this must not panic.
        bus.publish(RunEvent::run_failed(
            uuid::Uuid::new_v4(),
            "watchdog timeout",
            4,
            20,
        ));
    }

    #[test]
    fn scene_failed_carries_error_not_url() {
        let event = RunEvent::scene_failed(uuid::Uuid::new_v4(), 7, "retries exhausted", 6, 20);
        assert_eq!(event.kind, RunEventKind::SceneFailed);
        assert_eq!(event.error.as_deref(), Some("retries exhausted"));
        assert!(event.url.is_none());
        assert!(!event.is_terminal());
    }

    #[test]
    fn event_kind_serializes_snake_case() {
        let json = serde_json::to_value(RunEventKind::SceneCompleted).unwrap();
        assert_eq!(json, serde_json::json!("scene_completed"));
    }
}

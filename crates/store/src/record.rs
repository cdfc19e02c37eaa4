//! Session record shapes and the monotonic update rules.
//!
//! Each scene key is owned by exactly one job, so concurrent writers
//! never conflict on an entry; the rules here only guard against a late
//! or replayed write reverting a terminal state.

use std::collections::BTreeMap;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use foxtale_core::run::{RunStatus, SceneStatus, TOTAL_SCENES};
use foxtale_core::types::{RunId, SceneNumber, Timestamp};

// ---------------------------------------------------------------------------
// Scene outcome
// ---------------------------------------------------------------------------

/// Terminal result of one scene's generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneOutcome {
    /// The image was generated and uploaded.
    Succeeded {
        /// Public URL of the hosted render.
        url: String,
        /// The prompt the winning attempt actually sent (may be a
        /// sanitized rewrite of the original).
        prompt: String,
    },
    /// Retries were exhausted.
    Failed {
        /// Human-readable error for the client's placeholder slot.
        error: String,
    },
}

// ---------------------------------------------------------------------------
// Scene record
// ---------------------------------------------------------------------------

/// Stored state of one scene within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRecord {
    /// Current lifecycle status.
    pub status: SceneStatus,
    /// Public image URL, present once succeeded.
    pub url: Option<String>,
    /// Error string, present once failed.
    pub error: Option<String>,
    /// The prompt sent on the winning attempt, present once succeeded.
    pub prompt: Option<String>,
}

impl SceneRecord {
    /// A fresh, pending scene entry.
    pub fn pending() -> Self {
        Self {
            status: SceneStatus::Pending,
            url: None,
            error: None,
            prompt: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session record
// ---------------------------------------------------------------------------

/// The externally stored, per-run status/URL map read by the delivery
/// and polling paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque run identifier.
    pub run_id: RunId,
    /// Run-level status.
    pub status: RunStatus,
    /// Per-scene entries, keyed by 1-based scene number.
    pub scenes: BTreeMap<SceneNumber, SceneRecord>,
    /// Scenes that have reached a terminal state (succeeded or failed).
    pub completed_scenes: u32,
    /// Total scenes in the run.
    pub total_scenes: u32,
    /// When the run was created (UTC).
    pub created_at: Timestamp,
    /// When the record becomes eligible for garbage collection.
    pub expires_at: Timestamp,
}

impl SessionRecord {
    /// Create a fresh record with every scene pending.
    pub fn new(run_id: RunId, total_scenes: u32, ttl: std::time::Duration) -> Self {
        let now = Utc::now();
        let scenes = (1..=total_scenes as usize)
            .map(|n| (n as SceneNumber, SceneRecord::pending()))
            .collect();
        Self {
            run_id,
            status: RunStatus::Processing,
            scenes,
            completed_scenes: 0,
            total_scenes,
            created_at: now,
            expires_at: now
                + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(1)),
        }
    }

    /// Create a record for the standard 20-scene story.
    pub fn standard(run_id: RunId, ttl: std::time::Duration) -> Self {
        Self::new(run_id, TOTAL_SCENES as u32, ttl)
    }

    /// Mark a scene as dispatched. Returns `false` (and changes nothing)
    /// if the scene is unknown or already past pending.
    pub fn apply_in_flight(&mut self, scene_number: SceneNumber) -> bool {
        match self.scenes.get_mut(&scene_number) {
            Some(scene) if scene.status.can_transition_to(SceneStatus::InFlight) => {
                scene.status = SceneStatus::InFlight;
                true
            }
            _ => false,
        }
    }

    /// Record a terminal outcome for a scene.
    ///
    /// Terminal entries are never overwritten, so a replayed write is a
    /// no-op. Returns `true` if the entry changed.
    pub fn apply_result(&mut self, scene_number: SceneNumber, outcome: &SceneOutcome) -> bool {
        let Some(scene) = self.scenes.get_mut(&scene_number) else {
            return false;
        };
        if scene.status.is_terminal() {
            return false;
        }
        match outcome {
            SceneOutcome::Succeeded { url, prompt } => {
                scene.status = SceneStatus::Succeeded;
                scene.url = Some(url.clone());
                scene.prompt = Some(prompt.clone());
                scene.error = None;
            }
            SceneOutcome::Failed { error } => {
                scene.status = SceneStatus::Failed;
                scene.error = Some(error.clone());
            }
        }
        self.completed_scenes = self.recount_terminal();
        true
    }

    /// Number of scenes in a terminal state.
    pub fn recount_terminal(&self) -> u32 {
        self.scenes
            .values()
            .filter(|s| s.status.is_terminal())
            .count() as u32
    }

    /// Whether every scene has reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.completed_scenes == self.total_scenes
    }

    /// Whether the record's TTL has elapsed.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

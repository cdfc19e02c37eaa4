//! Run/job state machine, batching, and rate-limit pacing math.
//!
//! Pure functions and constants used by the orchestrator in
//! `foxtale-pipeline` and by the session store. The external image
//! vendor enforces an undocumented per-minute generation ceiling, so the
//! defaults here deliberately leave headroom rather than targeting the
//! observed limit exactly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::SceneNumber;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Every story is exactly this many scenes.
pub const TOTAL_SCENES: usize = 20;

/// Default number of jobs dispatched together before a pacing pause.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default cap on jobs in flight across the whole run.
///
/// Kept above the batch size so a batch can never saturate the cap
/// exactly.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Default generation issuance ceiling per rolling minute.
///
/// The vendor enforces roughly 15/min; 12 leaves headroom.
pub const DEFAULT_MAX_PER_MINUTE: u32 = 12;

/// Default per-attempt generation timeout. Image models routinely take
/// over a minute for complex prompts.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(180);

/// Default bound on a whole run before the watchdog declares it stalled.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How long a finished run's record stays readable before garbage
/// collection.
pub const DEFAULT_RUN_TTL: Duration = Duration::from_secs(60 * 60);

// ---------------------------------------------------------------------------
// Scene status
// ---------------------------------------------------------------------------

/// Lifecycle of a single scene's image job.
///
/// Transitions are strictly monotonic: `Pending → InFlight → {Succeeded,
/// Failed}`. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    /// Created, not yet dispatched.
    Pending,
    /// Dispatched to the image API.
    InFlight,
    /// Image generated and uploaded; a public URL exists.
    Succeeded,
    /// Retries exhausted; an error string exists.
    Failed,
}

impl SceneStatus {
    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(self, SceneStatus::Succeeded | SceneStatus::Failed)
    }

    /// Whether a transition from `self` to `next` respects the monotonic
    /// order. Self-transitions are not allowed.
    pub fn can_transition_to(self, next: SceneStatus) -> bool {
        matches!(
            (self, next),
            (SceneStatus::Pending, SceneStatus::InFlight)
                | (SceneStatus::InFlight, SceneStatus::Succeeded)
                | (SceneStatus::InFlight, SceneStatus::Failed)
        )
    }
}

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

/// Lifecycle of a whole story run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Jobs are still being dispatched or awaited.
    Processing,
    /// Every scene reached a terminal state (some may have failed).
    Completed,
    /// The orchestrator itself stalled or died; partial results may exist.
    Failed,
}

// ---------------------------------------------------------------------------
// Scene job
// ---------------------------------------------------------------------------

/// The unit of work to generate, upload, and record one scene's image.
///
/// Owned exclusively by the worker executing it while in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneJob {
    /// 1-based scene position.
    pub scene_number: SceneNumber,
    /// The full (unsanitized) image prompt for this scene.
    pub prompt: String,
}

impl SceneJob {
    /// Build the ordered job list for a run from its per-scene prompts.
    pub fn from_prompts(prompts: Vec<String>) -> Result<Vec<SceneJob>, CoreError> {
        if prompts.len() != TOTAL_SCENES {
            return Err(CoreError::Validation(format!(
                "Expected {TOTAL_SCENES} scene prompts, got {}",
                prompts.len()
            )));
        }
        Ok(prompts
            .into_iter()
            .enumerate()
            .map(|(i, prompt)| SceneJob {
                scene_number: (i + 1) as SceneNumber,
                prompt,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Batching and pacing
// ---------------------------------------------------------------------------

/// Partition jobs into ordered batches of at most `batch_size`.
///
/// The final batch may be short. `batch_size` of zero is treated as one.
pub fn partition_batches(jobs: Vec<SceneJob>, batch_size: usize) -> Vec<Vec<SceneJob>> {
    let size = batch_size.max(1);
    let mut batches = Vec::with_capacity(jobs.len().div_ceil(size));
    let mut iter = jobs.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(size).collect());
    }
    batches
}

/// Pause to insert after a batch so issuance stays under the per-minute
/// ceiling.
///
/// Sized so `batch_size / pause` is at most `max_per_minute / 60`:
/// batch 5 at 15/min gives a 20 s pause. A zero ceiling disables pacing.
pub fn batch_pause(batch_size: usize, max_per_minute: u32) -> Duration {
    if max_per_minute == 0 || batch_size == 0 {
        return Duration::ZERO;
    }
    let secs = (batch_size as f64 * 60.0) / max_per_minute as f64;
    Duration::from_secs_f64(secs)
}

/// Validate orchestrator sizing before a run starts.
///
/// The batch size must not exceed the in-flight cap; a batch that
/// saturates the cap exactly is also rejected to preserve headroom.
pub fn validate_limits(batch_size: usize, max_in_flight: usize) -> Result<(), CoreError> {
    if batch_size == 0 {
        return Err(CoreError::Validation(
            "batch_size must be at least 1".to_string(),
        ));
    }
    if max_in_flight == 0 {
        return Err(CoreError::Validation(
            "max_in_flight must be at least 1".to_string(),
        ));
    }
    if batch_size >= max_in_flight {
        return Err(CoreError::Validation(format!(
            "batch_size ({batch_size}) must be smaller than max_in_flight ({max_in_flight})"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

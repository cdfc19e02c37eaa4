//! Single-scene generation: retries, sanitize escalation, upload.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng as _;

use foxtale_core::prompt::{sanitize, SanitizeLevel};
use foxtale_core::run::SceneJob;
use foxtale_core::types::RunId;
use foxtale_imagen::{upload_with_retry, BlobStore, ImageBackend};
use foxtale_store::SceneOutcome;

/// Default attempts per scene (initial try plus two retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Renders one scene to a hosted image URL.
///
/// Implemented by [`SceneRenderer`]; the orchestrator only sees this
/// trait so tests can substitute scripted outcomes.
#[async_trait::async_trait]
pub trait SceneGenerator: Send + Sync {
    /// Generate and host the image for `job`. Never returns an error:
    /// every failure mode collapses into [`SceneOutcome::Failed`].
    async fn generate(&self, run_id: RunId, job: &SceneJob) -> SceneOutcome;
}

/// Retry state for one scene: which attempt is running and how hard
/// the prompt is being reworded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttemptState {
    attempt: u32,
    level: SanitizeLevel,
}

impl AttemptState {
    fn first() -> Self {
        Self {
            attempt: 1,
            level: SanitizeLevel::None,
        }
    }

    /// Advance after a content-policy rejection: the next attempt
    /// rewords the prompt more aggressively.
    fn escalated(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            level: self.level.escalate(),
        }
    }

    /// Advance after a transient failure, keeping the prompt as is.
    fn next(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }

    fn exhausted(&self, max_attempts: u32) -> bool {
        self.attempt > max_attempts
    }
}

/// Production [`SceneGenerator`] over an image API and a blob store.
pub struct SceneRenderer {
    backend: Arc<dyn ImageBackend>,
    blobs: Arc<dyn BlobStore>,
    generation_timeout: Duration,
    max_attempts: u32,
}

impl SceneRenderer {
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        blobs: Arc<dyn BlobStore>,
        generation_timeout: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            backend,
            blobs,
            generation_timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Linear backoff with jitter so a batch of failed scenes does not
    /// retry in lockstep.
    fn retry_delay(attempt: u32) -> Duration {
        let jitter_ms = rand::rng().random_range(0..1000);
        Duration::from_secs(attempt as u64 * 2) + Duration::from_millis(jitter_ms)
    }
}

#[async_trait::async_trait]
impl SceneGenerator for SceneRenderer {
    async fn generate(&self, run_id: RunId, job: &SceneJob) -> SceneOutcome {
        let key = format!("{run_id}/scene-{:02}.png", job.scene_number);
        let mut state = AttemptState::first();
        let mut last_error = String::new();

        loop {
            let prompt = sanitize(&job.prompt, state.level);

            let result = tokio::time::timeout(
                self.generation_timeout,
                self.backend.generate(&prompt),
            )
            .await;

            state = match result {
                Err(_) => {
                    last_error = format!(
                        "generation timed out after {}s",
                        self.generation_timeout.as_secs()
                    );
                    tracing::warn!(
                        %run_id,
                        scene = job.scene_number,
                        attempt = state.attempt,
                        "Scene generation timed out"
                    );
                    state.next()
                }
                Ok(Err(e)) if e.is_content_policy() => {
                    last_error = e.to_string();
                    tracing::warn!(
                        %run_id,
                        scene = job.scene_number,
                        attempt = state.attempt,
                        from = ?state.level,
                        to = ?state.level.escalate(),
                        "Prompt rejected by content policy, escalating sanitize level"
                    );
                    state.escalated()
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        %run_id,
                        scene = job.scene_number,
                        attempt = state.attempt,
                        error = %last_error,
                        "Scene generation attempt failed"
                    );
                    state.next()
                }
                Ok(Ok(data)) => match upload_with_retry(&*self.blobs, &key, &data).await {
                    Ok(url) => {
                        tracing::info!(
                            %run_id,
                            scene = job.scene_number,
                            attempt = state.attempt,
                            %url,
                            "Scene image hosted"
                        );
                        return SceneOutcome::Succeeded { url, prompt };
                    }
                    Err(e) => {
                        last_error = e.to_string();
                        tracing::warn!(
                            %run_id,
                            scene = job.scene_number,
                            attempt = state.attempt,
                            error = %last_error,
                            "Scene image upload failed"
                        );
                        state.next()
                    }
                },
            };

            if state.exhausted(self.max_attempts) {
                break;
            }
            tokio::time::sleep(Self::retry_delay(state.attempt - 1)).await;
        }

        tracing::error!(
            %run_id,
            scene = job.scene_number,
            attempts = self.max_attempts,
            error = %last_error,
            "Scene failed permanently"
        );
        SceneOutcome::Failed { error: last_error }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

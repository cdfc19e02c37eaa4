//! Concurrent scene fan-out for one story run.
//!
//! Dispatch shape: jobs go out in paced batches, each job runs as a
//! detached task holding a permit from a run-global semaphore, and
//! outcomes fan back in over an mpsc channel. The run-level watchdog
//! wraps only the fan-in wait, so hitting it abandons the *run* while
//! still-running jobs finish and land their writes in the store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};

use foxtale_core::error::CoreError;
use foxtale_core::run::{
    batch_pause, partition_batches, validate_limits, RunStatus, SceneJob, DEFAULT_BATCH_SIZE,
    DEFAULT_GENERATION_TIMEOUT, DEFAULT_MAX_IN_FLIGHT, DEFAULT_MAX_PER_MINUTE, DEFAULT_RUN_TIMEOUT,
    DEFAULT_RUN_TTL,
};
use foxtale_core::types::RunId;
use foxtale_events::{EventBus, RunEvent};
use foxtale_store::{SceneOutcome, SessionStore, StoreError};

use crate::generate::{SceneGenerator, DEFAULT_MAX_ATTEMPTS};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Tunables for the fan-out loop and the per-scene renderer.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Jobs dispatched per batch.
    pub batch_size: usize,
    /// Run-global cap on concurrently running jobs.
    pub max_in_flight: usize,
    /// Provider rate budget; paces the gap between batches. `0` disables
    /// pacing.
    pub max_per_minute: u32,
    /// Per-attempt deadline for one image generation call.
    pub generation_timeout: Duration,
    /// Attempts per scene before it fails permanently.
    pub max_attempts: u32,
    /// Watchdog deadline for the whole run.
    pub run_timeout: Duration,
    /// How long finished session records stay readable.
    pub run_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_per_minute: DEFAULT_MAX_PER_MINUTE,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            run_ttl: DEFAULT_RUN_TTL,
        }
    }
}

impl PipelineConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `FOXTALE_BATCH_SIZE` | `5` |
    /// | `FOXTALE_MAX_IN_FLIGHT` | `8` |
    /// | `FOXTALE_MAX_IMAGES_PER_MINUTE` | `12` |
    /// | `FOXTALE_GENERATION_TIMEOUT_SECS` | `180` |
    /// | `FOXTALE_MAX_ATTEMPTS` | `3` |
    /// | `FOXTALE_RUN_TIMEOUT_SECS` | `1800` |
    /// | `FOXTALE_RUN_TTL_SECS` | `3600` |
    pub fn from_env() -> Result<Self, PipelineError> {
        let defaults = Self::default();
        let config = Self {
            batch_size: env_parse("FOXTALE_BATCH_SIZE", defaults.batch_size)?,
            max_in_flight: env_parse("FOXTALE_MAX_IN_FLIGHT", defaults.max_in_flight)?,
            max_per_minute: env_parse("FOXTALE_MAX_IMAGES_PER_MINUTE", defaults.max_per_minute)?,
            generation_timeout: Duration::from_secs(env_parse(
                "FOXTALE_GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout.as_secs(),
            )?),
            max_attempts: env_parse("FOXTALE_MAX_ATTEMPTS", defaults.max_attempts)?,
            run_timeout: Duration::from_secs(env_parse(
                "FOXTALE_RUN_TIMEOUT_SECS",
                defaults.run_timeout.as_secs(),
            )?),
            run_ttl: Duration::from_secs(env_parse(
                "FOXTALE_RUN_TTL_SECS",
                defaults.run_ttl.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the batch/cap relationship.
    pub fn validate(&self) -> Result<(), PipelineError> {
        validate_limits(self.batch_size, self.max_in_flight)?;
        Ok(())
    }
}

/// Parse an env var, or use `default` when unset.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, PipelineError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| PipelineError::Config(format!("invalid value for {name}: '{raw}'"))),
        Err(_) => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Run-level pipeline failures.
///
/// Per-scene failures never surface here; they live in the session
/// record as failed scene entries.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid pipeline configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CoreError> for PipelineError {
    fn from(e: CoreError) -> Self {
        PipelineError::Config(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives one run's scene jobs from dispatch to a terminal run status.
pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    bus: Arc<EventBus>,
    generator: Arc<dyn SceneGenerator>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        bus: Arc<EventBus>,
        generator: Arc<dyn SceneGenerator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            bus,
            generator,
            config,
        }
    }

    /// Run every job to a terminal state and settle the run status.
    ///
    /// Returns the final run status: `Completed` once every scene is
    /// terminal (failed scenes included), `Failed` only when the
    /// watchdog gives up on the run as a whole. The session record for
    /// `run_id` must already exist.
    pub async fn run(&self, run_id: RunId, jobs: Vec<SceneJob>) -> Result<RunStatus, PipelineError> {
        let total = jobs.len() as u32;
        let (tx, mut rx) = mpsc::channel::<u8>(jobs.len().max(1));

        tracing::info!(
            %run_id,
            scenes = total,
            batch_size = self.config.batch_size,
            max_in_flight = self.config.max_in_flight,
            "Starting story run"
        );

        let dispatcher = tokio::spawn(dispatch_all(
            run_id,
            jobs,
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.bus),
            Arc::clone(&self.generator),
            tx,
        ));

        let collect = async {
            let mut done = 0u32;
            while done < total {
                match rx.recv().await {
                    Some(_) => done += 1,
                    None => break,
                }
            }
            done
        };

        let status = match tokio::time::timeout(self.config.run_timeout, collect).await {
            Ok(done) if done == total => RunStatus::Completed,
            Ok(done) => {
                // Channel closed with jobs unaccounted for.
                tracing::error!(%run_id, done, total, "Run lost scene jobs before completion");
                RunStatus::Failed
            }
            Err(_) => {
                tracing::error!(
                    %run_id,
                    timeout_secs = self.config.run_timeout.as_secs(),
                    "Run watchdog expired, abandoning run"
                );
                dispatcher.abort();
                RunStatus::Failed
            }
        };

        // Whatever already landed in the store is kept either way.
        self.store.set_run_status(run_id, status).await?;
        let record = self.store.get(run_id).await?;
        let event = match status {
            RunStatus::Completed => {
                RunEvent::run_completed(run_id, record.completed_scenes, record.total_scenes)
            }
            _ => RunEvent::run_failed(
                run_id,
                "run did not finish before its deadline",
                record.completed_scenes,
                record.total_scenes,
            ),
        };
        self.bus.publish(event);

        tracing::info!(
            %run_id,
            status = ?status,
            completed = record.completed_scenes,
            total = record.total_scenes,
            "Story run settled"
        );
        Ok(status)
    }
}

/// Dispatch every batch, spawning one detached task per job.
///
/// The semaphore, not the batch boundary, is the concurrency cap: a
/// slow scene from batch 1 still holds its permit while batch 2
/// dispatches around it.
async fn dispatch_all(
    run_id: RunId,
    jobs: Vec<SceneJob>,
    config: PipelineConfig,
    store: Arc<dyn SessionStore>,
    bus: Arc<EventBus>,
    generator: Arc<dyn SceneGenerator>,
    tx: mpsc::Sender<u8>,
) {
    let semaphore = Arc::new(Semaphore::new(config.max_in_flight));
    let pause = batch_pause(config.batch_size, config.max_per_minute);

    for (index, batch) in partition_batches(jobs, config.batch_size)
        .into_iter()
        .enumerate()
    {
        if index > 0 && !pause.is_zero() {
            tracing::debug!(%run_id, batch = index, pause_secs = pause.as_secs(), "Pacing before next batch");
            tokio::time::sleep(pause).await;
        }
        for job in batch {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                // The semaphore is never closed while dispatching.
                Err(_) => return,
            };
            tokio::spawn(run_scene_job(
                run_id,
                job,
                permit,
                Arc::clone(&store),
                Arc::clone(&bus),
                Arc::clone(&generator),
                tx.clone(),
            ));
        }
    }
}

/// One scene job: mark in-flight, generate, record, publish, report.
async fn run_scene_job(
    run_id: RunId,
    job: SceneJob,
    permit: tokio::sync::OwnedSemaphorePermit,
    store: Arc<dyn SessionStore>,
    bus: Arc<EventBus>,
    generator: Arc<dyn SceneGenerator>,
    tx: mpsc::Sender<u8>,
) {
    let scene = job.scene_number;
    if let Err(e) = store.mark_in_flight(run_id, scene).await {
        tracing::warn!(%run_id, scene, error = %e, "Failed to mark scene in-flight");
    }

    let outcome = generator.generate(run_id, &job).await;
    drop(permit);

    if let Err(e) = store.put_result(run_id, scene, outcome.clone()).await {
        tracing::error!(%run_id, scene, error = %e, "Failed to record scene outcome");
    }

    // Counters for the event come from the store, the single source of
    // truth shared with the poll endpoint.
    let (completed, total) = match store.get(run_id).await {
        Ok(record) => (record.completed_scenes, record.total_scenes),
        Err(_) => (0, 0),
    };
    let event = match &outcome {
        SceneOutcome::Succeeded { url, .. } => {
            RunEvent::scene_completed(run_id, scene, url.clone(), completed, total)
        }
        SceneOutcome::Failed { error } => {
            RunEvent::scene_failed(run_id, scene, error.clone(), completed, total)
        }
    };
    bus.publish(event);

    // The receiver may be gone if the watchdog already gave up; the
    // store write above still counts.
    let _ = tx.send(scene).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

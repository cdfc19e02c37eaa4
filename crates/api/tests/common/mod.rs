use std::sync::Arc;

use axum::Router;

use foxtale_api::config::ServerConfig;
use foxtale_api::router::build_app_router;
use foxtale_api::state::AppState;
use foxtale_core::run::{SceneJob, TOTAL_SCENES};
use foxtale_core::types::RunId;
use foxtale_events::EventBus;
use foxtale_pipeline::{PipelineConfig, SceneGenerator, SceneWriter, WriterError};
use foxtale_store::{InMemorySessionStore, SceneOutcome, SessionStore};

/// Writer that returns a fixed 20-scene story without calling out.
pub struct StubWriter;

#[async_trait::async_trait]
impl SceneWriter for StubWriter {
    async fn write_scenes(&self, _system_prompt: &str) -> Result<Vec<String>, WriterError> {
        Ok((1..=TOTAL_SCENES)
            .map(|n| format!("The fox takes step {n} of the journey"))
            .collect())
    }
}

/// Generator that succeeds immediately with a deterministic URL.
pub struct InstantGenerator;

#[async_trait::async_trait]
impl SceneGenerator for InstantGenerator {
    async fn generate(&self, run_id: RunId, job: &SceneJob) -> SceneOutcome {
        SceneOutcome::Succeeded {
            url: format!("https://img.example/{run_id}/{}.png", job.scene_number),
            prompt: job.prompt.clone(),
        }
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        purge_interval_secs: 300,
    }
}

/// Pipeline tunables that finish a run in milliseconds: no pacing, the
/// whole story in two batches.
pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        batch_size: 10,
        max_in_flight: 32,
        max_per_minute: 0,
        ..PipelineConfig::default()
    }
}

/// Build the full application router over an in-memory store and
/// stubbed providers.
///
/// This mirrors the router construction in `main.rs` so integration
/// tests exercise the same middleware stack (CORS, request ID, timeout,
/// tracing, panic recovery) that production uses.
pub fn build_test_app() -> Router {
    let config = test_config();
    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(InMemorySessionStore::new()) as Arc<dyn SessionStore>,
        bus: Arc::new(EventBus::default()),
        writer: Arc::new(StubWriter),
        generator: Arc::new(InstantGenerator),
        pipeline: test_pipeline_config(),
    };
    build_app_router(state, &config)
}

/// A valid quiz payload.
#[allow(dead_code)]
pub fn quiz_json() -> serde_json::Value {
    serde_json::json!({
        "story_type": "Power Fantasy",
        "humiliation_type": "a",
        "humiliation": "laughed out of the village square",
        "offering_who": "",
        "offering_what": "",
        "find": "an ancient forge",
        "do_with_find": "b",
        "villain_crime": "burns the harvest stores"
    })
}

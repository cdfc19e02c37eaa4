use std::sync::Arc;

use foxtale_events::EventBus;
use foxtale_pipeline::{PipelineConfig, SceneGenerator, SceneWriter};
use foxtale_store::SessionStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Session store holding per-run progress records.
    pub store: Arc<dyn SessionStore>,
    /// Event bus the orchestrator publishes run progress on.
    pub bus: Arc<EventBus>,
    /// Story writer (text model client).
    pub writer: Arc<dyn SceneWriter>,
    /// Scene renderer (image model client plus hosting).
    pub generator: Arc<dyn SceneGenerator>,
    /// Fan-out tunables for new runs.
    pub pipeline: PipelineConfig,
}

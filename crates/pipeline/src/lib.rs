//! Story generation pipeline.
//!
//! Three layers, bottom up:
//!
//! - [`writer`] — turns a system prompt into twenty scene descriptions
//!   via a chat-completion API.
//! - [`generate`] — renders one scene: retry loop with prompt-sanitize
//!   escalation, per-attempt deadline, and hosted upload.
//! - [`orchestrator`] — fans twenty scene jobs out in paced batches
//!   under a global in-flight cap, records every outcome in the session
//!   store, and publishes progress events.

pub mod generate;
pub mod orchestrator;
pub mod writer;

pub use generate::{SceneGenerator, SceneRenderer};
pub use orchestrator::{Orchestrator, PipelineConfig, PipelineError};
pub use writer::{OpenAiSceneWriter, SceneWriter, WriterError};

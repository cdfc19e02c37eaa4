//! Story routes: write, approve, poll, stream.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt as _};
use validator::Validate as _;

use foxtale_core::prompt::{build_prompt, StyleGuide};
use foxtale_core::quiz::QuizAnswers;
use foxtale_core::run::{RunStatus, SceneJob, SceneStatus};
use foxtale_core::types::{RunId, SceneNumber};
use foxtale_pipeline::Orchestrator;
use foxtale_store::SessionRecord;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Response of `POST /stories`: the scene texts awaiting approval.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoryResponse {
    pub scenes: Vec<String>,
}

/// Request body of `POST /stories/approve`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveRequest {
    /// The (possibly user-edited) scene texts, in order.
    pub scenes: Vec<String>,
}

/// Response of `POST /stories/approve`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveResponse {
    pub run_id: RunId,
    pub status: RunStatus,
    pub total_scenes: u32,
}

/// One scene's progress in the poll response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SceneView {
    pub scene_number: SceneNumber,
    pub status: SceneStatus,
    pub url: Option<String>,
    pub error: Option<String>,
}

/// Response of `GET /stories/{run_id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunView {
    pub run_id: RunId,
    pub status: RunStatus,
    pub completed_scenes: u32,
    pub total_scenes: u32,
    pub scenes: Vec<SceneView>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /stories -- write a 20-scene story from quiz answers.
async fn write_story(
    State(state): State<AppState>,
    Json(quiz): Json<QuizAnswers>,
) -> AppResult<Json<StoryResponse>> {
    quiz.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let scenes = state.writer.write_scenes(&quiz.system_prompt()).await?;
    tracing::info!(scenes = scenes.len(), "Story written");
    Ok(Json(StoryResponse { scenes }))
}

/// POST /stories/approve -- accept the scenes and start the image run.
///
/// Creates the session record first, then hands the run to a detached
/// orchestrator task, so the `run_id` is pollable before the first
/// image is even dispatched.
async fn approve_story(
    State(state): State<AppState>,
    Json(request): Json<ApproveRequest>,
) -> AppResult<(StatusCode, Json<ApproveResponse>)> {
    let style = StyleGuide::default();
    let prompts: Vec<String> = request
        .scenes
        .iter()
        .map(|scene| build_prompt(scene, &style))
        .collect();
    let jobs = SceneJob::from_prompts(prompts)?;

    let run_id = uuid::Uuid::new_v4();
    let record = SessionRecord::standard(run_id, state.pipeline.run_ttl);
    let total_scenes = record.total_scenes;
    state.store.create(record).await?;

    let orchestrator = Orchestrator::new(
        state.store.clone(),
        state.bus.clone(),
        state.generator.clone(),
        state.pipeline.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run(run_id, jobs).await {
            tracing::error!(%run_id, error = %e, "Story run aborted");
        }
    });

    tracing::info!(%run_id, "Story approved, run started");
    Ok((
        StatusCode::ACCEPTED,
        Json(ApproveResponse {
            run_id,
            status: RunStatus::Processing,
            total_scenes,
        }),
    ))
}

/// GET /stories/{run_id} -- poll run progress.
///
/// Reads straight from the session store; this endpoint is the
/// authoritative view, the SSE stream is a latency optimization.
async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> AppResult<Json<RunView>> {
    let record = state.store.get(run_id).await?;

    let scenes = record
        .scenes
        .iter()
        .map(|(scene_number, scene)| SceneView {
            scene_number: *scene_number,
            status: scene.status,
            url: scene.url.clone(),
            error: scene.error.clone(),
        })
        .collect();

    Ok(Json(RunView {
        run_id: record.run_id,
        status: record.status,
        completed_scenes: record.completed_scenes,
        total_scenes: record.total_scenes,
        scenes,
    }))
}

/// GET /stories/{run_id}/events -- stream run progress via SSE.
///
/// Emits every bus event for this run as a JSON `data:` frame. The
/// stream stays open with keep-alive comments; clients close it after
/// the terminal run event, and a client that missed events falls back
/// to the poll endpoint.
async fn run_events(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    // 404 for unknown runs instead of a silent empty stream.
    state.store.get(run_id).await?;

    let stream = BroadcastStream::new(state.bus.subscribe()).filter_map(move |item| match item {
        Ok(event) if event.run_id == run_id => Some(Event::default().json_data(&event)),
        // Other runs' events and lag gaps are skipped; the poll
        // endpoint covers anything a lagged client missed.
        _ => None,
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

/// Mount the story routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stories", post(write_story))
        .route("/stories/approve", post(approve_story))
        .route("/stories/{run_id}", get(get_run))
        .route("/stories/{run_id}/events", get(run_events))
}

pub mod health;
pub mod stories;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /stories                     write a story from quiz answers (POST)
/// /stories/approve             approve scenes and start a run (POST)
/// /stories/{run_id}            poll run progress (GET)
/// /stories/{run_id}/events     stream run progress via SSE (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(stories::router())
}

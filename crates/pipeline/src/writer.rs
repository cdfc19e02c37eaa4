//! Scene writing: one chat completion in, twenty scene texts out.

use serde::Deserialize;
use std::time::Duration;

use foxtale_core::run::TOTAL_SCENES;

/// Per-request timeout for story writing.
const WRITE_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors from the scene writing layer.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status code.
    #[error("Story API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose content was not the expected scene JSON.
    #[error("Malformed story response: {0}")]
    Malformed(String),
}

/// Produces the ordered scene descriptions for one story.
#[async_trait::async_trait]
pub trait SceneWriter: Send + Sync {
    /// Write exactly [`TOTAL_SCENES`] scene texts for `system_prompt`.
    async fn write_scenes(&self, system_prompt: &str) -> Result<Vec<String>, WriterError>;
}

// ---------------------------------------------------------------------------
// OpenAiSceneWriter
// ---------------------------------------------------------------------------

/// [`SceneWriter`] over an OpenAI-compatible chat completion endpoint.
///
/// The model is asked for a JSON object keyed `Scene1`..`Scene20`; a
/// scene the model skips gets a neutral placeholder so the run always
/// carries a full set of jobs.
pub struct OpenAiSceneWriter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiSceneWriter {
    /// Create a writer for the given API base URL and key.
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self, WriterError> {
        let client = reqwest::Client::builder().timeout(WRITE_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }
}

#[async_trait::async_trait]
impl SceneWriter for OpenAiSceneWriter {
    async fn write_scenes(&self, system_prompt: &str) -> Result<Vec<String>, WriterError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": "Write the story now." },
            ],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(WriterError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| WriterError::Malformed("empty choices array".to_string()))?;

        parse_scene_json(&content)
    }
}

/// Extract `Scene1`..`Scene20` from the model's JSON reply.
///
/// Tolerates a markdown code fence around the JSON and fills any
/// missing scene with a placeholder rather than failing the whole run.
pub(crate) fn parse_scene_json(content: &str) -> Result<Vec<String>, WriterError> {
    let stripped = strip_code_fence(content);
    let value: serde_json::Value = serde_json::from_str(stripped)
        .map_err(|e| WriterError::Malformed(format!("scene payload is not JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| WriterError::Malformed("scene payload is not an object".to_string()))?;

    let mut scenes = Vec::with_capacity(TOTAL_SCENES);
    let mut missing = 0;
    for n in 1..=TOTAL_SCENES {
        let key = format!("Scene{n}");
        match object.get(&key).and_then(|v| v.as_str()) {
            Some(text) if !text.trim().is_empty() => scenes.push(text.trim().to_string()),
            _ => {
                missing += 1;
                scenes.push(format!(
                    "The hero pauses to take in how far the journey has come (scene {n})."
                ));
            }
        }
    }

    // A reply that is mostly holes is a model failure, not a story.
    if missing > TOTAL_SCENES / 2 {
        return Err(WriterError::Malformed(format!(
            "{missing} of {TOTAL_SCENES} scenes missing from reply"
        )));
    }
    if missing > 0 {
        tracing::warn!(missing, "Scene reply had gaps, filled with placeholders");
    }
    Ok(scenes)
}

/// Strip a ```/```json markdown fence if the model wrapped its reply.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn full_reply() -> String {
        let entries: Vec<String> = (1..=TOTAL_SCENES)
            .map(|n| format!(r#""Scene{n}": "The fox does something brave in part {n}""#))
            .collect();
        format!("{{{}}}", entries.join(","))
    }

    #[test]
    fn parses_all_twenty_scenes_in_order() {
        let scenes = parse_scene_json(&full_reply()).unwrap();
        assert_eq!(scenes.len(), TOTAL_SCENES);
        assert!(scenes[0].contains("part 1"));
        assert!(scenes[19].contains("part 20"));
    }

    #[test]
    fn tolerates_markdown_fence() {
        let fenced = format!("```json\n{}\n```", full_reply());
        let scenes = parse_scene_json(&fenced).unwrap();
        assert_eq!(scenes.len(), TOTAL_SCENES);
    }

    #[test]
    fn fills_a_missing_scene_with_placeholder() {
        let entries: Vec<String> = (1..=TOTAL_SCENES)
            .filter(|n| *n != 13)
            .map(|n| format!(r#""Scene{n}": "text {n}""#))
            .collect();
        let reply = format!("{{{}}}", entries.join(","));

        let scenes = parse_scene_json(&reply).unwrap();
        assert_eq!(scenes.len(), TOTAL_SCENES);
        assert!(scenes[12].contains("scene 13"));
    }

    #[test]
    fn mostly_empty_reply_is_malformed() {
        let err = parse_scene_json(r#"{"Scene1": "only one"}"#).unwrap_err();
        assert!(matches!(err, WriterError::Malformed(_)));
    }

    #[test]
    fn non_json_reply_is_malformed() {
        let err = parse_scene_json("Once upon a time...").unwrap_err();
        assert!(matches!(err, WriterError::Malformed(_)));
    }
}

//! REST client for OpenAI-compatible image generation endpoints.
//!
//! Wraps `POST /v1/images/generations` using [`reqwest`]. Responses may
//! carry the image as inline base64 or as a download URL; both are
//! normalized to [`ImageData`].

use base64::Engine as _;
use serde::Deserialize;
use std::time::Duration;

use crate::backend::{ImageBackend, ImageData};

/// Default per-request timeout. Image models routinely take more than a
/// minute per render, so this is far above normal HTTP defaults.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Errors from the image generation API layer.
#[derive(Debug, thiserror::Error)]
pub enum ImageApiError {
    /// The API refused the prompt on content-policy grounds. Retrying
    /// the same prompt is pointless; rewording it may work.
    #[error("Prompt rejected by content policy: {body}")]
    ContentPolicy {
        /// Raw response body for debugging.
        body: String,
    },

    /// The API returned a non-2xx status for some other reason.
    #[error("Image API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A 2xx response that did not contain a usable image.
    #[error("Malformed image response: {0}")]
    Malformed(String),
}

impl ImageApiError {
    /// Whether rewording the prompt could make this request succeed.
    pub fn is_content_policy(&self) -> bool {
        matches!(self, Self::ContentPolicy { .. })
    }
}

/// Body markers the API uses for moderation rejections.
const CONTENT_POLICY_MARKERS: &[&str] = &[
    "content_policy_violation",
    "safety system",
    "moderation_blocked",
];

/// Classify a non-2xx response into the right error variant.
///
/// Moderation rejections arrive as a 400 with a distinctive error code
/// in the body; everything else stays a plain API error.
pub(crate) fn classify_api_error(status: u16, body: String) -> ImageApiError {
    if status == 400 && CONTENT_POLICY_MARKERS.iter().any(|m| body.contains(m)) {
        ImageApiError::ContentPolicy { body }
    } else {
        ImageApiError::Api { status, body }
    }
}

// ---------------------------------------------------------------------------
// OpenAiImageApi
// ---------------------------------------------------------------------------

/// Client for an OpenAI-compatible image generation API.
pub struct OpenAiImageApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    size: String,
}

/// Response body of `/v1/images/generations`.
#[derive(Debug, Deserialize)]
struct GenerationsResponse {
    data: Vec<GeneratedImage>,
}

/// One generated image: inline base64 or a download URL.
#[derive(Debug, Deserialize)]
struct GeneratedImage {
    b64_json: Option<String>,
    url: Option<String>,
}

impl OpenAiImageApi {
    /// Create a client for the given API base URL and key.
    ///
    /// * `base_url` - e.g. `https://api.openai.com`.
    /// * `model`    - e.g. `gpt-image-1`.
    /// * `size`     - e.g. `1024x1536`.
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        size: String,
    ) -> Result<Self, ImageApiError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model,
            size,
        })
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        model: String,
        size: String,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model,
            size,
        }
    }

    /// Fetch image bytes from a result URL.
    async fn download(&self, url: &str) -> Result<ImageData, ImageApiError> {
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(ImageData::png(bytes.to_vec()))
    }

    /// Ensure the response has a success status code, classifying
    /// failures by status and body.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ImageApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(classify_api_error(status.as_u16(), body));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl ImageBackend for OpenAiImageApi {
    async fn generate(&self, prompt: &str) -> Result<ImageData, ImageApiError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "n": 1,
            "size": self.size,
        });

        let response = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let parsed: GenerationsResponse = response.json().await?;

        let image = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ImageApiError::Malformed("empty data array".to_string()))?;

        if let Some(b64) = image.b64_json {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(b64.as_bytes())
                .map_err(|e| ImageApiError::Malformed(format!("invalid base64 payload: {e}")))?;
            return Ok(ImageData::png(bytes));
        }
        if let Some(url) = image.url {
            return self.download(&url).await;
        }
        Err(ImageApiError::Malformed(
            "image entry had neither b64_json nor url".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_with_policy_code_is_content_policy() {
        let err = classify_api_error(
            400,
            r#"{"error":{"code":"content_policy_violation"}}"#.to_string(),
        );
        assert!(err.is_content_policy());
    }

    #[test]
    fn safety_system_wording_is_content_policy() {
        let err = classify_api_error(
            400,
            "Your request was rejected by our safety system.".to_string(),
        );
        assert!(err.is_content_policy());
    }

    #[test]
    fn plain_bad_request_is_api_error() {
        let err = classify_api_error(400, r#"{"error":{"code":"invalid_size"}}"#.to_string());
        assert!(matches!(err, ImageApiError::Api { status: 400, .. }));
    }

    #[test]
    fn server_error_is_never_content_policy() {
        // A 500 quoting policy wording in a stack trace is still a
        // server error.
        let err = classify_api_error(500, "content_policy_violation".to_string());
        assert!(matches!(err, ImageApiError::Api { status: 500, .. }));
    }

    #[test]
    fn rate_limited_is_api_error() {
        let err = classify_api_error(429, "slow down".to_string());
        assert!(!err.is_content_policy());
    }
}

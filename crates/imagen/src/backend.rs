//! The [`ImageBackend`] trait.

use crate::openai::ImageApiError;

/// Raw image bytes plus their MIME type.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `image/png`.
    pub content_type: &'static str,
}

impl ImageData {
    /// PNG image data.
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: "image/png",
        }
    }
}

/// A service that renders one image from one prompt.
///
/// Implementations own their HTTP timeouts; callers add an outer
/// deadline on top when they need a hard bound.
#[async_trait::async_trait]
pub trait ImageBackend: Send + Sync {
    /// Generate an image for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<ImageData, ImageApiError>;
}

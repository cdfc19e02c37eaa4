//! Multipart upload client for hosted image services.
//!
//! Targets the unsigned-upload flavor of CDN-backed image hosts: POST a
//! multipart form with the file and an upload preset, read the public
//! URL back from the JSON response.

use serde::Deserialize;

use crate::backend::ImageData;
use crate::blob::{BlobError, BlobStore};

/// Client for an unsigned multipart image upload endpoint.
pub struct HostedImageStore {
    client: reqwest::Client,
    upload_url: String,
    upload_preset: String,
}

/// The subset of the upload response we need.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl HostedImageStore {
    /// Create a client for an upload endpoint.
    ///
    /// * `upload_url`    - full endpoint, e.g.
    ///   `https://api.cloudinary.com/v1_1/<cloud>/image/upload`.
    /// * `upload_preset` - the service-side unsigned upload preset name.
    pub fn new(upload_url: String, upload_preset: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url,
            upload_preset,
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for HostedImageStore {
    async fn put(&self, key: &str, data: &ImageData) -> Result<String, BlobError> {
        let part = reqwest::multipart::Part::bytes(data.bytes.clone())
            .file_name(key.to_string())
            .mime_str(data.content_type)
            .map_err(BlobError::Request)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone())
            .text("public_id", key.to_string());

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BlobError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = response.json().await?;
        Ok(parsed.secure_url)
    }
}

//! The [`BlobStore`] trait and upload retry policy.

use crate::backend::ImageData;

/// Errors from blob store implementations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The hosting service returned a non-2xx status.
    #[error("Upload rejected ({status}): {body}")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The underlying storage SDK failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Publicly addressable image hosting.
///
/// `put` stores the bytes under `key` and returns the public URL the
/// image is served from.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`; returns the public URL.
    async fn put(&self, key: &str, data: &ImageData) -> Result<String, BlobError>;
}

/// Retry delays between upload attempts, in seconds.
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// Upload with retries: one initial attempt plus one per entry in
/// [`RETRY_DELAYS_SECS`]. Uploads are idempotent per key, so retrying a
/// request that failed mid-flight is safe.
pub async fn upload_with_retry(
    store: &dyn BlobStore,
    key: &str,
    data: &ImageData,
) -> Result<String, BlobError> {
    let mut last_err = None;
    for (attempt, delay) in std::iter::once(None)
        .chain(RETRY_DELAYS_SECS.iter().map(|s| Some(*s)))
        .enumerate()
    {
        if let Some(secs) = delay {
            tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
        }
        match store.put(key, data).await {
            Ok(url) => return Ok(url),
            Err(e) => {
                tracing::warn!(key, attempt, error = %e, "Image upload attempt failed");
                last_err = Some(e);
            }
        }
    }
    // The loop always runs at least once, so last_err is set here.
    Err(last_err.unwrap_or(BlobError::Storage("upload never attempted".to_string())))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

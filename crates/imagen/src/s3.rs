//! S3-compatible [`BlobStore`].
//!
//! Stores images in a bucket configured for public reads (or fronted by
//! a CDN) and derives the public URL from a configured base.

use aws_sdk_s3::primitives::ByteStream;

use crate::backend::ImageData;
use crate::blob::{BlobError, BlobStore};

/// Blob store over an S3-compatible bucket.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3BlobStore {
    /// Wrap an existing S3 client.
    ///
    /// * `public_base_url` - URL prefix objects are served from, without
    ///   a trailing slash, e.g. `https://images.example.com`.
    pub fn new(client: aws_sdk_s3::Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url,
        }
    }

    /// Build a client from the ambient AWS environment.
    pub async fn from_env(bucket: String, public_base_url: String) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket, public_base_url)
    }
}

#[async_trait::async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: &ImageData) -> Result<String, BlobError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data.bytes.clone()))
            .content_type(data.content_type)
            .send()
            .await
            .map_err(|e| BlobError::Storage(e.to_string()))?;

        Ok(format!("{}/{key}", self.public_base_url))
    }
}

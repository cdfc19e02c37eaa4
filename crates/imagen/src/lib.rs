//! Image generation and hosting clients.
//!
//! - [`ImageBackend`] — trait over image generation APIs, implemented
//!   by [`OpenAiImageApi`].
//! - [`BlobStore`] — trait over image hosting, implemented by
//!   [`HostedImageStore`] (multipart upload service) and
//!   [`S3BlobStore`].
//!
//! Error classification matters here: a content-policy rejection is the
//! one failure the caller can fix by rewording the prompt, so it gets
//! its own variant instead of disappearing into a generic API error.

pub mod backend;
pub mod blob;
pub mod hosted;
pub mod openai;
pub mod s3;

pub use backend::{ImageBackend, ImageData};
pub use blob::{upload_with_retry, BlobError, BlobStore};
pub use hosted::HostedImageStore;
pub use openai::{ImageApiError, OpenAiImageApi};
pub use s3::S3BlobStore;

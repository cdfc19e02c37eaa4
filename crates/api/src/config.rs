/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How often the session TTL sweeper runs, in seconds (default: `300`).
    pub purge_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                 |
    /// |-----------------------|-------------------------|
    /// | `HOST`                | `0.0.0.0`               |
    /// | `PORT`                | `3000`                  |
    /// | `CORS_ORIGINS`        | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`| `30`                    |
    /// | `PURGE_INTERVAL_SECS` | `300`                   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let purge_interval_secs: u64 = std::env::var("PURGE_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("PURGE_INTERVAL_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            purge_interval_secs,
        }
    }
}

/// Upstream provider configuration (text model, image model, hosting).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// OpenAI-compatible API base URL.
    pub api_base_url: String,
    /// API key for the text and image endpoints.
    pub api_key: String,
    /// Chat model used to write the story.
    pub story_model: String,
    /// Image model used to render the scenes.
    pub image_model: String,
    /// Requested image size, e.g. `1024x1536`.
    pub image_size: String,
    /// Unsigned multipart upload endpoint, when hosting images via a
    /// CDN-backed service. Takes precedence over S3 when set.
    pub upload_url: Option<String>,
    /// Upload preset name for the unsigned upload endpoint.
    pub upload_preset: Option<String>,
    /// S3 bucket for image hosting (used when `upload_url` is unset).
    pub s3_bucket: Option<String>,
    /// Public URL prefix the S3 objects are served from.
    pub s3_public_base_url: Option<String>,
}

impl ProviderConfig {
    /// Load provider configuration from environment variables.
    ///
    /// | Env Var                       | Default                  |
    /// |-------------------------------|--------------------------|
    /// | `OPENAI_BASE_URL`             | `https://api.openai.com` |
    /// | `OPENAI_API_KEY`              | (required)               |
    /// | `FOXTALE_STORY_MODEL`         | `gpt-4o`                 |
    /// | `FOXTALE_IMAGE_MODEL`         | `gpt-image-1`            |
    /// | `FOXTALE_IMAGE_SIZE`          | `1024x1536`              |
    /// | `FOXTALE_UPLOAD_URL`          | (unset)                  |
    /// | `FOXTALE_UPLOAD_PRESET`       | (unset)                  |
    /// | `FOXTALE_S3_BUCKET`           | (unset)                  |
    /// | `FOXTALE_S3_PUBLIC_BASE_URL`  | (unset)                  |
    pub fn from_env() -> Self {
        Self {
            api_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".into()),
            api_key: std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set"),
            story_model: std::env::var("FOXTALE_STORY_MODEL").unwrap_or_else(|_| "gpt-4o".into()),
            image_model: std::env::var("FOXTALE_IMAGE_MODEL")
                .unwrap_or_else(|_| "gpt-image-1".into()),
            image_size: std::env::var("FOXTALE_IMAGE_SIZE")
                .unwrap_or_else(|_| "1024x1536".into()),
            upload_url: std::env::var("FOXTALE_UPLOAD_URL").ok(),
            upload_preset: std::env::var("FOXTALE_UPLOAD_PRESET").ok(),
            s3_bucket: std::env::var("FOXTALE_S3_BUCKET").ok(),
            s3_public_base_url: std::env::var("FOXTALE_S3_PUBLIC_BASE_URL").ok(),
        }
    }
}

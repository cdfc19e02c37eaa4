use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use foxtale_api::background;
use foxtale_api::config::{ProviderConfig, ServerConfig};
use foxtale_api::router::build_app_router;
use foxtale_api::state::AppState;
use foxtale_events::EventBus;
use foxtale_imagen::{BlobStore, HostedImageStore, OpenAiImageApi, S3BlobStore};
use foxtale_pipeline::{OpenAiSceneWriter, PipelineConfig, SceneRenderer};
use foxtale_store::PgSessionStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "foxtale_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let provider = ProviderConfig::from_env();
    let pipeline = PipelineConfig::from_env().expect("Invalid pipeline configuration");

    // --- Session store ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    PgSessionStore::migrate(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store: Arc<dyn foxtale_store::SessionStore> = Arc::new(PgSessionStore::new(pool));

    // --- Event bus ---
    let bus = Arc::new(EventBus::default());

    // --- Provider clients ---
    let writer = OpenAiSceneWriter::new(
        provider.api_base_url.clone(),
        provider.api_key.clone(),
        provider.story_model.clone(),
    )
    .expect("Failed to build story writer");

    let backend = OpenAiImageApi::new(
        provider.api_base_url.clone(),
        provider.api_key.clone(),
        provider.image_model.clone(),
        provider.image_size.clone(),
    )
    .expect("Failed to build image client");

    let blobs: Arc<dyn BlobStore> = match (&provider.upload_url, &provider.s3_bucket) {
        (Some(upload_url), _) => {
            let preset = provider
                .upload_preset
                .clone()
                .expect("FOXTALE_UPLOAD_PRESET must be set with FOXTALE_UPLOAD_URL");
            tracing::info!(%upload_url, "Using hosted image upload");
            Arc::new(HostedImageStore::new(upload_url.clone(), preset))
        }
        (None, Some(bucket)) => {
            let base = provider
                .s3_public_base_url
                .clone()
                .expect("FOXTALE_S3_PUBLIC_BASE_URL must be set with FOXTALE_S3_BUCKET");
            tracing::info!(%bucket, "Using S3 image hosting");
            Arc::new(S3BlobStore::from_env(bucket.clone(), base).await)
        }
        (None, None) => {
            panic!("Set FOXTALE_UPLOAD_URL or FOXTALE_S3_BUCKET for image hosting")
        }
    };

    let generator = Arc::new(SceneRenderer::new(
        Arc::new(backend),
        blobs,
        pipeline.generation_timeout,
        pipeline.max_attempts,
    ));

    // --- Background tasks ---
    let sweeper_cancel = tokio_util::sync::CancellationToken::new();
    let sweeper_handle = background::spawn_purge_sweeper(
        Arc::clone(&store),
        Duration::from_secs(config.purge_interval_secs),
        sweeper_cancel.clone(),
    );
    tracing::info!("Session sweeper started");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        bus: Arc::clone(&bus),
        writer: Arc::new(writer),
        generator,
        pipeline,
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    sweeper_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;
    tracing::info!("Session sweeper stopped");

    // Drop the event bus sender to close the broadcast channel, which
    // ends any remaining SSE subscriber streams.
    drop(bus);

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

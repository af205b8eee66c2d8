use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState, DEFAULT_MAX_UPLOAD_BYTES};
use report_store_core::{
    config::{
        render_command_from_env_value, render_timeout_from_env_value, storage_root_from_env_value,
    },
    CoreConfig, ReportStore,
};

/// Main entry point for the report store server
///
/// Serves the REST API (with Swagger UI at `/ui`) over a directory-backed store.
///
/// # Environment Variables
/// - `REPORT_STORE_ADDR`: Server address (default: "0.0.0.0:3050")
/// - `ROOT_DIR`: Storage root directory (default: "./storage"), created if missing
/// - `ALLURE_COMMAND`: Allure executable used for rendering (default: "allure")
/// - `RENDER_TIMEOUT_SECS`: Render timeout in seconds (default: 300)
/// - `MAX_UPLOAD_BYTES`: Upper bound on an upload request body (default: 100 MiB)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - a configuration value is invalid,
/// - the storage root cannot be created,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("report_store_run=info".parse()?)
                .add_directive("report_store_core=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("REPORT_STORE_ADDR").unwrap_or_else(|_| "0.0.0.0:3050".into());

    let storage_root = storage_root_from_env_value(std::env::var("ROOT_DIR").ok());
    std::fs::create_dir_all(&storage_root)?;

    let cfg = Arc::new(CoreConfig::new(
        storage_root,
        render_command_from_env_value(std::env::var("ALLURE_COMMAND").ok()),
        render_timeout_from_env_value(std::env::var("RENDER_TIMEOUT_SECS").ok())?,
    )?);

    let max_upload_bytes = match std::env::var("MAX_UPLOAD_BYTES") {
        Ok(value) => value.trim().parse::<usize>().map_err(|e| {
            anyhow::anyhow!("MAX_UPLOAD_BYTES must be a number of bytes, got '{value}': {e}")
        })?,
        Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
    };

    tracing::info!(
        "-- Starting report store on {} (storage root {}, renderer '{}')",
        addr,
        cfg.storage_root().display(),
        cfg.render_command()
    );

    let state =
        AppState::new(ReportStore::with_allure(cfg)).with_max_upload_bytes(max_upload_bytes);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server");
}

//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::PgStore, platform::HttpAgentPlatform},
    config::Config,
    error::ApiError,
    web::{build_router, rest::ApiDoc, state::AppState},
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use axum::Router;
use classroom_agent_core::health::HealthMonitor;
use classroom_agent_core::sync::SyncFailure;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgStore::new(db_pool));
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    match config.sync_course_id {
        Some(course_id) => {
            store.set_sync_scope(course_id).await?;
            info!(%course_id, "Knowledge base sync enabled.");
        }
        None => info!("SYNC_COURSE_ID not set; knowledge base sync disabled."),
    }

    // --- 3. Initialize the Agent Platform Adapter ---
    let platform = Arc::new(HttpAgentPlatform::new(
        config.platform_url.clone(),
        config.platform_timeout,
    )?);
    info!(url = %config.platform_url, "Agent platform client ready.");

    // --- 4. Start Background Tasks ---
    let shutdown = CancellationToken::new();
    let health = Arc::new(HealthMonitor::new(platform.clone()));
    let (readiness, health_task) = health
        .clone()
        .spawn_polling(config.health_poll_interval, shutdown.clone());

    // --- 5. Build the Shared AppState ---
    let (app_state, failures) = AppState::new(
        store.clone(),
        store,
        platform,
        health,
        readiness,
        config.clone(),
    );
    let failure_task = tokio::spawn(log_sync_failures(failures));
    let app_state = Arc::new(app_state);

    // --- 6. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("x-user-id"),
        ]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(build_router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received.");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = health_task.await {
        error!("Health polling task ended abnormally: {}", e);
    }
    failure_task.abort();
    Ok(())
}

/// Drains the sync failure sink into the log. Runs until every sender is gone.
async fn log_sync_failures(mut failures: mpsc::UnboundedReceiver<SyncFailure>) {
    while let Some(failure) = failures.recv().await {
        error!(
            course_id = %failure.course_id,
            subject = %failure.subject,
            attempts = failure.attempts,
            kind = failure.error.kind(),
            error = %failure.error,
            failed_at = %failure.failed_at,
            "Knowledge base is out of date: push gave up."
        );
    }
}

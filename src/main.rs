use std::sync::Arc;

use axum::{routing::get, Router};
use http::HeaderValue;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod idempotency;
mod providers;
mod queue;
mod routes;
mod services;

use config::Config;
use idempotency::IdempotencyStore;
use providers::ProviderRegistry;
use queue::DeliveryQueue;
use services::init;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub queue: DeliveryQueue,
    pub idempotency: IdempotencyStore,
    pub providers: Arc<ProviderRegistry>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notification_dispatcher=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Notification Dispatcher");

    // Initialize database
    let pool = init::init_db(&config).await?;

    // Build the provider registry from configuration (with per-channel
    // fallbacks for anything unconfigured)
    let providers = Arc::new(ProviderRegistry::from_config(&config));

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        queue: DeliveryQueue::new(),
        idempotency: IdempotencyStore::new(),
        providers,
    });

    // Spawn background workers: delivery worker pool, scheduler sweep,
    // DLQ alert tick and daily maintenance
    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let worker_handles = init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))
        // Notification intake routes
        .nest("/api/v1/notifications", routes::notifications::router())
        // DLQ operator routes
        .nest("/api/v1/dlq", routes::dlq::router())
        // Add shared state
        .with_state(app_state.clone())
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin("*".parse::<HeaderValue>().expect("valid wildcard origin"))
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::DELETE,
                ])
                .allow_headers([http::header::CONTENT_TYPE, http::header::ACCEPT]),
        );

    // Start server
    let host = config.server.host.clone();
    let port = config.server.port;
    let addr = format!("{}:{}", host, port);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    // Stop background tasks and wait for them to drain
    let _ = shutdown_tx.send(());
    for handle in worker_handles {
        let _ = handle.await;
    }

    Ok(())
}

//! Robbie - chat assistant for a real-estate photography studio
//!
//! Keyword intent routing in front of per-flow step machines, with each
//! session's flow position persisted in SQLite.

mod api;
mod config;
mod db;
mod dispatcher;
mod flows;
mod intent;
mod money;
mod state_machine;
mod studio;

use api::{create_router, AppState};
use config::Config;
use db::Database;
use dispatcher::Dispatcher;
use std::net::SocketAddr;
use std::sync::Arc;
use studio::{Clock, InMemoryStudio, Studio, StudioData, SystemClock};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "robbie=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    // Studio records: seed file when configured, demo data otherwise
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend = match &config.seed_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading studio seed");
            InMemoryStudio::from_seed_file(path, clock.clone())?
        }
        None => {
            tracing::warn!("No ROBBIE_SEED_PATH set, using demo studio data");
            InMemoryStudio::new(StudioData::demo(clock.now()), clock.clone())
        }
    };
    let backend = Arc::new(backend.with_public_url(config.public_url.clone()));
    let mut studio = Studio::from_backend(&backend, clock, config.public_url.clone());
    if let Some(email) = &config.support_email {
        studio = studio.with_support_email(email.clone());
    }

    if config.debug {
        tracing::warn!("Debug mode: flow errors are shown in chat replies");
    }
    let state = AppState::new(Dispatcher::new(db, studio).with_debug(config.debug));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Robbie listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

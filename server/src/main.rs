//! Verlog Server - HTTP access to records and their embedded history.
//!
//! Each record is stored together with its version log. Writes, history
//! queries and undo all go through verlog-engine; this crate adds storage,
//! per-record locking and the HTTP surface.

mod config;
mod db;
mod error;
mod handlers;
mod responsible;
mod routes;

use crate::config::{Config, StorageBackend};
use crate::db::Repository;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub config: Arc<Config>,
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verlog_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Verlog Server on {}:{}", config.host, config.port);

    let repo = match &config.storage {
        StorageBackend::Postgres { database_url } => {
            let pool = db::create_pool(database_url).await?;

            tracing::info!("Running database migrations...");
            db::run_migrations(&pool).await?;

            Repository::Postgres(pool)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; records are lost on restart");
            Repository::memory()
        }
    };

    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
    };

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}

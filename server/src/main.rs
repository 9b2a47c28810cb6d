//! Threadline Server - comment service for threaded discussions.
//!
//! Persists comments in PostgreSQL, serves them over HTTP and pushes every
//! change to the thread's WebSocket subscribers, echoing the client's
//! correlation token on creates so optimistic clients can reconcile.

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod routes;
mod websocket;

use crate::config::Config;
use crate::db::Pool;
use crate::websocket::ConnectionManager;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub conn_manager: Arc<ConnectionManager>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "threadline_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Threadline Server on {}:{}", config.host, config.port);

    let pool = db::create_pool(&config.database_url, config.max_connections).await?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        pool,
        config: Arc::new(config),
        conn_manager: ConnectionManager::new_shared(),
    };

    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

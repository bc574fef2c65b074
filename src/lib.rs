//! jobwarden -- lightweight cron job scheduler with execution history.
//!
//! Jobs pair a shell command with a six-field cron expression. A background
//! engine polls on a fixed tick, runs due jobs as external processes, and
//! appends an immutable execution record for every attempt. A small HTTP
//! API and CLI manage job definitions and expose the history.

pub mod api;
pub mod config;
pub mod engine;
pub mod model;
pub mod store;

use std::sync::Arc;

use anyhow::Result;

use crate::store::{ExecutionStore, JobStore};

/// Start the jobwarden daemon: API server and scheduler loop.
pub async fn serve(config: config::Config) -> Result<()> {
    tracing::info!(db_path = %config.db_path, "Initializing database");
    let pool = store::sqlite::open_pool(&config.db_path)?;
    let sqlite = Arc::new(store::sqlite::SqliteStore::new(pool));
    let jobs: Arc<dyn JobStore> = sqlite.clone();
    let executions: Arc<dyn ExecutionStore> = sqlite;

    let engine = Arc::new(engine::Engine::new(
        jobs.clone(),
        executions.clone(),
        config.tick_seconds,
    ));
    let engine_handle = engine::dispatch::start(Arc::clone(&engine));

    let state = api::state::AppState {
        jobs,
        executions,
        engine,
    };
    let app = api::router(state);

    let addr: std::net::SocketAddr = config.bind.parse()?;
    tracing::info!(%addr, "jobwarden listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    engine_handle.shutdown().await;
    Ok(())
}

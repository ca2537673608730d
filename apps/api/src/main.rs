//! Maestro Server - Main entry point

use std::sync::Arc;

use anyhow::Result;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use maestro_api::{routes, AppState};
use maestro_common::{init_tracing, AppConfig};
use maestro_db::{
    ExecutionRepository, MemExecutionRepository, MemRevisionRepository, PgExecutionRepository,
    PgRevisionRepository, RevisionRepository,
};
use maestro_engine::{StaleExecutionSweeper, WorkRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    let (revisions, executions): (Arc<dyn RevisionRepository>, Arc<dyn ExecutionRepository>) =
        match &config.database_url {
            Some(url) => {
                let pool = maestro_db::connect(url).await?;
                (
                    Arc::new(PgRevisionRepository::new(pool.clone())),
                    Arc::new(PgExecutionRepository::new(pool)),
                )
            }
            None => {
                tracing::warn!(
                    "MAESTRO_DATABASE_URL not set; using in-memory stores (state is not durable)"
                );
                (
                    Arc::new(MemRevisionRepository::new()),
                    Arc::new(MemExecutionRepository::new()),
                )
            }
        };

    let work = Arc::new(WorkRegistry::with_builtins());

    let _sweeper = StaleExecutionSweeper::new(Arc::clone(&executions), config.execution_timeout())
        .with_interval(config.sweeper_interval())
        .spawn();

    let state = AppState::new(revisions, executions, work, config.execution_timeout());

    let app = routes::api_routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.socket_addr()?;
    tracing::info!("Starting Maestro server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

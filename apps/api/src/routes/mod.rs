//! API route definitions

mod executions;
mod health;
mod workflows;

use axum::Router;

use crate::state::AppState;

/// Build the API router with all routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .nest("/api/workflows", workflows::routes())
        .nest("/api/executions", executions::routes())
}

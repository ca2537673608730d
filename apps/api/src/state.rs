//! Shared application state

use std::sync::Arc;
use std::time::Duration;

use maestro_db::{ExecutionRepository, RevisionRepository};
use maestro_engine::{ExecutionCoordinator, WorkRegistry};

/// Repositories and the coordinator, shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub revisions: Arc<dyn RevisionRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub coordinator: Arc<ExecutionCoordinator>,
}

impl AppState {
    /// Wire the state from repositories and a work registry.
    #[must_use]
    pub fn new(
        revisions: Arc<dyn RevisionRepository>,
        executions: Arc<dyn ExecutionRepository>,
        work: Arc<WorkRegistry>,
        execution_timeout: Duration,
    ) -> Self {
        let coordinator = Arc::new(
            ExecutionCoordinator::new(
                Arc::clone(&revisions),
                Arc::clone(&executions),
                work,
            )
            .with_timeout(execution_timeout),
        );

        Self {
            revisions,
            executions,
            coordinator,
        }
    }
}

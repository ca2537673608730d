//! Execution coordinator
//!
//! Owns the life of one execution: loads the revision, validates
//! parameters, writes the RUNNING header (checkpoint 0), drives the
//! interpreter with one transactional checkpoint per step, and writes the
//! terminal transition. Steps are never retried and prior step results are
//! never rolled back; a failed run's results are durable diagnostics.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, warn};

use maestro_db::{ExecutionRepository, RevisionRepository};
use maestro_domain::{
    ExecutionId, ExecutionStatus, ExecutionStepResult, WorkflowExecution, WorkflowRevisionId,
};

use crate::context::ExecutionContext;
use crate::interpreter::{CheckpointError, FinalStatus, StepInterpreter, StepResultSink};
use crate::params::{validate_parameters, ParamError};
use crate::work::WorkRegistry;

/// Default wall-clock budget for a single execution
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(600);

/// Error type prefix recorded when the wall-clock budget is exceeded
pub const ERROR_TYPE_TIMEOUT: &str = "ExecutionTimeout";

/// Error type prefix recorded when a step checkpoint could not be committed
pub const ERROR_TYPE_CHECKPOINT: &str = "CheckpointCommitFailed";

/// Error type prefix recorded by the sweeper for abandoned executions
pub const ERROR_TYPE_CRASHED: &str = "OrchestratorCrashed";

/// Errors surfaced to the caller of `execute`
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("workflow revision not found: {0}")]
    WorkflowNotFound(WorkflowRevisionId),

    #[error("parameter validation failed with {} violation(s)", .0.len())]
    ParameterValidationFailed(Vec<ParamError>),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Runs workflow executions synchronously, checkpointing every transition
pub struct ExecutionCoordinator {
    revisions: Arc<dyn RevisionRepository>,
    executions: Arc<dyn ExecutionRepository>,
    work: Arc<WorkRegistry>,
    timeout: Duration,
}

impl ExecutionCoordinator {
    #[must_use]
    pub fn new(
        revisions: Arc<dyn RevisionRepository>,
        executions: Arc<dyn ExecutionRepository>,
        work: Arc<WorkRegistry>,
    ) -> Self {
        Self {
            revisions,
            executions,
            work,
            timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    /// Override the per-execution wall-clock timeout.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Execute a revision to completion and return the terminal header.
    ///
    /// Validation failures and unknown revisions leave no execution record.
    pub async fn execute(
        &self,
        revision_id: &WorkflowRevisionId,
        submitted: &Map<String, Value>,
    ) -> Result<WorkflowExecution, ExecuteError> {
        let revision = self
            .revisions
            .find_by_id(revision_id)
            .await
            .map_err(|e| ExecuteError::Storage(e.to_string()))?
            .ok_or_else(|| ExecuteError::WorkflowNotFound(revision_id.clone()))?;

        let validated = validate_parameters(submitted, &revision.parameters)
            .map_err(ExecuteError::ParameterValidationFailed)?;

        // Checkpoint 0: the RUNNING header
        let execution_id = ExecutionId::generate();
        let now = Utc::now();
        let mut header = WorkflowExecution {
            execution_id: execution_id.clone(),
            revision_id: revision_id.clone(),
            input_parameters: validated.clone(),
            status: ExecutionStatus::Running,
            error_message: None,
            started_at: now,
            completed_at: None,
            last_updated_at: now,
        };
        self.executions
            .create_execution(&header)
            .await
            .map_err(|e| ExecuteError::Storage(e.to_string()))?;

        // Checkpoints 1..N: one per step result, committed before the
        // interpreter advances
        let interpreter = StepInterpreter::new(&self.work);
        let mut sink = RepositorySink {
            executions: Arc::clone(&self.executions),
        };
        let ctx = ExecutionContext::new(validated);

        let run = std::panic::AssertUnwindSafe(tokio::time::timeout(
            self.timeout,
            interpreter.run(&execution_id, &revision.root_step, ctx, &mut sink),
        ))
        .catch_unwind()
        .await;

        let (status, error_message) = match run {
            Ok(Ok(Ok(outcome))) => match outcome.status {
                FinalStatus::Completed => (ExecutionStatus::Completed, None),
                FinalStatus::Failed => (
                    ExecutionStatus::Failed,
                    outcome
                        .first_error
                        .or_else(|| Some("step execution failed".to_string())),
                ),
            },
            Ok(Ok(Err(checkpoint))) => {
                warn!(
                    execution_id = %execution_id,
                    "aborting execution, step checkpoint failed: {checkpoint}"
                );
                (
                    ExecutionStatus::Failed,
                    Some(format!("{ERROR_TYPE_CHECKPOINT}: {}", checkpoint.message)),
                )
            }
            Ok(Err(_elapsed)) => (
                ExecutionStatus::Failed,
                Some(format!(
                    "{ERROR_TYPE_TIMEOUT}: execution exceeded the {}s budget",
                    self.timeout.as_secs()
                )),
            ),
            Err(_panic) => {
                error!(execution_id = %execution_id, "interpreter panicked");
                (
                    ExecutionStatus::Failed,
                    Some(format!("{ERROR_TYPE_CRASHED}: interpreter panicked")),
                )
            }
        };

        // Terminal checkpoint. If this write fails the header stays RUNNING
        // and the sweeper resolves it later.
        let completed_at = Utc::now();
        if let Err(e) = self
            .executions
            .set_terminal(&execution_id, status, error_message.as_deref(), completed_at)
            .await
        {
            error!(
                execution_id = %execution_id,
                "terminal transition failed, leaving header RUNNING for the sweeper: {e}"
            );
            return Err(ExecuteError::Storage(e.to_string()));
        }

        header.status = status;
        header.error_message = error_message;
        header.completed_at = Some(completed_at);
        header.last_updated_at = completed_at;
        Ok(header)
    }
}

/// Sink that commits each step result through the execution repository
struct RepositorySink {
    executions: Arc<dyn ExecutionRepository>,
}

#[async_trait]
impl StepResultSink for RepositorySink {
    async fn emit(&mut self, result: ExecutionStepResult) -> Result<(), CheckpointError> {
        self.executions
            .append_step_result(&result)
            .await
            .map_err(|e| CheckpointError::new(e.to_string()))
    }
}

//! Per-operation repository errors
//!
//! Each repository operation has its own error type for precise error
//! handling at the HTTP boundary.

use chrono::{DateTime, Utc};
use thiserror::Error;

use maestro_domain::{ExecutionId, WorkflowRevisionId};

// =============================================================================
// Revision Repository Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum CreateRevisionError {
    #[error("workflow already exists: {namespace}/{workflow_id}")]
    AlreadyExists {
        namespace: String,
        workflow_id: String,
    },
    #[error("workflow not found: {namespace}/{workflow_id}")]
    WorkflowNotFound {
        namespace: String,
        workflow_id: String,
    },
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum RevisionStoreError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum UpdateRevisionError {
    #[error("workflow revision not found: {0}")]
    NotFound(WorkflowRevisionId),
    #[error("revision {0} is active and cannot be modified")]
    ActiveRevisionConflict(WorkflowRevisionId),
    #[error("optimistic lock conflict: expected updatedAt {expected}, stored updatedAt {actual}")]
    OptimisticLockConflict {
        expected: DateTime<Utc>,
        actual: DateTime<Utc>,
    },
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum DeleteRevisionError {
    #[error("workflow revision not found: {0}")]
    NotFound(WorkflowRevisionId),
    #[error("active revision conflict: {0}")]
    ActiveRevisionConflict(String),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

// =============================================================================
// Execution Repository Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum CreateExecutionError {
    #[error("duplicate execution id: {0}")]
    DuplicateId(ExecutionId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum AppendStepError {
    #[error("duplicate step index {step_index} for execution {execution_id}")]
    DuplicateIndex {
        execution_id: ExecutionId,
        step_index: i32,
    },
    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum SetTerminalError {
    #[error("execution not found: {0}")]
    NotFound(ExecutionId),
    #[error("execution {0} is already in a different terminal state")]
    AlreadyTerminal(ExecutionId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ExecutionStoreError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

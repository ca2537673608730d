//! Repository trait definitions
//!
//! These traits define the interface for data access operations. The engine
//! and the HTTP boundary depend only on these; PostgreSQL and in-memory
//! implementations are provided in sibling modules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use maestro_domain::{
    ExecutionId, ExecutionStatus, ExecutionStepResult, ParameterDefinition, Step,
    WorkflowExecution, WorkflowRevision, WorkflowRevisionId, WorkflowRevisionWithSource,
};

use crate::pagination::{Page, Pagination};
use crate::repo::errors::*;

// =============================================================================
// Input Types
// =============================================================================

/// Input for creating a workflow revision (the store assigns the version)
#[derive(Debug, Clone)]
pub struct NewRevision {
    pub namespace: String,
    pub workflow_id: String,
    pub name: String,
    pub description: Option<String>,
    pub parameters: Vec<ParameterDefinition>,
    pub root_step: Step,
    /// Original declarative text, preserved verbatim for readback
    pub source: String,
}

/// Content update for an existing (inactive) revision
#[derive(Debug, Clone)]
pub struct RevisionUpdate {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Vec<ParameterDefinition>,
    pub root_step: Step,
    pub source: String,
}

/// Filters for execution history listings
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionFilter {
    pub version: Option<i32>,
    pub status: Option<ExecutionStatus>,
}

// =============================================================================
// Output Types
// =============================================================================

/// Execution header together with its ordered step results
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub execution: WorkflowExecution,
    /// Ordered by `step_index` ascending
    pub steps: Vec<ExecutionStepResult>,
}

/// Summary row for execution history listings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub revision_version: i32,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub step_count: i64,
    pub completed_steps: i64,
    pub failed_steps: i64,
}

// =============================================================================
// Repository Traits
// =============================================================================

/// Repository for workflow revisions
#[async_trait]
pub trait RevisionRepository: Send + Sync {
    /// Create version 1 of a new workflow.
    ///
    /// Fails with `AlreadyExists` when the `(namespace, workflow_id)` pair
    /// already has any revision.
    async fn create_initial(
        &self,
        revision: &NewRevision,
    ) -> Result<WorkflowRevision, CreateRevisionError>;

    /// Create the next version under an existing workflow.
    ///
    /// The assigned version is `max(version) + 1`; fails with
    /// `WorkflowNotFound` when no prior revision exists.
    async fn create_next(
        &self,
        revision: &NewRevision,
    ) -> Result<WorkflowRevision, CreateRevisionError>;

    /// Find a revision by identity.
    async fn find_by_id(
        &self,
        id: &WorkflowRevisionId,
    ) -> Result<Option<WorkflowRevision>, RevisionStoreError>;

    /// Find a revision together with its verbatim source document.
    async fn find_by_id_with_source(
        &self,
        id: &WorkflowRevisionId,
    ) -> Result<Option<WorkflowRevisionWithSource>, RevisionStoreError>;

    /// List revisions of a workflow ordered by version ascending.
    async fn list(
        &self,
        namespace: &str,
        workflow_id: &str,
        active_only: bool,
    ) -> Result<Vec<WorkflowRevision>, RevisionStoreError>;

    /// Replace the content of an inactive revision.
    ///
    /// CAS on `updated_at`: the stored timestamp must equal
    /// `expected_updated_at` or the update fails with
    /// `OptimisticLockConflict`.
    async fn update(
        &self,
        id: &WorkflowRevisionId,
        update: &RevisionUpdate,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<WorkflowRevision, UpdateRevisionError>;

    /// Toggle the active flag, with the same CAS protocol as `update`.
    ///
    /// Idempotent when the revision is already in the desired state.
    async fn set_active(
        &self,
        id: &WorkflowRevisionId,
        desired: bool,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<WorkflowRevision, UpdateRevisionError>;

    /// Delete an inactive revision. Deletes punch holes in the version
    /// sequence; versions are never renumbered.
    async fn delete_revision(&self, id: &WorkflowRevisionId) -> Result<(), DeleteRevisionError>;

    /// Delete all revisions of a workflow; idempotent when none exist.
    async fn delete_workflow(
        &self,
        namespace: &str,
        workflow_id: &str,
    ) -> Result<(), DeleteRevisionError>;
}

/// Repository for workflow executions and their step results
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Insert a RUNNING execution header.
    async fn create_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<(), CreateExecutionError>;

    /// Append one step result and refresh the header's `last_updated_at`,
    /// in a single transaction. `(execution_id, step_index)` is unique and
    /// existing rows are never updated.
    async fn append_step_result(&self, result: &ExecutionStepResult)
        -> Result<(), AppendStepError>;

    /// Transition the header to a terminal status.
    ///
    /// Idempotent when called again with the same status and error message;
    /// a different terminal state is rejected.
    async fn set_terminal(
        &self,
        id: &ExecutionId,
        status: ExecutionStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), SetTerminalError>;

    /// Fetch the header plus step results ordered by `step_index`.
    async fn find_by_id(
        &self,
        id: &ExecutionId,
    ) -> Result<Option<ExecutionRecord>, ExecutionStoreError>;

    /// Execution history for a workflow, ordered by `started_at` descending.
    async fn list_by_workflow(
        &self,
        namespace: &str,
        workflow_id: &str,
        filter: &ExecutionFilter,
        pagination: &Pagination,
    ) -> Result<Page<ExecutionSummary>, ExecutionStoreError>;

    /// Total matching executions, for pagination.
    async fn count_by_workflow(
        &self,
        namespace: &str,
        workflow_id: &str,
        filter: &ExecutionFilter,
    ) -> Result<i64, ExecutionStoreError>;

    /// RUNNING executions whose `last_updated_at` is older than `cutoff`
    /// (input to the stale-execution sweeper).
    async fn find_stale_running(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ExecutionId>, ExecutionStoreError>;
}

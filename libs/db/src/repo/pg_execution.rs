//! PostgreSQL implementation of ExecutionRepository
//!
//! One transaction per checkpoint: the header insert, each step result
//! append (which also refreshes the header's `last_updated_at`), and the
//! terminal transition each commit independently. Step result rows are
//! insert-only; the unique `(execution_id, step_index)` constraint is the
//! only write contention point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use maestro_domain::{
    ErrorDetails, ExecutionId, ExecutionStatus, ExecutionStepResult, StepResultStatus, StepType,
    WorkflowExecution, WorkflowRevisionId,
};

use crate::pagination::{Page, Pagination};
use crate::repo::errors::{
    AppendStepError, CreateExecutionError, ExecutionStoreError, SetTerminalError,
};
use crate::repo::traits::{
    ExecutionFilter, ExecutionRecord, ExecutionRepository, ExecutionSummary,
};

/// PostgreSQL execution repository
pub struct PgExecutionRepository {
    pool: PgPool,
}

impl PgExecutionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for PgExecutionRepository {
    async fn create_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<(), CreateExecutionError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions (
                execution_id, namespace, workflow_id, version,
                input_parameters, status, error_message,
                started_at, completed_at, last_updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(execution.execution_id.as_str())
        .bind(&execution.revision_id.namespace)
        .bind(&execution.revision_id.workflow_id)
        .bind(execution.revision_id.version)
        .bind(Json(&execution.input_parameters))
        .bind(execution.status.as_str())
        .bind(&execution.error_message)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.last_updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db_err| db_err.is_unique_violation())
            {
                CreateExecutionError::DuplicateId(execution.execution_id.clone())
            } else {
                CreateExecutionError::Database(e)
            }
        })?;
        Ok(())
    }

    async fn append_step_result(
        &self,
        result: &ExecutionStepResult,
    ) -> Result<(), AppendStepError> {
        let mut tx = self.pool.begin().await.map_err(AppendStepError::Database)?;

        sqlx::query(
            r#"
            INSERT INTO execution_step_results (
                result_id, execution_id, step_index, step_id, step_type,
                status, input_data, output_data, error_message, error_details,
                started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(result.result_id)
        .bind(result.execution_id.as_str())
        .bind(result.step_index)
        .bind(&result.step_id)
        .bind(result.step_type.as_str())
        .bind(result.status.as_str())
        .bind(Json(&result.input_data))
        .bind(result.output_data.as_ref().map(Json))
        .bind(&result.error_message)
        .bind(result.error_details.as_ref().map(Json))
        .bind(result.started_at)
        .bind(result.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => AppendStepError::DuplicateIndex {
                execution_id: result.execution_id.clone(),
                step_index: result.step_index,
            },
            Some(db_err) if db_err.is_foreign_key_violation() => {
                AppendStepError::ExecutionNotFound(result.execution_id.clone())
            }
            _ => AppendStepError::Database(e),
        })?;

        sqlx::query("UPDATE workflow_executions SET last_updated_at = NOW() WHERE execution_id = $1")
            .bind(result.execution_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(AppendStepError::Database)?;

        tx.commit().await.map_err(AppendStepError::Database)?;
        Ok(())
    }

    async fn set_terminal(
        &self,
        id: &ExecutionId,
        status: ExecutionStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), SetTerminalError> {
        let updated = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2, error_message = $3, completed_at = $4, last_updated_at = $4
            WHERE execution_id = $1 AND status = 'RUNNING'
            "#,
        )
        .bind(id.as_str())
        .bind(status.as_str())
        .bind(error_message)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(SetTerminalError::Database)?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing was RUNNING: either missing, or already terminal.
        let current = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT status, error_message FROM workflow_executions WHERE execution_id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(SetTerminalError::Database)?;

        match current {
            None => Err(SetTerminalError::NotFound(id.clone())),
            Some((stored_status, stored_error))
                if stored_status == status.as_str()
                    && stored_error.as_deref() == error_message =>
            {
                Ok(())
            }
            Some(_) => Err(SetTerminalError::AlreadyTerminal(id.clone())),
        }
    }

    async fn find_by_id(
        &self,
        id: &ExecutionId,
    ) -> Result<Option<ExecutionRecord>, ExecutionStoreError> {
        let header = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT execution_id, namespace, workflow_id, version,
                   input_parameters, status, error_message,
                   started_at, completed_at, last_updated_at
            FROM workflow_executions
            WHERE execution_id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(ExecutionStoreError::Database)?;

        let Some(header) = header else {
            return Ok(None);
        };

        let steps = sqlx::query_as::<_, StepResultRow>(
            r#"
            SELECT result_id, execution_id, step_index, step_id, step_type,
                   status, input_data, output_data, error_message, error_details,
                   started_at, completed_at
            FROM execution_step_results
            WHERE execution_id = $1
            ORDER BY step_index ASC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(ExecutionStoreError::Database)?;

        let execution = header
            .try_into()
            .map_err(|_| ExecutionStoreError::Database(sqlx::Error::RowNotFound))?;
        let steps = steps
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ExecutionStoreError::Database(sqlx::Error::RowNotFound))?;

        Ok(Some(ExecutionRecord { execution, steps }))
    }

    async fn list_by_workflow(
        &self,
        namespace: &str,
        workflow_id: &str,
        filter: &ExecutionFilter,
        pagination: &Pagination,
    ) -> Result<Page<ExecutionSummary>, ExecutionStoreError> {
        let total = self.count_by_workflow(namespace, workflow_id, filter).await?;

        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT e.execution_id, e.status, e.version, e.started_at, e.completed_at,
                   COUNT(s.result_id)                                        AS step_count,
                   COUNT(s.result_id) FILTER (WHERE s.status = 'COMPLETED')  AS completed_steps,
                   COUNT(s.result_id) FILTER (WHERE s.status = 'FAILED')     AS failed_steps
            FROM workflow_executions e
            LEFT JOIN execution_step_results s ON s.execution_id = e.execution_id
            WHERE e.namespace = $1 AND e.workflow_id = $2
              AND ($3::int IS NULL OR e.version = $3)
              AND ($4::text IS NULL OR e.status = $4)
            GROUP BY e.execution_id, e.status, e.version, e.started_at, e.completed_at
            ORDER BY e.started_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(namespace)
        .bind(workflow_id)
        .bind(filter.version)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(pagination.clamped_limit())
        .bind(pagination.offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(ExecutionStoreError::Database)?;

        let items = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ExecutionStoreError::Database(sqlx::Error::RowNotFound))?;

        Ok(Page::new(items, total, pagination))
    }

    async fn count_by_workflow(
        &self,
        namespace: &str,
        workflow_id: &str,
        filter: &ExecutionFilter,
    ) -> Result<i64, ExecutionStoreError> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM workflow_executions
            WHERE namespace = $1 AND workflow_id = $2
              AND ($3::int IS NULL OR version = $3)
              AND ($4::text IS NULL OR status = $4)
            "#,
        )
        .bind(namespace)
        .bind(workflow_id)
        .bind(filter.version)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(ExecutionStoreError::Database)
    }

    async fn find_stale_running(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ExecutionId>, ExecutionStoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT execution_id FROM workflow_executions
            WHERE status = 'RUNNING' AND last_updated_at < $1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(ExecutionStoreError::Database)?;

        Ok(ids.into_iter().filter_map(|id| id.parse().ok()).collect())
    }
}

// =============================================================================
// Internal row types for SQLx mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    execution_id: String,
    namespace: String,
    workflow_id: String,
    version: i32,
    input_parameters: Json<serde_json::Map<String, serde_json::Value>>,
    status: String,
    error_message: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    last_updated_at: DateTime<Utc>,
}

impl TryFrom<ExecutionRow> for WorkflowExecution {
    type Error = String;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            execution_id: row.execution_id.parse().map_err(|e| format!("{e:?}"))?,
            revision_id: WorkflowRevisionId {
                namespace: row.namespace,
                workflow_id: row.workflow_id,
                version: row.version,
            },
            input_parameters: row.input_parameters.0,
            status: row.status.parse()?,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            last_updated_at: row.last_updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StepResultRow {
    result_id: uuid::Uuid,
    execution_id: String,
    step_index: i32,
    step_id: String,
    step_type: String,
    status: String,
    input_data: Json<serde_json::Value>,
    output_data: Option<Json<serde_json::Value>>,
    error_message: Option<String>,
    error_details: Option<Json<ErrorDetails>>,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl TryFrom<StepResultRow> for ExecutionStepResult {
    type Error = String;

    fn try_from(row: StepResultRow) -> Result<Self, Self::Error> {
        Ok(Self {
            result_id: row.result_id,
            execution_id: row.execution_id.parse().map_err(|e| format!("{e:?}"))?,
            step_index: row.step_index,
            step_id: row.step_id,
            step_type: row.step_type.parse::<StepType>()?,
            status: row.status.parse::<StepResultStatus>()?,
            input_data: row.input_data.0,
            output_data: row.output_data.map(|json| json.0),
            error_message: row.error_message,
            error_details: row.error_details.map(|json| json.0),
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    execution_id: String,
    status: String,
    version: i32,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    step_count: i64,
    completed_steps: i64,
    failed_steps: i64,
}

impl TryFrom<SummaryRow> for ExecutionSummary {
    type Error = String;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            execution_id: row.execution_id.parse().map_err(|e| format!("{e:?}"))?,
            status: row.status.parse()?,
            revision_version: row.version,
            started_at: row.started_at,
            completed_at: row.completed_at,
            step_count: row.step_count,
            completed_steps: row.completed_steps,
            failed_steps: row.failed_steps,
        })
    }
}

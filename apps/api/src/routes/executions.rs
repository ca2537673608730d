//! Execution endpoints
//!
//! POST runs a revision synchronously and returns its terminal header; a
//! FAILED execution is still a successful request (the failure lives in the
//! record). Execution ids are shape-checked before any storage lookup.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use maestro_db::{ExecutionFilter, ExecutionSummary, Pagination};
use maestro_domain::{
    ErrorDetails, ExecutionId, ExecutionStatus, ExecutionStepResult, StepResultStatus, StepType,
    WorkflowExecution, WorkflowRevisionId,
};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to execute a workflow revision
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExecutionRequest {
    pub namespace: String,
    pub id: String,
    pub version: i32,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Execution header response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub revision_id: WorkflowRevisionId,
    pub input_parameters: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(rename = "_links")]
    pub links: Value,
}

impl From<WorkflowExecution> for ExecutionResponse {
    fn from(execution: WorkflowExecution) -> Self {
        let links = execution_links(&execution);
        Self {
            execution_id: execution.execution_id.to_string(),
            status: execution.status,
            revision_id: execution.revision_id,
            input_parameters: execution.input_parameters,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            error_message: execution.error_message,
            links,
        }
    }
}

/// Execution header plus its ordered step results
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDetailResponse {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub revision_id: WorkflowRevisionId,
    pub input_parameters: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub steps: Vec<StepResultResponse>,
    #[serde(rename = "_links")]
    pub links: Value,
}

/// One step result in an execution detail response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResultResponse {
    pub result_id: String,
    pub step_index: i32,
    pub step_id: String,
    pub step_type: StepType,
    pub status: StepResultStatus,
    pub input_data: Value,
    pub output_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl From<ExecutionStepResult> for StepResultResponse {
    fn from(step: ExecutionStepResult) -> Self {
        Self {
            result_id: step.result_id.to_string(),
            step_index: step.step_index,
            step_id: step.step_id,
            step_type: step.step_type,
            status: step.status,
            input_data: step.input_data,
            output_data: step.output_data,
            error_message: step.error_message,
            error_details: step.error_details,
            started_at: step.started_at,
            completed_at: step.completed_at,
        }
    }
}

/// Query parameters for execution history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub version: Option<i32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// Execution history response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub executions: Vec<ExecutionSummary>,
    pub pagination: PaginationInfo,
    #[serde(rename = "_links")]
    pub links: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Execute a workflow revision synchronously
async fn start_execution(
    State(state): State<AppState>,
    payload: Result<Json<StartExecutionRequest>, JsonRejection>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let revision_id = WorkflowRevisionId::new(&request.namespace, &request.id, request.version)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let execution = state
        .coordinator
        .execute(&revision_id, &request.parameters)
        .await?;

    Ok(Json(ExecutionResponse::from(execution)))
}

/// Fetch an execution with its ordered step results
async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionDetailResponse>, ApiError> {
    // Malformed ids are rejected before any storage lookup
    let id: ExecutionId = execution_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("malformed execution id '{execution_id}'")))?;

    let record = state
        .executions
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::ExecutionNotFound(execution_id))?;

    let links = execution_links(&record.execution);
    Ok(Json(ExecutionDetailResponse {
        execution_id: record.execution.execution_id.to_string(),
        status: record.execution.status,
        revision_id: record.execution.revision_id,
        input_parameters: record.execution.input_parameters,
        started_at: record.execution.started_at,
        completed_at: record.execution.completed_at,
        error_message: record.execution.error_message,
        steps: record
            .steps
            .into_iter()
            .map(StepResultResponse::from)
            .collect(),
        links,
    }))
}

/// Execution history for a workflow, newest first
pub async fn list_workflow_executions(
    State(state): State<AppState>,
    Path((namespace, workflow_id)): Path<(String, String)>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    // The workflow must exist at all
    let revisions = state.revisions.list(&namespace, &workflow_id, false).await?;
    if revisions.is_empty() {
        return Err(ApiError::WorkflowNotFound(format!(
            "{namespace}/{workflow_id}"
        )));
    }

    let status = query
        .status
        .as_deref()
        .map(str::parse::<ExecutionStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let filter = ExecutionFilter {
        version: query.version,
        status,
    };
    let pagination = Pagination::from_query(query.limit, query.offset);

    let page = state
        .executions
        .list_by_workflow(&namespace, &workflow_id, &filter, &pagination)
        .await?;

    let has_more = page.has_more();
    Ok(Json(HistoryResponse {
        pagination: PaginationInfo {
            total: page.total,
            limit: page.limit,
            offset: page.offset,
            has_more,
        },
        executions: page.items,
        links: json!({
            "self": {"href": format!("/api/workflows/{namespace}/{workflow_id}/executions")},
            "workflow": {"href": format!("/api/workflows/{namespace}/{workflow_id}")},
        }),
    }))
}

fn execution_links(execution: &WorkflowExecution) -> Value {
    let revision = &execution.revision_id;
    json!({
        "self": {"href": format!("/api/executions/{}", execution.execution_id)},
        "workflow": {
            "href": format!(
                "/api/workflows/{}/{}/{}",
                revision.namespace, revision.workflow_id, revision.version
            )
        },
    })
}

// =============================================================================
// Router
// =============================================================================

/// Build execution routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(start_execution))
        .route("/{execution_id}", get(get_execution))
}

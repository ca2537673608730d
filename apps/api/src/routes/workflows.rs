//! Workflow revision endpoints
//!
//! Revision documents are submitted and read back as verbatim YAML;
//! structural responses (create/update/list results) are JSON. Mutating
//! operations use optimistic locking: update carries `updatedAt` in the
//! body, activate/deactivate carry it in the `X-Current-Updated-At` header.

use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use maestro_db::{NewRevision, RevisionUpdate};
use maestro_domain::{ParameterDefinition, WorkflowRevision, WorkflowRevisionId};
use maestro_engine::{parse_revision, ParsedRevision};

use super::executions::list_workflow_executions;
use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the optimistic-lock timestamp for state toggles
pub const CURRENT_UPDATED_AT_HEADER: &str = "x-current-updated-at";

// =============================================================================
// Request/Response Types
// =============================================================================

/// Structural view of a revision for JSON responses
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionResponse {
    pub namespace: String,
    pub id: String,
    pub version: i32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Vec<ParameterDefinition>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WorkflowRevision> for RevisionResponse {
    fn from(revision: WorkflowRevision) -> Self {
        Self {
            namespace: revision.id.namespace,
            id: revision.id.workflow_id,
            version: revision.id.version,
            name: revision.name,
            description: revision.description,
            parameters: revision.parameters,
            active: revision.active,
            created_at: revision.created_at,
            updated_at: revision.updated_at,
        }
    }
}

/// Body of a revision update: the replacement document plus the
/// optimistic-lock timestamp the caller read
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRevisionRequest {
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub active: Option<bool>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create version 1 of a new workflow from a YAML document
async fn create_workflow(
    State(state): State<AppState>,
    source: String,
) -> Result<Response, ApiError> {
    let parsed = parse_revision(&source)?;
    let created = state
        .revisions
        .create_initial(&new_revision(parsed, source))
        .await?;

    let location = format!(
        "/api/workflows/{}/{}/{}",
        created.id.namespace, created.id.workflow_id, created.id.version
    );
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(RevisionResponse::from(created)),
    )
        .into_response())
}

/// Create the next version under an existing workflow
async fn create_next_revision(
    State(state): State<AppState>,
    Path((namespace, workflow_id)): Path<(String, String)>,
    source: String,
) -> Result<Response, ApiError> {
    let parsed = parse_revision(&source)?;
    check_identity_match(&parsed, &namespace, &workflow_id)?;

    let created = state
        .revisions
        .create_next(&new_revision(parsed, source))
        .await?;

    let location = format!(
        "/api/workflows/{}/{}/{}",
        created.id.namespace, created.id.workflow_id, created.id.version
    );
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(RevisionResponse::from(created)),
    )
        .into_response())
}

/// List revisions of a workflow, optionally only the active ones
async fn list_revisions(
    State(state): State<AppState>,
    Path((namespace, workflow_id)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RevisionResponse>>, ApiError> {
    let active_only = query.active.unwrap_or(false);
    let revisions = state
        .revisions
        .list(&namespace, &workflow_id, active_only)
        .await?;

    if revisions.is_empty() && active_only {
        return Err(ApiError::RevisionNotFound(format!(
            "{namespace}/{workflow_id} has no active revisions"
        )));
    }

    Ok(Json(
        revisions.into_iter().map(RevisionResponse::from).collect(),
    ))
}

/// Fetch a single revision as its verbatim YAML document
async fn get_revision(
    State(state): State<AppState>,
    Path((namespace, workflow_id, version)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let id = revision_id(&namespace, &workflow_id, &version)?;
    let found = state
        .revisions
        .find_by_id_with_source(&id)
        .await?
        .ok_or_else(|| ApiError::RevisionNotFound(id.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "application/yaml")],
        found.source,
    )
        .into_response())
}

/// Replace the content of an inactive revision
async fn update_revision(
    State(state): State<AppState>,
    Path((namespace, workflow_id, version)): Path<(String, String, String)>,
    payload: Result<Json<UpdateRevisionRequest>, JsonRejection>,
) -> Result<Json<RevisionResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let id = revision_id(&namespace, &workflow_id, &version)?;
    let parsed = parse_revision(&request.source)?;
    check_identity_match(&parsed, &namespace, &workflow_id)?;

    let update = RevisionUpdate {
        name: parsed.name,
        description: parsed.description,
        parameters: parsed.parameters,
        root_step: parsed.root_step,
        source: request.source,
    };

    let updated = state
        .revisions
        .update(&id, &update, request.updated_at)
        .await?;
    Ok(Json(RevisionResponse::from(updated)))
}

/// Mark a revision active
async fn activate_revision(
    State(state): State<AppState>,
    Path((namespace, workflow_id, version)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<RevisionResponse>, ApiError> {
    set_active(&state, &namespace, &workflow_id, &version, &headers, true).await
}

/// Mark a revision inactive
async fn deactivate_revision(
    State(state): State<AppState>,
    Path((namespace, workflow_id, version)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<RevisionResponse>, ApiError> {
    set_active(&state, &namespace, &workflow_id, &version, &headers, false).await
}

async fn set_active(
    state: &AppState,
    namespace: &str,
    workflow_id: &str,
    version: &str,
    headers: &HeaderMap,
    desired: bool,
) -> Result<Json<RevisionResponse>, ApiError> {
    let id = revision_id(namespace, workflow_id, version)?;
    let expected_updated_at = current_updated_at(headers)?;

    let updated = state
        .revisions
        .set_active(&id, desired, expected_updated_at)
        .await?;
    Ok(Json(RevisionResponse::from(updated)))
}

/// Delete an inactive revision
async fn delete_revision(
    State(state): State<AppState>,
    Path((namespace, workflow_id, version)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let id = revision_id(&namespace, &workflow_id, &version)?;
    state.revisions.delete_revision(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a workflow and all of its revisions; idempotent when absent
async fn delete_workflow(
    State(state): State<AppState>,
    Path((namespace, workflow_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .revisions
        .delete_workflow(&namespace, &workflow_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Helpers
// =============================================================================

fn new_revision(parsed: ParsedRevision, source: String) -> NewRevision {
    NewRevision {
        namespace: parsed.namespace,
        workflow_id: parsed.workflow_id,
        name: parsed.name,
        description: parsed.description,
        parameters: parsed.parameters,
        root_step: parsed.root_step,
        source,
    }
}

fn revision_id(
    namespace: &str,
    workflow_id: &str,
    version: &str,
) -> Result<WorkflowRevisionId, ApiError> {
    let version: i32 = version
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid revision version '{version}'")))?;
    WorkflowRevisionId::new(namespace, workflow_id, version)
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// The document's identity must agree with the URL it was submitted under.
fn check_identity_match(
    parsed: &ParsedRevision,
    namespace: &str,
    workflow_id: &str,
) -> Result<(), ApiError> {
    if parsed.namespace != namespace {
        return Err(ApiError::InvalidRevision {
            detail: format!(
                "document namespace '{}' does not match URL namespace '{namespace}'",
                parsed.namespace
            ),
            field: Some("namespace".to_string()),
            rejected_value: Some(parsed.namespace.clone()),
        });
    }
    if parsed.workflow_id != workflow_id {
        return Err(ApiError::InvalidRevision {
            detail: format!(
                "document id '{}' does not match URL id '{workflow_id}'",
                parsed.workflow_id
            ),
            field: Some("id".to_string()),
            rejected_value: Some(parsed.workflow_id.clone()),
        });
    }
    Ok(())
}

fn current_updated_at(headers: &HeaderMap) -> Result<DateTime<Utc>, ApiError> {
    let raw = headers
        .get(CURRENT_UPDATED_AT_HEADER)
        .ok_or_else(|| {
            ApiError::BadRequest(format!("missing {CURRENT_UPDATED_AT_HEADER} header"))
        })?
        .to_str()
        .map_err(|_| {
            ApiError::BadRequest(format!("invalid {CURRENT_UPDATED_AT_HEADER} header"))
        })?;

    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| {
            ApiError::BadRequest(format!(
                "invalid {CURRENT_UPDATED_AT_HEADER} header: expected an RFC 3339 timestamp"
            ))
        })
}

// =============================================================================
// Router
// =============================================================================

/// Build workflow revision routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_workflow))
        .route(
            "/{namespace}/{workflow_id}",
            post(create_next_revision)
                .get(list_revisions)
                .delete(delete_workflow),
        )
        .route(
            "/{namespace}/{workflow_id}/executions",
            get(list_workflow_executions),
        )
        .route(
            "/{namespace}/{workflow_id}/{version}",
            get(get_revision)
                .put(update_revision)
                .delete(delete_revision),
        )
        .route(
            "/{namespace}/{workflow_id}/{version}/activate",
            post(activate_revision),
        )
        .route(
            "/{namespace}/{workflow_id}/{version}/deactivate",
            post(deactivate_revision),
        )
}

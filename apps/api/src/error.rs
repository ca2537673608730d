//! API error handling (RFC 7807 problem+json)
//!
//! Every domain, engine, and repository error funnels into `ApiError`,
//! which renders as an `application/problem+json` body with `type`, `title`,
//! `status`, and `detail`, plus extension members where the problem type
//! calls for them (`invalidParams` for parameter validation, `field` and
//! `rejectedValue` for model validation).

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use maestro_db::{
    CreateRevisionError, DeleteRevisionError, ExecutionStoreError, RevisionStoreError,
    UpdateRevisionError,
};
use maestro_engine::{ExecuteError, ParamError, ParseError};

/// Content type of every error response
pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("workflow revision not found: {0}")]
    RevisionNotFound(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("invalid workflow revision: {detail}")]
    InvalidRevision {
        detail: String,
        field: Option<String>,
        rejected_value: Option<String>,
    },

    #[error("workflow validation failed: {0}")]
    ValidationFailed(String),

    #[error("workflow already exists: {0}")]
    AlreadyExists(String),

    #[error("active revision conflict: {0}")]
    ActiveRevisionConflict(String),

    #[error("optimistic lock conflict: expected updatedAt {expected}, stored updatedAt {actual}")]
    OptimisticLockConflict { expected: String, actual: String },

    #[error("parameter validation failed")]
    ParameterValidation(Vec<ParamError>),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

/// RFC 7807 body with Maestro's extension members
#[derive(Serialize)]
struct Problem {
    #[serde(rename = "type")]
    type_uri: String,
    title: String,
    status: u16,
    detail: String,
    #[serde(rename = "invalidParams", skip_serializing_if = "Option::is_none")]
    invalid_params: Option<Vec<ParamError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(rename = "rejectedValue", skip_serializing_if = "Option::is_none")]
    rejected_value: Option<String>,
}

impl ApiError {
    fn slug(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            Self::WorkflowNotFound(_) => {
                (StatusCode::NOT_FOUND, "workflow-not-found", "Workflow not found")
            }
            Self::RevisionNotFound(_) => (
                StatusCode::NOT_FOUND,
                "workflow-revision-not-found",
                "Workflow revision not found",
            ),
            Self::ExecutionNotFound(_) => (
                StatusCode::NOT_FOUND,
                "execution-not-found",
                "Execution not found",
            ),
            Self::InvalidRevision { .. } => (
                StatusCode::BAD_REQUEST,
                "invalid-workflow-revision",
                "Invalid workflow revision",
            ),
            Self::ValidationFailed(_) => (
                StatusCode::BAD_REQUEST,
                "workflow-validation-failed",
                "Workflow validation failed",
            ),
            Self::AlreadyExists(_) => (
                StatusCode::CONFLICT,
                "workflow-already-exists",
                "Workflow already exists",
            ),
            Self::ActiveRevisionConflict(_) => (
                StatusCode::CONFLICT,
                "active-revision-conflict",
                "Active revision conflict",
            ),
            Self::OptimisticLockConflict { .. } => (
                StatusCode::CONFLICT,
                "optimistic-lock-conflict",
                "Optimistic lock conflict",
            ),
            Self::ParameterValidation(_) => (
                StatusCode::BAD_REQUEST,
                "workflow-parameter-validation-error",
                "Workflow parameter validation error",
            ),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad-request", "Bad request"),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal-server-error",
                "Internal server error",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, slug, title) = self.slug();

        // Internal faults never leak details to clients
        let detail = match &self {
            Self::Internal(detail) => {
                tracing::error!("internal error: {detail}");
                "an internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let (invalid_params, field, rejected_value) = match self {
            Self::ParameterValidation(errors) => (Some(errors), None, None),
            Self::InvalidRevision {
                field,
                rejected_value,
                ..
            } => (None, field, rejected_value),
            _ => (None, None, None),
        };

        let body = Problem {
            type_uri: format!("/problems/{slug}"),
            title: title.to_string(),
            status: status.as_u16(),
            detail,
            invalid_params,
            field,
            rejected_value,
        };

        (
            status,
            [(header::CONTENT_TYPE, PROBLEM_CONTENT_TYPE)],
            Json(body),
        )
            .into_response()
    }
}

// =============================================================================
// Conversions from lower layers
// =============================================================================

impl From<ParseError> for ApiError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Syntax(err) => Self::InvalidRevision {
                detail: err.to_string(),
                field: None,
                rejected_value: None,
            },
            ParseError::Model {
                field,
                message,
                rejected_value,
            } => Self::InvalidRevision {
                detail: format!("{field}: {message}"),
                field: Some(field),
                rejected_value,
            },
            ParseError::Validation(err) => Self::ValidationFailed(err.to_string()),
        }
    }
}

impl From<CreateRevisionError> for ApiError {
    fn from(e: CreateRevisionError) -> Self {
        match e {
            CreateRevisionError::AlreadyExists {
                namespace,
                workflow_id,
            } => Self::AlreadyExists(format!("{namespace}/{workflow_id}")),
            CreateRevisionError::WorkflowNotFound {
                namespace,
                workflow_id,
            } => Self::WorkflowNotFound(format!("{namespace}/{workflow_id}")),
            CreateRevisionError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<RevisionStoreError> for ApiError {
    fn from(e: RevisionStoreError) -> Self {
        match e {
            RevisionStoreError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<UpdateRevisionError> for ApiError {
    fn from(e: UpdateRevisionError) -> Self {
        match e {
            UpdateRevisionError::NotFound(id) => Self::RevisionNotFound(id.to_string()),
            UpdateRevisionError::ActiveRevisionConflict(id) => {
                Self::ActiveRevisionConflict(id.to_string())
            }
            UpdateRevisionError::OptimisticLockConflict { expected, actual } => {
                Self::OptimisticLockConflict {
                    expected: expected.to_rfc3339(),
                    actual: actual.to_rfc3339(),
                }
            }
            UpdateRevisionError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<DeleteRevisionError> for ApiError {
    fn from(e: DeleteRevisionError) -> Self {
        match e {
            DeleteRevisionError::NotFound(id) => Self::RevisionNotFound(id.to_string()),
            DeleteRevisionError::ActiveRevisionConflict(detail) => {
                Self::ActiveRevisionConflict(detail)
            }
            DeleteRevisionError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<ExecutionStoreError> for ApiError {
    fn from(e: ExecutionStoreError) -> Self {
        match e {
            ExecutionStoreError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<ExecuteError> for ApiError {
    fn from(e: ExecuteError) -> Self {
        match e {
            ExecuteError::WorkflowNotFound(id) => Self::WorkflowNotFound(id.to_string()),
            ExecuteError::ParameterValidationFailed(errors) => Self::ParameterValidation(errors),
            ExecuteError::Storage(detail) => Self::Internal(detail),
        }
    }
}

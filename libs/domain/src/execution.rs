//! Workflow execution records
//!
//! An execution is a header row plus an append-only stream of step results.
//! Headers move `RUNNING -> {COMPLETED, FAILED}` and terminal states are
//! sticky; step results are immutable once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::ids::{ExecutionId, WorkflowRevisionId};
use crate::step::StepType;

/// Lifecycle state of an execution header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Reserved; never assigned in v1
    Cancelled,
}

impl ExecutionStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Outcome of a single visited (or skipped) step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepResultStatus {
    Completed,
    Failed,
    Skipped,
}

impl StepResultStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for StepResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepResultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "SKIPPED" => Ok(Self::Skipped),
            other => Err(format!("unknown step result status: {other}")),
        }
    }
}

/// Execution header
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub execution_id: ExecutionId,

    /// The exact revision executed; immutable for the lifetime of the record
    pub revision_id: WorkflowRevisionId,

    /// Parameters after validation and default application
    pub input_parameters: Map<String, Value>,

    pub status: ExecutionStatus,

    /// Present iff `status` is FAILED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub started_at: DateTime<Utc>,

    /// Set iff `status` is terminal; always >= `started_at`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub last_updated_at: DateTime<Utc>,
}

/// Failure payload captured on a FAILED step result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    /// Type name of the raised error (e.g. "UnknownWorkKind")
    pub error_type: String,

    pub stack_trace: Option<String>,

    /// Inputs visible to the step when it failed
    pub step_inputs: Value,
}

/// One record of the append-only per-execution step result stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStepResult {
    pub result_id: Uuid,
    pub execution_id: ExecutionId,

    /// 0-based, contiguous within the execution
    pub step_index: i32,

    pub step_id: String,
    pub step_type: StepType,
    pub status: StepResultStatus,

    /// Snapshot of parameters and upstream outputs at step entry
    pub input_data: Value,

    /// Step return value; non-null only when `status` is COMPLETED
    pub output_data: Option<Value>,

    /// Present iff `status` is FAILED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Present iff `status` is FAILED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_value(ExecutionStatus::Completed).unwrap();
        assert_eq!(json, serde_json::json!("COMPLETED"));
        let json = serde_json::to_value(StepResultStatus::Skipped).unwrap();
        assert_eq!(json, serde_json::json!("SKIPPED"));
    }

    #[test]
    fn test_status_round_trip() {
        for status in ["PENDING", "RUNNING", "COMPLETED", "FAILED", "CANCELLED"] {
            let parsed: ExecutionStatus = status.parse().unwrap();
            assert_eq!(parsed.as_str(), status);
        }
        assert!("running".parse::<ExecutionStatus>().is_err());
    }
}

//! Identity types for workflow revisions and executions.
//!
//! `WorkflowRevisionId` is a validated `(namespace, workflowId, version)`
//! triple; `ExecutionId` is a 21-character NanoID token. Both serialize
//! through serde and parse with strict shape checks so malformed identifiers
//! are rejected before any storage lookup.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of `namespace` and `workflowId`
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// Length of an execution identifier
pub const EXECUTION_ID_LEN: usize = 21;

/// Errors that can occur when building a revision identity
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RevisionIdError {
    #[error("{field} must be 1-100 characters matching [A-Za-z0-9_-]+, got '{value}'")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("version must be >= 1, got {0}")]
    InvalidVersion(i32),
}

/// Check a namespace or workflow id against the `[A-Za-z0-9_-]+` shape.
fn valid_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_IDENTIFIER_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Validate a single identifier segment, naming the offending field.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), RevisionIdError> {
    if valid_identifier(value) {
        Ok(())
    } else {
        Err(RevisionIdError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}

/// Identity of a specific workflow revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRevisionId {
    pub namespace: String,
    #[serde(rename = "id")]
    pub workflow_id: String,
    pub version: i32,
}

impl WorkflowRevisionId {
    /// Build a validated revision identity.
    pub fn new(
        namespace: impl Into<String>,
        workflow_id: impl Into<String>,
        version: i32,
    ) -> Result<Self, RevisionIdError> {
        let namespace = namespace.into();
        let workflow_id = workflow_id.into();
        validate_identifier("namespace", &namespace)?;
        validate_identifier("id", &workflow_id)?;
        if version < 1 {
            return Err(RevisionIdError::InvalidVersion(version));
        }
        Ok(Self {
            namespace,
            workflow_id,
            version,
        })
    }
}

impl Display for WorkflowRevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/v{}", self.namespace, self.workflow_id, self.version)
    }
}

/// Errors that can occur when parsing an execution identifier
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionIdError {
    #[error("execution id must be exactly 21 URL-safe characters [A-Za-z0-9_-], got '{0}'")]
    InvalidShape(String),
}

/// Opaque 21-character URL-safe execution identifier (NanoID alphabet)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Generate a fresh identifier from a CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        Self(nanoid::nanoid!())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExecutionId {
    type Err = ExecutionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let shape_ok = s.len() == EXECUTION_ID_LEN
            && s.bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if shape_ok {
            Ok(Self(s.to_string()))
        } else {
            Err(ExecutionIdError::InvalidShape(s.to_string()))
        }
    }
}

impl Serialize for ExecutionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ExecutionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_id_valid() {
        let id = WorkflowRevisionId::new("test-ns", "wf_1", 3).unwrap();
        assert_eq!(id.to_string(), "test-ns/wf_1/v3");
    }

    #[test]
    fn test_revision_id_rejects_bad_identifiers() {
        assert!(WorkflowRevisionId::new("", "wf", 1).is_err());
        assert!(WorkflowRevisionId::new("has space", "wf", 1).is_err());
        assert!(WorkflowRevisionId::new("ns", "wf/slash", 1).is_err());
        assert!(WorkflowRevisionId::new("x".repeat(101), "wf", 1).is_err());
    }

    #[test]
    fn test_revision_id_rejects_version_below_one() {
        assert_eq!(
            WorkflowRevisionId::new("ns", "wf", 0),
            Err(RevisionIdError::InvalidVersion(0))
        );
    }

    #[test]
    fn test_revision_id_json_shape() {
        let id = WorkflowRevisionId::new("ns", "wf", 2).unwrap();
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"namespace": "ns", "id": "wf", "version": 2})
        );
    }

    #[test]
    fn test_execution_id_generate_shape() {
        let id = ExecutionId::generate();
        assert_eq!(id.as_str().len(), EXECUTION_ID_LEN);
        assert!(id
            .as_str()
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-'));
    }

    #[test]
    fn test_execution_id_generate_unique() {
        let a = ExecutionId::generate();
        let b = ExecutionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_execution_id_parse_rejects_bad_shapes() {
        assert!("too-short".parse::<ExecutionId>().is_err());
        assert!("x".repeat(22).parse::<ExecutionId>().is_err());
        assert!("abcdefghij!lmnopqrstu".parse::<ExecutionId>().is_err());
        assert!("V1StGXR8_Z5jdHi6B-myT".parse::<ExecutionId>().is_ok());
    }
}

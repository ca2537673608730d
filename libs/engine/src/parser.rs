//! Declarative workflow document parser
//!
//! Parses the YAML workflow document into a revision ready for storage.
//! Parsing happens in two passes: serde deserialization into the document
//! shape, then a semantic validation pass over identity fields, parameter
//! schema, and step tree.

use serde::Deserialize;
use thiserror::Error;

use maestro_domain::{
    ids::validate_identifier,
    revision::{MAX_DESCRIPTION_LEN, MAX_NAME_LEN},
    step::MAX_NESTING_DEPTH,
    ParameterDefinition, Step,
};

// =============================================================================
// Errors
// =============================================================================

/// Semantic validation failure with an optional document location
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub location: Option<String>,
}

impl ValidationError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Errors that can occur while parsing a workflow document
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not well-formed YAML for the expected shape
    #[error("invalid workflow document: {0}")]
    Syntax(#[from] serde_yml::Error),

    /// An identity or metadata field violates the model constraints
    #[error("invalid {field}: {message}")]
    Model {
        field: String,
        message: String,
        rejected_value: Option<String>,
    },

    /// The document is well-formed but semantically invalid
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ParseError {
    fn model(
        field: impl Into<String>,
        message: impl Into<String>,
        rejected_value: Option<String>,
    ) -> Self {
        Self::Model {
            field: field.into(),
            message: message.into(),
            rejected_value,
        }
    }
}

// =============================================================================
// Document Shape
// =============================================================================

/// Root of the declarative workflow document
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkflowDocument {
    namespace: String,
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Vec<ParameterDefinition>,
    root: Step,
}

/// A parsed revision, before the store assigns its version
#[derive(Debug, Clone)]
pub struct ParsedRevision {
    pub namespace: String,
    pub workflow_id: String,
    pub name: String,
    pub description: Option<String>,
    pub parameters: Vec<ParameterDefinition>,
    pub root_step: Step,
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse and validate a workflow document.
pub fn parse_revision(source: &str) -> Result<ParsedRevision, ParseError> {
    let doc: WorkflowDocument = serde_yml::from_str(source)?;

    validate_identifier("namespace", &doc.namespace)
        .map_err(|e| ParseError::model("namespace", e.to_string(), Some(doc.namespace.clone())))?;
    validate_identifier("id", &doc.id)
        .map_err(|e| ParseError::model("id", e.to_string(), Some(doc.id.clone())))?;

    if doc.name.trim().is_empty() {
        return Err(ParseError::model("name", "must not be blank", None));
    }
    if doc.name.len() > MAX_NAME_LEN {
        return Err(ParseError::model(
            "name",
            format!("must be at most {MAX_NAME_LEN} characters"),
            Some(doc.name.clone()),
        ));
    }
    if let Some(description) = &doc.description {
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(ParseError::model(
                "description",
                format!("must be at most {MAX_DESCRIPTION_LEN} characters"),
                None,
            ));
        }
    }

    validate_parameters(&doc.parameters)?;
    validate_step_tree(&doc.root)?;

    Ok(ParsedRevision {
        namespace: doc.namespace,
        workflow_id: doc.id,
        name: doc.name,
        description: doc.description,
        parameters: doc.parameters,
        root_step: doc.root,
    })
}

// =============================================================================
// Semantic Validation
// =============================================================================

fn validate_parameters(parameters: &[ParameterDefinition]) -> Result<(), ValidationError> {
    let mut seen = std::collections::HashSet::new();

    for (idx, def) in parameters.iter().enumerate() {
        let location = format!("parameters[{idx}]");

        if def.name.trim().is_empty() {
            return Err(
                ValidationError::new("parameter name must not be blank").with_location(location)
            );
        }
        if !seen.insert(def.name.as_str()) {
            return Err(
                ValidationError::new(format!("duplicate parameter name '{}'", def.name))
                    .with_location(location),
            );
        }
        if let Some(default) = &def.default {
            if !def.parameter_type.matches(default) {
                return Err(ValidationError::new(format!(
                    "default for '{}' does not match declared type {}",
                    def.name, def.parameter_type
                ))
                .with_location(location));
            }
        }
    }
    Ok(())
}

fn validate_step_tree(root: &Step) -> Result<(), ValidationError> {
    if root.depth() > MAX_NESTING_DEPTH {
        return Err(ValidationError::new(format!(
            "step tree exceeds maximum nesting depth of {MAX_NESTING_DEPTH}"
        ))
        .with_location("root"));
    }

    let mut explicit_ids = std::collections::HashSet::new();
    check_step_ids(root, &mut explicit_ids)
}

/// Explicit step ids must be non-blank and unique within the tree.
///
/// Collisions between an explicit `step-N` id and a later synthesized one
/// are not detected; step indices keep persisted results unambiguous.
fn check_step_ids<'a>(
    node: &'a Step,
    seen: &mut std::collections::HashSet<&'a str>,
) -> Result<(), ValidationError> {
    if let Some(id) = node.step_id() {
        if id.trim().is_empty() {
            return Err(ValidationError::new("step_id must not be blank"));
        }
        if !seen.insert(id) {
            return Err(ValidationError::new(format!("duplicate step_id '{id}'")));
        }
    }

    match node {
        Step::Sequence { children, .. } => {
            for child in children {
                check_step_ids(child, seen)?;
            }
        }
        Step::If {
            then, otherwise, ..
        } => {
            for child in then.iter().chain(otherwise) {
                check_step_ids(child, seen)?;
            }
        }
        Step::Log { .. } | Step::Work { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_domain::{ParameterType, StepType};

    const DOC: &str = r#"
namespace: test-ns
id: wf
name: Demo workflow
description: Greets and echoes
parameters:
  - name: userName
    type: string
    required: true
  - name: enableDebug
    type: boolean
    default: false
root:
  type: sequence
  children:
    - type: log
      message: "Hi {userName}"
    - type: if
      condition: params.enableDebug
      then:
        - type: work
          step_id: dump
          kind: echo
          config:
            verbose: true
"#;

    #[test]
    fn test_parse_full_document() {
        let parsed = parse_revision(DOC).unwrap();

        assert_eq!(parsed.namespace, "test-ns");
        assert_eq!(parsed.workflow_id, "wf");
        assert_eq!(parsed.name, "Demo workflow");
        assert_eq!(parsed.parameters.len(), 2);
        assert_eq!(parsed.parameters[0].parameter_type, ParameterType::String);
        assert_eq!(parsed.root_step.step_type(), StepType::Sequence);
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        assert!(matches!(
            parse_revision("root: [unclosed"),
            Err(ParseError::Syntax(_))
        ));
    }

    #[test]
    fn test_rejects_bad_namespace() {
        let doc = DOC.replace("namespace: test-ns", "namespace: 'bad ns'");
        assert!(matches!(
            parse_revision(&doc),
            Err(ParseError::Model { field, .. }) if field == "namespace"
        ));
    }

    #[test]
    fn test_rejects_blank_name() {
        let doc = DOC.replace("name: Demo workflow", "name: '  '");
        assert!(matches!(
            parse_revision(&doc),
            Err(ParseError::Model { field, .. }) if field == "name"
        ));
    }

    #[test]
    fn test_rejects_duplicate_parameter_names() {
        let doc = r#"
namespace: ns
id: wf
name: n
parameters:
  - name: a
    type: string
  - name: a
    type: integer
root:
  type: log
  message: m
"#;
        match parse_revision(doc) {
            Err(ParseError::Validation(e)) => assert!(e.message.contains("duplicate parameter")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_default_type_mismatch() {
        let doc = r#"
namespace: ns
id: wf
name: n
parameters:
  - name: count
    type: integer
    default: "three"
root:
  type: log
  message: m
"#;
        match parse_revision(doc) {
            Err(ParseError::Validation(e)) => {
                assert!(e.message.contains("does not match declared type"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_duplicate_step_ids() {
        let doc = r#"
namespace: ns
id: wf
name: n
root:
  type: sequence
  children:
    - type: log
      step_id: same
      message: a
    - type: log
      step_id: same
      message: b
"#;
        match parse_revision(doc) {
            Err(ParseError::Validation(e)) => assert!(e.message.contains("duplicate step_id")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_excessive_nesting() {
        let mut node = serde_json::json!({"type": "log", "message": "deep"});
        for _ in 0..MAX_NESTING_DEPTH {
            node = serde_json::json!({"type": "sequence", "children": [node]});
        }
        let doc = serde_json::json!({
            "namespace": "ns",
            "id": "wf",
            "name": "n",
            "root": node,
        });
        let yaml = serde_yml::to_string(&doc).unwrap();

        match parse_revision(&yaml) {
            Err(ParseError::Validation(e)) => assert!(e.message.contains("nesting depth")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_top_level_fields() {
        let doc = format!("{DOC}\nbogus: true");
        assert!(matches!(parse_revision(&doc), Err(ParseError::Syntax(_))));
    }
}

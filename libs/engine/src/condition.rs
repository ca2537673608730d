//! Condition evaluation for `if` steps
//!
//! The v1 dialect is deliberately minimal: the literals `true` and `false`,
//! and `params.<name>` referencing a BOOLEAN input parameter. Anything else
//! is an evaluation error, never a silent `false`.

use thiserror::Error;

use crate::context::ExecutionContext;

/// Errors that can occur during condition evaluation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("condition references unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("condition parameter '{0}' is not a boolean")]
    NotBoolean(String),

    #[error("unrecognized condition expression: '{0}'")]
    Unrecognized(String),
}

/// Evaluate a condition expression against the current context.
pub fn evaluate(expression: &str, ctx: &ExecutionContext) -> Result<bool, ConditionError> {
    match expression.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => match other.strip_prefix("params.") {
            Some(name) if !name.is_empty() => match ctx.parameter(name) {
                Some(serde_json::Value::Bool(b)) => Ok(*b),
                Some(_) => Err(ConditionError::NotBoolean(name.to_string())),
                None => Err(ConditionError::UnknownParameter(name.to_string())),
            },
            _ => Err(ConditionError::Unrecognized(other.to_string())),
        },
    }
}

//! Immutable execution context
//!
//! A context is the bundle of validated input parameters plus the outputs
//! accumulated from upstream work steps. Contexts are values: adding an
//! output returns a fresh instance, so a context handed to a step can never
//! be mutated behind its back.

use serde_json::{json, Map, Value};

/// Parameters and upstream outputs visible to a step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    input_parameters: Map<String, Value>,
    step_outputs: Map<String, Value>,
}

impl ExecutionContext {
    /// Build the initial context from validated input parameters.
    #[must_use]
    pub fn new(input_parameters: Map<String, Value>) -> Self {
        Self {
            input_parameters,
            step_outputs: Map::new(),
        }
    }

    #[must_use]
    pub fn input_parameters(&self) -> &Map<String, Value> {
        &self.input_parameters
    }

    #[must_use]
    pub fn step_outputs(&self) -> &Map<String, Value> {
        &self.step_outputs
    }

    /// Look up an input parameter by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.input_parameters.get(name)
    }

    /// Look up the output of an upstream step.
    #[must_use]
    pub fn step_output(&self, step_id: &str) -> Option<&Value> {
        self.step_outputs.get(step_id)
    }

    /// Return a fresh context with `step_id -> value` added to the outputs.
    #[must_use]
    pub fn with_step_output(&self, step_id: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.step_outputs.insert(step_id.into(), value);
        next
    }

    /// Snapshot persisted as a step result's `inputData`.
    ///
    /// Every `inputData` payload that reaches storage passes through here,
    /// which is where a parameter redactor would hook in.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        json!({
            "params": self.input_parameters,
            "outputs": self.step_outputs,
        })
    }
}

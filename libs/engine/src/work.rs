//! Work executor registry
//!
//! `work` leaves delegate their actual work to an executor registered under
//! the leaf's `kind`. The registry is consulted at run time and supports
//! register/unregister without rebuilding the service, which is the plugin
//! extension point for new work kinds.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::context::ExecutionContext;

/// Error raised by a work executor.
///
/// `error_type` is recorded verbatim in the step result's error details, so
/// executors should use a stable type name (e.g. "HttpRequestError").
#[derive(Debug, Error, Clone)]
#[error("{error_type}: {message}")]
pub struct WorkError {
    pub error_type: String,
    pub message: String,
}

impl WorkError {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }
}

/// An executor for one kind of work leaf
#[async_trait]
pub trait WorkExecutor: Send + Sync {
    /// Perform the work and return the step's output value.
    async fn execute(
        &self,
        step_id: &str,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, WorkError>;
}

/// Registry of work executors keyed by kind
#[derive(Default)]
pub struct WorkRegistry {
    executors: RwLock<HashMap<String, Arc<dyn WorkExecutor>>>,
}

impl WorkRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in executors.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut executors: HashMap<String, Arc<dyn WorkExecutor>> = HashMap::new();
        executors.insert("echo".to_string(), Arc::new(EchoExecutor));
        Self {
            executors: RwLock::new(executors),
        }
    }

    /// Register an executor under a kind, replacing any previous one.
    pub async fn register(&self, kind: impl Into<String>, executor: Arc<dyn WorkExecutor>) {
        self.executors.write().await.insert(kind.into(), executor);
    }

    /// Remove the executor for a kind; returns whether one was registered.
    pub async fn unregister(&self, kind: &str) -> bool {
        self.executors.write().await.remove(kind).is_some()
    }

    /// Look up the executor for a kind.
    pub async fn get(&self, kind: &str) -> Option<Arc<dyn WorkExecutor>> {
        self.executors.read().await.get(kind).cloned()
    }

    /// Registered kinds, unordered.
    pub async fn kinds(&self) -> Vec<String> {
        self.executors.read().await.keys().cloned().collect()
    }
}

/// Built-in executor that returns its configuration as output
pub struct EchoExecutor;

#[async_trait]
impl WorkExecutor for EchoExecutor {
    async fn execute(
        &self,
        _step_id: &str,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, WorkError> {
        Ok(config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_builtin_echo() {
        let registry = WorkRegistry::with_builtins();
        let executor = registry.get("echo").await.expect("echo registered");

        let ctx = ExecutionContext::default();
        let output = executor
            .execute("s1", &json!({"k": "v"}), &ctx)
            .await
            .unwrap();
        assert_eq!(output, json!({"k": "v"}));
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let registry = WorkRegistry::new();
        assert!(registry.get("echo").await.is_none());

        registry.register("echo", Arc::new(EchoExecutor)).await;
        assert!(registry.get("echo").await.is_some());

        assert!(registry.unregister("echo").await);
        assert!(!registry.unregister("echo").await);
        assert!(registry.get("echo").await.is_none());
    }
}

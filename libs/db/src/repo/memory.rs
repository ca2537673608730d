//! In-memory repository implementations
//!
//! Behaviorally equivalent to the PostgreSQL repositories; used by the test
//! suites and as the fallback store when no database is configured.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use maestro_domain::{
    ExecutionId, ExecutionStatus, ExecutionStepResult, WorkflowExecution, WorkflowRevision,
    WorkflowRevisionId, WorkflowRevisionWithSource,
};

use crate::pagination::{Page, Pagination};
use crate::repo::errors::*;
use crate::repo::traits::{
    ExecutionFilter, ExecutionRecord, ExecutionRepository, ExecutionSummary, NewRevision,
    RevisionRepository, RevisionUpdate,
};

// =============================================================================
// Revision Repository
// =============================================================================

#[derive(Debug, Clone)]
struct StoredRevision {
    revision: WorkflowRevision,
    source: String,
}

type WorkflowKey = (String, String);

/// In-memory revision store
#[derive(Default)]
pub struct MemRevisionRepository {
    workflows: RwLock<HashMap<WorkflowKey, BTreeMap<i32, StoredRevision>>>,
}

impl MemRevisionRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn build(new: &NewRevision, version: i32, now: DateTime<Utc>) -> WorkflowRevision {
        WorkflowRevision {
            id: WorkflowRevisionId {
                namespace: new.namespace.clone(),
                workflow_id: new.workflow_id.clone(),
                version,
            },
            name: new.name.clone(),
            description: new.description.clone(),
            parameters: new.parameters.clone(),
            root_step: new.root_step.clone(),
            active: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl RevisionRepository for MemRevisionRepository {
    async fn create_initial(
        &self,
        new: &NewRevision,
    ) -> Result<WorkflowRevision, CreateRevisionError> {
        let key = (new.namespace.clone(), new.workflow_id.clone());
        let mut workflows = self.workflows.write().await;

        if workflows.get(&key).is_some_and(|versions| !versions.is_empty()) {
            return Err(CreateRevisionError::AlreadyExists {
                namespace: new.namespace.clone(),
                workflow_id: new.workflow_id.clone(),
            });
        }

        let revision = Self::build(new, 1, Utc::now());
        workflows.entry(key).or_default().insert(
            1,
            StoredRevision {
                revision: revision.clone(),
                source: new.source.clone(),
            },
        );
        Ok(revision)
    }

    async fn create_next(
        &self,
        new: &NewRevision,
    ) -> Result<WorkflowRevision, CreateRevisionError> {
        let key = (new.namespace.clone(), new.workflow_id.clone());
        let mut workflows = self.workflows.write().await;

        let versions = workflows
            .get_mut(&key)
            .filter(|versions| !versions.is_empty())
            .ok_or_else(|| CreateRevisionError::WorkflowNotFound {
                namespace: new.namespace.clone(),
                workflow_id: new.workflow_id.clone(),
            })?;

        let next_version = versions.keys().next_back().copied().unwrap_or(0) + 1;
        let revision = Self::build(new, next_version, Utc::now());
        versions.insert(
            next_version,
            StoredRevision {
                revision: revision.clone(),
                source: new.source.clone(),
            },
        );
        Ok(revision)
    }

    async fn find_by_id(
        &self,
        id: &WorkflowRevisionId,
    ) -> Result<Option<WorkflowRevision>, RevisionStoreError> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .get(&(id.namespace.clone(), id.workflow_id.clone()))
            .and_then(|versions| versions.get(&id.version))
            .map(|stored| stored.revision.clone()))
    }

    async fn find_by_id_with_source(
        &self,
        id: &WorkflowRevisionId,
    ) -> Result<Option<WorkflowRevisionWithSource>, RevisionStoreError> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .get(&(id.namespace.clone(), id.workflow_id.clone()))
            .and_then(|versions| versions.get(&id.version))
            .map(|stored| WorkflowRevisionWithSource {
                revision: stored.revision.clone(),
                source: stored.source.clone(),
            }))
    }

    async fn list(
        &self,
        namespace: &str,
        workflow_id: &str,
        active_only: bool,
    ) -> Result<Vec<WorkflowRevision>, RevisionStoreError> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .get(&(namespace.to_string(), workflow_id.to_string()))
            .map(|versions| {
                versions
                    .values()
                    .map(|stored| stored.revision.clone())
                    .filter(|revision| !active_only || revision.active)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(
        &self,
        id: &WorkflowRevisionId,
        update: &RevisionUpdate,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<WorkflowRevision, UpdateRevisionError> {
        let mut workflows = self.workflows.write().await;
        let stored = workflows
            .get_mut(&(id.namespace.clone(), id.workflow_id.clone()))
            .and_then(|versions| versions.get_mut(&id.version))
            .ok_or_else(|| UpdateRevisionError::NotFound(id.clone()))?;

        if stored.revision.active {
            return Err(UpdateRevisionError::ActiveRevisionConflict(id.clone()));
        }
        if stored.revision.updated_at != expected_updated_at {
            return Err(UpdateRevisionError::OptimisticLockConflict {
                expected: expected_updated_at,
                actual: stored.revision.updated_at,
            });
        }

        stored.revision.name = update.name.clone();
        stored.revision.description = update.description.clone();
        stored.revision.parameters = update.parameters.clone();
        stored.revision.root_step = update.root_step.clone();
        stored.revision.updated_at = Utc::now();
        stored.source = update.source.clone();
        Ok(stored.revision.clone())
    }

    async fn set_active(
        &self,
        id: &WorkflowRevisionId,
        desired: bool,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<WorkflowRevision, UpdateRevisionError> {
        let mut workflows = self.workflows.write().await;
        let stored = workflows
            .get_mut(&(id.namespace.clone(), id.workflow_id.clone()))
            .and_then(|versions| versions.get_mut(&id.version))
            .ok_or_else(|| UpdateRevisionError::NotFound(id.clone()))?;

        if stored.revision.active == desired {
            return Ok(stored.revision.clone());
        }
        if stored.revision.updated_at != expected_updated_at {
            return Err(UpdateRevisionError::OptimisticLockConflict {
                expected: expected_updated_at,
                actual: stored.revision.updated_at,
            });
        }

        stored.revision.active = desired;
        stored.revision.updated_at = Utc::now();
        Ok(stored.revision.clone())
    }

    async fn delete_revision(&self, id: &WorkflowRevisionId) -> Result<(), DeleteRevisionError> {
        let key = (id.namespace.clone(), id.workflow_id.clone());
        let mut workflows = self.workflows.write().await;
        let versions = workflows
            .get_mut(&key)
            .ok_or_else(|| DeleteRevisionError::NotFound(id.clone()))?;

        let stored = versions
            .get(&id.version)
            .ok_or_else(|| DeleteRevisionError::NotFound(id.clone()))?;
        if stored.revision.active {
            return Err(DeleteRevisionError::ActiveRevisionConflict(id.to_string()));
        }

        versions.remove(&id.version);
        if versions.is_empty() {
            workflows.remove(&key);
        }
        Ok(())
    }

    async fn delete_workflow(
        &self,
        namespace: &str,
        workflow_id: &str,
    ) -> Result<(), DeleteRevisionError> {
        let key = (namespace.to_string(), workflow_id.to_string());
        let mut workflows = self.workflows.write().await;

        if let Some(versions) = workflows.get(&key) {
            if versions.values().any(|stored| stored.revision.active) {
                return Err(DeleteRevisionError::ActiveRevisionConflict(format!(
                    "{namespace}/{workflow_id} has active revisions"
                )));
            }
            workflows.remove(&key);
        }
        Ok(())
    }
}

// =============================================================================
// Execution Repository
// =============================================================================

#[derive(Debug, Clone)]
struct MemExecution {
    execution: WorkflowExecution,
    steps: Vec<ExecutionStepResult>,
}

/// In-memory execution store
#[derive(Default)]
pub struct MemExecutionRepository {
    executions: RwLock<HashMap<String, MemExecution>>,
}

impl MemExecutionRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for MemExecutionRepository {
    async fn create_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<(), CreateExecutionError> {
        let mut executions = self.executions.write().await;
        let key = execution.execution_id.as_str().to_string();
        if executions.contains_key(&key) {
            return Err(CreateExecutionError::DuplicateId(
                execution.execution_id.clone(),
            ));
        }
        executions.insert(
            key,
            MemExecution {
                execution: execution.clone(),
                steps: Vec::new(),
            },
        );
        Ok(())
    }

    async fn append_step_result(
        &self,
        result: &ExecutionStepResult,
    ) -> Result<(), AppendStepError> {
        let mut executions = self.executions.write().await;
        let entry = executions
            .get_mut(result.execution_id.as_str())
            .ok_or_else(|| AppendStepError::ExecutionNotFound(result.execution_id.clone()))?;

        if entry
            .steps
            .iter()
            .any(|existing| existing.step_index == result.step_index)
        {
            return Err(AppendStepError::DuplicateIndex {
                execution_id: result.execution_id.clone(),
                step_index: result.step_index,
            });
        }

        entry.steps.push(result.clone());
        entry.execution.last_updated_at = Utc::now();
        Ok(())
    }

    async fn set_terminal(
        &self,
        id: &ExecutionId,
        status: ExecutionStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), SetTerminalError> {
        let mut executions = self.executions.write().await;
        let entry = executions
            .get_mut(id.as_str())
            .ok_or_else(|| SetTerminalError::NotFound(id.clone()))?;

        if entry.execution.status.is_terminal() {
            // Idempotent only for an identical transition
            if entry.execution.status == status
                && entry.execution.error_message.as_deref() == error_message
            {
                return Ok(());
            }
            return Err(SetTerminalError::AlreadyTerminal(id.clone()));
        }

        entry.execution.status = status;
        entry.execution.error_message = error_message.map(str::to_string);
        entry.execution.completed_at = Some(completed_at);
        entry.execution.last_updated_at = completed_at;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ExecutionId,
    ) -> Result<Option<ExecutionRecord>, ExecutionStoreError> {
        let executions = self.executions.read().await;
        Ok(executions.get(id.as_str()).map(|entry| {
            let mut steps = entry.steps.clone();
            steps.sort_by_key(|step| step.step_index);
            ExecutionRecord {
                execution: entry.execution.clone(),
                steps,
            }
        }))
    }

    async fn list_by_workflow(
        &self,
        namespace: &str,
        workflow_id: &str,
        filter: &ExecutionFilter,
        pagination: &Pagination,
    ) -> Result<Page<ExecutionSummary>, ExecutionStoreError> {
        let executions = self.executions.read().await;

        let mut matching: Vec<&MemExecution> = executions
            .values()
            .filter(|entry| matches_workflow(entry, namespace, workflow_id, filter))
            .collect();
        matching.sort_by(|a, b| b.execution.started_at.cmp(&a.execution.started_at));

        let total = matching.len() as i64;
        let offset = pagination.offset.max(0) as usize;
        let limit = pagination.clamped_limit() as usize;

        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(summarize)
            .collect();

        Ok(Page::new(items, total, pagination))
    }

    async fn count_by_workflow(
        &self,
        namespace: &str,
        workflow_id: &str,
        filter: &ExecutionFilter,
    ) -> Result<i64, ExecutionStoreError> {
        let executions = self.executions.read().await;
        Ok(executions
            .values()
            .filter(|entry| matches_workflow(entry, namespace, workflow_id, filter))
            .count() as i64)
    }

    async fn find_stale_running(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ExecutionId>, ExecutionStoreError> {
        let executions = self.executions.read().await;
        Ok(executions
            .values()
            .filter(|entry| {
                entry.execution.status == ExecutionStatus::Running
                    && entry.execution.last_updated_at < cutoff
            })
            .map(|entry| entry.execution.execution_id.clone())
            .collect())
    }
}

fn matches_workflow(
    entry: &MemExecution,
    namespace: &str,
    workflow_id: &str,
    filter: &ExecutionFilter,
) -> bool {
    let revision_id = &entry.execution.revision_id;
    revision_id.namespace == namespace
        && revision_id.workflow_id == workflow_id
        && filter
            .version
            .is_none_or(|version| revision_id.version == version)
        && filter
            .status
            .is_none_or(|status| entry.execution.status == status)
}

fn summarize(entry: &MemExecution) -> ExecutionSummary {
    use maestro_domain::StepResultStatus;

    ExecutionSummary {
        execution_id: entry.execution.execution_id.clone(),
        status: entry.execution.status,
        revision_version: entry.execution.revision_id.version,
        started_at: entry.execution.started_at,
        completed_at: entry.execution.completed_at,
        step_count: entry.steps.len() as i64,
        completed_steps: entry
            .steps
            .iter()
            .filter(|step| step.status == StepResultStatus::Completed)
            .count() as i64,
        failed_steps: entry
            .steps
            .iter()
            .filter(|step| step.status == StepResultStatus::Failed)
            .count() as i64,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_domain::{Step, StepResultStatus, StepType};
    use serde_json::{json, Map};
    use uuid::Uuid;

    fn new_revision(namespace: &str, workflow_id: &str) -> NewRevision {
        NewRevision {
            namespace: namespace.to_string(),
            workflow_id: workflow_id.to_string(),
            name: "Demo".to_string(),
            description: None,
            parameters: vec![],
            root_step: Step::Log {
                step_id: None,
                message: "Hi".to_string(),
            },
            source: "namespace: ns\n".to_string(),
        }
    }

    fn update_of(new: &NewRevision) -> RevisionUpdate {
        RevisionUpdate {
            name: "Renamed".to_string(),
            description: Some("changed".to_string()),
            parameters: new.parameters.clone(),
            root_step: new.root_step.clone(),
            source: new.source.clone(),
        }
    }

    fn header(execution_id: ExecutionId, version: i32) -> WorkflowExecution {
        let now = Utc::now();
        WorkflowExecution {
            execution_id,
            revision_id: WorkflowRevisionId {
                namespace: "ns".to_string(),
                workflow_id: "wf".to_string(),
                version,
            },
            input_parameters: Map::new(),
            status: ExecutionStatus::Running,
            error_message: None,
            started_at: now,
            completed_at: None,
            last_updated_at: now,
        }
    }

    fn step(execution_id: &ExecutionId, index: i32, status: StepResultStatus) -> ExecutionStepResult {
        let now = Utc::now();
        ExecutionStepResult {
            result_id: Uuid::now_v7(),
            execution_id: execution_id.clone(),
            step_index: index,
            step_id: format!("step-{index}"),
            step_type: StepType::Log,
            status,
            input_data: json!({"params": {}, "outputs": {}}),
            output_data: None,
            error_message: None,
            error_details: None,
            started_at: now,
            completed_at: now,
        }
    }

    // -------------------------------------------------------------------------
    // Revisions
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_version_assignment_is_monotonic() {
        let repo = MemRevisionRepository::new();
        let rev = new_revision("ns", "wf");

        let v1 = repo.create_initial(&rev).await.unwrap();
        assert_eq!(v1.id.version, 1);
        assert!(!v1.active);

        let v2 = repo.create_next(&rev).await.unwrap();
        assert_eq!(v2.id.version, 2);

        let v3 = repo.create_next(&rev).await.unwrap();
        assert_eq!(v3.id.version, 3);
    }

    #[tokio::test]
    async fn test_create_initial_rejects_existing_workflow() {
        let repo = MemRevisionRepository::new();
        let rev = new_revision("ns", "wf");
        repo.create_initial(&rev).await.unwrap();

        assert!(matches!(
            repo.create_initial(&rev).await,
            Err(CreateRevisionError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_next_requires_existing_workflow() {
        let repo = MemRevisionRepository::new();
        assert!(matches!(
            repo.create_next(&new_revision("ns", "wf")).await,
            Err(CreateRevisionError::WorkflowNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_deletes_punch_holes_without_renumbering() {
        let repo = MemRevisionRepository::new();
        let rev = new_revision("ns", "wf");
        let v1 = repo.create_initial(&rev).await.unwrap();
        repo.create_next(&rev).await.unwrap();

        repo.delete_revision(&v1.id).await.unwrap();
        let v3 = repo.create_next(&rev).await.unwrap();
        assert_eq!(v3.id.version, 3);

        let versions: Vec<i32> = repo
            .list("ns", "wf", false)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id.version)
            .collect();
        assert_eq!(versions, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_revision() {
        let repo = MemRevisionRepository::new();
        let mut rev = new_revision("ns", "wf");
        rev.parameters = vec![maestro_domain::ParameterDefinition {
            name: "a".to_string(),
            parameter_type: maestro_domain::ParameterType::String,
            required: true,
            default: None,
            description: None,
        }];

        let created = repo.create_initial(&rev).await.unwrap();
        let read = repo.find_by_id(&created.id).await.unwrap().unwrap();

        assert_eq!(read.parameters, created.parameters);
        assert_eq!(read.root_step, created.root_step);
        assert_eq!(read.active, created.active);
        assert_eq!(read.created_at, created.created_at);

        let with_source = repo
            .find_by_id_with_source(&created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(with_source.source, rev.source);
    }

    #[tokio::test]
    async fn test_update_applies_with_matching_timestamp() {
        let repo = MemRevisionRepository::new();
        let rev = new_revision("ns", "wf");
        let created = repo.create_initial(&rev).await.unwrap();

        let updated = repo
            .update(&created.id, &update_of(&rev), created.updated_at)
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_update_detects_stale_timestamp() {
        let repo = MemRevisionRepository::new();
        let rev = new_revision("ns", "wf");
        let created = repo.create_initial(&rev).await.unwrap();

        // First writer wins
        repo.update(&created.id, &update_of(&rev), created.updated_at)
            .await
            .unwrap();

        // Second writer still holds the original timestamp
        let err = repo
            .update(&created.id, &update_of(&rev), created.updated_at)
            .await
            .unwrap_err();
        match err {
            UpdateRevisionError::OptimisticLockConflict { expected, actual } => {
                assert_eq!(expected, created.updated_at);
                assert!(actual > expected);
            }
            other => panic!("expected lock conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_rejects_active_revision() {
        let repo = MemRevisionRepository::new();
        let rev = new_revision("ns", "wf");
        let created = repo.create_initial(&rev).await.unwrap();
        let activated = repo
            .set_active(&created.id, true, created.updated_at)
            .await
            .unwrap();

        assert!(matches!(
            repo.update(&created.id, &update_of(&rev), activated.updated_at)
                .await,
            Err(UpdateRevisionError::ActiveRevisionConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_set_active_is_idempotent_in_desired_state() {
        let repo = MemRevisionRepository::new();
        let rev = new_revision("ns", "wf");
        let created = repo.create_initial(&rev).await.unwrap();

        let activated = repo
            .set_active(&created.id, true, created.updated_at)
            .await
            .unwrap();
        assert!(activated.active);

        // Already active: succeeds regardless of the supplied timestamp
        let again = repo
            .set_active(&created.id, true, created.updated_at)
            .await
            .unwrap();
        assert!(again.active);
        assert_eq!(again.updated_at, activated.updated_at);
    }

    #[tokio::test]
    async fn test_set_active_detects_stale_timestamp() {
        let repo = MemRevisionRepository::new();
        let rev = new_revision("ns", "wf");
        let created = repo.create_initial(&rev).await.unwrap();
        let stale = created.updated_at - chrono::Duration::seconds(10);

        assert!(matches!(
            repo.set_active(&created.id, true, stale).await,
            Err(UpdateRevisionError::OptimisticLockConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_revision_conflicts() {
        let repo = MemRevisionRepository::new();
        let rev = new_revision("ns", "wf");
        let created = repo.create_initial(&rev).await.unwrap();

        let missing = WorkflowRevisionId {
            version: 9,
            ..created.id.clone()
        };
        assert!(matches!(
            repo.delete_revision(&missing).await,
            Err(DeleteRevisionError::NotFound(_))
        ));

        repo.set_active(&created.id, true, created.updated_at)
            .await
            .unwrap();
        assert!(matches!(
            repo.delete_revision(&created.id).await,
            Err(DeleteRevisionError::ActiveRevisionConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_workflow_idempotent_and_guarded() {
        let repo = MemRevisionRepository::new();

        // Nothing exists: still OK
        repo.delete_workflow("ns", "wf").await.unwrap();

        let rev = new_revision("ns", "wf");
        let created = repo.create_initial(&rev).await.unwrap();
        repo.set_active(&created.id, true, created.updated_at)
            .await
            .unwrap();

        assert!(matches!(
            repo.delete_workflow("ns", "wf").await,
            Err(DeleteRevisionError::ActiveRevisionConflict(_))
        ));

        let active = repo.find_by_id(&created.id).await.unwrap().unwrap();
        repo.set_active(&created.id, false, active.updated_at)
            .await
            .unwrap();
        repo.delete_workflow("ns", "wf").await.unwrap();
        assert!(repo.find_by_id(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_only() {
        let repo = MemRevisionRepository::new();
        let rev = new_revision("ns", "wf");
        let v1 = repo.create_initial(&rev).await.unwrap();
        let v2 = repo.create_next(&rev).await.unwrap();
        repo.set_active(&v2.id, true, v2.updated_at).await.unwrap();

        let all = repo.list("ns", "wf", false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id.version, 1);

        let active = repo.list("ns", "wf", true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id.version, 2);

        // Both revisions may be active at the same time
        repo.set_active(&v1.id, true, v1.updated_at).await.unwrap();
        assert_eq!(repo.list("ns", "wf", true).await.unwrap().len(), 2);
    }

    // -------------------------------------------------------------------------
    // Executions
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_execution_rejects_duplicate_id() {
        let repo = MemExecutionRepository::new();
        let id = ExecutionId::generate();
        repo.create_execution(&header(id.clone(), 1)).await.unwrap();

        assert!(matches!(
            repo.create_execution(&header(id, 1)).await,
            Err(CreateExecutionError::DuplicateId(_))
        ));
    }

    #[tokio::test]
    async fn test_append_enforces_index_uniqueness() {
        let repo = MemExecutionRepository::new();
        let id = ExecutionId::generate();
        repo.create_execution(&header(id.clone(), 1)).await.unwrap();

        repo.append_step_result(&step(&id, 0, StepResultStatus::Completed))
            .await
            .unwrap();
        assert!(matches!(
            repo.append_step_result(&step(&id, 0, StepResultStatus::Completed))
                .await,
            Err(AppendStepError::DuplicateIndex { .. })
        ));

        let unknown = ExecutionId::generate();
        assert!(matches!(
            repo.append_step_result(&step(&unknown, 0, StepResultStatus::Completed))
                .await,
            Err(AppendStepError::ExecutionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_append_refreshes_last_updated_at() {
        let repo = MemExecutionRepository::new();
        let id = ExecutionId::generate();
        let created = header(id.clone(), 1);
        repo.create_execution(&created).await.unwrap();

        repo.append_step_result(&step(&id, 0, StepResultStatus::Completed))
            .await
            .unwrap();

        let record = repo.find_by_id(&id).await.unwrap().unwrap();
        assert!(record.execution.last_updated_at >= created.last_updated_at);
    }

    #[tokio::test]
    async fn test_set_terminal_idempotent_on_identical_input() {
        let repo = MemExecutionRepository::new();
        let id = ExecutionId::generate();
        repo.create_execution(&header(id.clone(), 1)).await.unwrap();

        let completed_at = Utc::now();
        repo.set_terminal(&id, ExecutionStatus::Failed, Some("boom"), completed_at)
            .await
            .unwrap();

        // Identical input: OK
        repo.set_terminal(&id, ExecutionStatus::Failed, Some("boom"), completed_at)
            .await
            .unwrap();

        // Different terminal state: rejected (terminal states are sticky)
        assert!(matches!(
            repo.set_terminal(&id, ExecutionStatus::Completed, None, completed_at)
                .await,
            Err(SetTerminalError::AlreadyTerminal(_))
        ));

        let record = repo.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record.execution.status, ExecutionStatus::Failed);
        assert_eq!(record.execution.error_message.as_deref(), Some("boom"));
        assert_eq!(record.execution.completed_at, Some(completed_at));
    }

    #[tokio::test]
    async fn test_find_by_id_orders_steps() {
        let repo = MemExecutionRepository::new();
        let id = ExecutionId::generate();
        repo.create_execution(&header(id.clone(), 1)).await.unwrap();

        for index in [2, 0, 1] {
            repo.append_step_result(&step(&id, index, StepResultStatus::Completed))
                .await
                .unwrap();
        }

        let record = repo.find_by_id(&id).await.unwrap().unwrap();
        let indices: Vec<i32> = record.steps.iter().map(|s| s.step_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_list_by_workflow_filters_and_paginates() {
        let repo = MemExecutionRepository::new();

        for i in 0..5 {
            let id = ExecutionId::generate();
            let mut exec = header(id.clone(), if i < 3 { 1 } else { 2 });
            exec.started_at = Utc::now() + chrono::Duration::seconds(i);
            repo.create_execution(&exec).await.unwrap();
            repo.append_step_result(&step(&id, 0, StepResultStatus::Completed))
                .await
                .unwrap();
            repo.set_terminal(&id, ExecutionStatus::Completed, None, Utc::now())
                .await
                .unwrap();
        }

        let filter = ExecutionFilter::default();
        let page1 = repo
            .list_by_workflow("ns", "wf", &filter, &Pagination::from_query(Some(2), Some(0)))
            .await
            .unwrap();
        assert_eq!(page1.items.len(), 2);
        assert_eq!(page1.total, 5);
        assert!(page1.has_more());
        assert!(page1.items[0].started_at >= page1.items[1].started_at);
        assert_eq!(page1.items[0].step_count, 1);
        assert_eq!(page1.items[0].completed_steps, 1);
        assert_eq!(page1.items[0].failed_steps, 0);

        let page2 = repo
            .list_by_workflow("ns", "wf", &filter, &Pagination::from_query(Some(2), Some(2)))
            .await
            .unwrap();
        let ids1: Vec<_> = page1.items.iter().map(|s| s.execution_id.clone()).collect();
        assert!(page2
            .items
            .iter()
            .all(|summary| !ids1.contains(&summary.execution_id)));

        let v2_only = ExecutionFilter {
            version: Some(2),
            status: None,
        };
        assert_eq!(
            repo.count_by_workflow("ns", "wf", &v2_only).await.unwrap(),
            2
        );

        let failed_only = ExecutionFilter {
            version: None,
            status: Some(ExecutionStatus::Failed),
        };
        assert_eq!(
            repo.count_by_workflow("ns", "wf", &failed_only)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_find_stale_running() {
        let repo = MemExecutionRepository::new();

        let stale_id = ExecutionId::generate();
        let mut stale = header(stale_id.clone(), 1);
        stale.last_updated_at = Utc::now() - chrono::Duration::minutes(30);
        repo.create_execution(&stale).await.unwrap();

        let fresh_id = ExecutionId::generate();
        repo.create_execution(&header(fresh_id.clone(), 1))
            .await
            .unwrap();

        let done_id = ExecutionId::generate();
        let mut done = header(done_id.clone(), 1);
        done.last_updated_at = Utc::now() - chrono::Duration::minutes(30);
        repo.create_execution(&done).await.unwrap();
        repo.set_terminal(&done_id, ExecutionStatus::Completed, None, Utc::now())
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(20);
        let found = repo.find_stale_running(cutoff).await.unwrap();
        assert_eq!(found, vec![stale_id]);
    }
}

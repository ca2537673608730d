//! PostgreSQL implementation of RevisionRepository
//!
//! Version assignment runs under a per-workflow advisory lock; a partial
//! unique index on `(namespace, workflow_id) WHERE version = 1` backstops
//! first-revision uniqueness. Optimistic locking is a CAS on `updated_at`
//! under `SELECT ... FOR UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use maestro_domain::{
    ParameterDefinition, Step, WorkflowRevision, WorkflowRevisionId, WorkflowRevisionWithSource,
};

use crate::repo::errors::{
    CreateRevisionError, DeleteRevisionError, RevisionStoreError, UpdateRevisionError,
};
use crate::repo::traits::{NewRevision, RevisionRepository, RevisionUpdate};

/// PostgreSQL revision repository
pub struct PgRevisionRepository {
    pool: PgPool,
}

impl PgRevisionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevisionRepository for PgRevisionRepository {
    async fn create_initial(
        &self,
        new: &NewRevision,
    ) -> Result<WorkflowRevision, CreateRevisionError> {
        let mut tx = self.pool.begin().await.map_err(CreateRevisionError::Database)?;
        lock_workflow(&mut tx, &new.namespace, &new.workflow_id)
            .await
            .map_err(CreateRevisionError::Database)?;

        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM workflow_revisions WHERE namespace = $1 AND workflow_id = $2",
        )
        .bind(&new.namespace)
        .bind(&new.workflow_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(CreateRevisionError::Database)?;

        if existing > 0 {
            return Err(CreateRevisionError::AlreadyExists {
                namespace: new.namespace.clone(),
                workflow_id: new.workflow_id.clone(),
            });
        }

        let row = insert_revision(&mut tx, new, 1)
            .await
            .map_err(|e| map_insert_error(e, new))?;
        tx.commit().await.map_err(CreateRevisionError::Database)?;
        Ok(row.into())
    }

    async fn create_next(
        &self,
        new: &NewRevision,
    ) -> Result<WorkflowRevision, CreateRevisionError> {
        let mut tx = self.pool.begin().await.map_err(CreateRevisionError::Database)?;
        lock_workflow(&mut tx, &new.namespace, &new.workflow_id)
            .await
            .map_err(CreateRevisionError::Database)?;

        let max_version: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(version) FROM workflow_revisions WHERE namespace = $1 AND workflow_id = $2",
        )
        .bind(&new.namespace)
        .bind(&new.workflow_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(CreateRevisionError::Database)?;

        let Some(max_version) = max_version else {
            return Err(CreateRevisionError::WorkflowNotFound {
                namespace: new.namespace.clone(),
                workflow_id: new.workflow_id.clone(),
            });
        };

        let row = insert_revision(&mut tx, new, max_version + 1)
            .await
            .map_err(|e| map_insert_error(e, new))?;
        tx.commit().await.map_err(CreateRevisionError::Database)?;
        Ok(row.into())
    }

    async fn find_by_id(
        &self,
        id: &WorkflowRevisionId,
    ) -> Result<Option<WorkflowRevision>, RevisionStoreError> {
        let row = sqlx::query_as::<_, RevisionRow>(
            r#"
            SELECT namespace, workflow_id, version, name, description,
                   parameters, root_step, active, created_at, updated_at
            FROM workflow_revisions
            WHERE namespace = $1 AND workflow_id = $2 AND version = $3
            "#,
        )
        .bind(&id.namespace)
        .bind(&id.workflow_id)
        .bind(id.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(RevisionStoreError::Database)?;

        Ok(row.map(WorkflowRevision::from))
    }

    async fn find_by_id_with_source(
        &self,
        id: &WorkflowRevisionId,
    ) -> Result<Option<WorkflowRevisionWithSource>, RevisionStoreError> {
        let row = sqlx::query_as::<_, RevisionWithSourceRow>(
            r#"
            SELECT namespace, workflow_id, version, name, description,
                   parameters, root_step, active, created_at, updated_at, source_text
            FROM workflow_revisions
            WHERE namespace = $1 AND workflow_id = $2 AND version = $3
            "#,
        )
        .bind(&id.namespace)
        .bind(&id.workflow_id)
        .bind(id.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(RevisionStoreError::Database)?;

        Ok(row.map(|row| WorkflowRevisionWithSource {
            source: row.source_text,
            revision: row.revision.into(),
        }))
    }

    async fn list(
        &self,
        namespace: &str,
        workflow_id: &str,
        active_only: bool,
    ) -> Result<Vec<WorkflowRevision>, RevisionStoreError> {
        let rows = sqlx::query_as::<_, RevisionRow>(
            r#"
            SELECT namespace, workflow_id, version, name, description,
                   parameters, root_step, active, created_at, updated_at
            FROM workflow_revisions
            WHERE namespace = $1 AND workflow_id = $2 AND ($3 = FALSE OR active)
            ORDER BY version ASC
            "#,
        )
        .bind(namespace)
        .bind(workflow_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(RevisionStoreError::Database)?;

        Ok(rows.into_iter().map(WorkflowRevision::from).collect())
    }

    async fn update(
        &self,
        id: &WorkflowRevisionId,
        update: &RevisionUpdate,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<WorkflowRevision, UpdateRevisionError> {
        let mut tx = self.pool.begin().await.map_err(UpdateRevisionError::Database)?;

        let (active, stored_updated_at) = fetch_lock_state(&mut tx, id)
            .await
            .map_err(UpdateRevisionError::Database)?
            .ok_or_else(|| UpdateRevisionError::NotFound(id.clone()))?;

        if active {
            return Err(UpdateRevisionError::ActiveRevisionConflict(id.clone()));
        }
        if stored_updated_at != expected_updated_at {
            return Err(UpdateRevisionError::OptimisticLockConflict {
                expected: expected_updated_at,
                actual: stored_updated_at,
            });
        }

        let row = sqlx::query_as::<_, RevisionRow>(
            r#"
            UPDATE workflow_revisions
            SET name = $4, description = $5, parameters = $6, root_step = $7,
                source_text = $8, updated_at = NOW()
            WHERE namespace = $1 AND workflow_id = $2 AND version = $3
            RETURNING namespace, workflow_id, version, name, description,
                      parameters, root_step, active, created_at, updated_at
            "#,
        )
        .bind(&id.namespace)
        .bind(&id.workflow_id)
        .bind(id.version)
        .bind(&update.name)
        .bind(&update.description)
        .bind(Json(&update.parameters))
        .bind(Json(&update.root_step))
        .bind(&update.source)
        .fetch_one(&mut *tx)
        .await
        .map_err(UpdateRevisionError::Database)?;

        tx.commit().await.map_err(UpdateRevisionError::Database)?;
        Ok(row.into())
    }

    async fn set_active(
        &self,
        id: &WorkflowRevisionId,
        desired: bool,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<WorkflowRevision, UpdateRevisionError> {
        let mut tx = self.pool.begin().await.map_err(UpdateRevisionError::Database)?;

        let (active, stored_updated_at) = fetch_lock_state(&mut tx, id)
            .await
            .map_err(UpdateRevisionError::Database)?
            .ok_or_else(|| UpdateRevisionError::NotFound(id.clone()))?;

        if active == desired {
            // Already in the desired state
            let current = sqlx::query_as::<_, RevisionRow>(
                r#"
                SELECT namespace, workflow_id, version, name, description,
                       parameters, root_step, active, created_at, updated_at
                FROM workflow_revisions
                WHERE namespace = $1 AND workflow_id = $2 AND version = $3
                "#,
            )
            .bind(&id.namespace)
            .bind(&id.workflow_id)
            .bind(id.version)
            .fetch_one(&mut *tx)
            .await
            .map_err(UpdateRevisionError::Database)?;
            tx.commit().await.map_err(UpdateRevisionError::Database)?;
            return Ok(current.into());
        }

        if stored_updated_at != expected_updated_at {
            return Err(UpdateRevisionError::OptimisticLockConflict {
                expected: expected_updated_at,
                actual: stored_updated_at,
            });
        }

        let row = sqlx::query_as::<_, RevisionRow>(
            r#"
            UPDATE workflow_revisions
            SET active = $4, updated_at = NOW()
            WHERE namespace = $1 AND workflow_id = $2 AND version = $3
            RETURNING namespace, workflow_id, version, name, description,
                      parameters, root_step, active, created_at, updated_at
            "#,
        )
        .bind(&id.namespace)
        .bind(&id.workflow_id)
        .bind(id.version)
        .bind(desired)
        .fetch_one(&mut *tx)
        .await
        .map_err(UpdateRevisionError::Database)?;

        tx.commit().await.map_err(UpdateRevisionError::Database)?;
        Ok(row.into())
    }

    async fn delete_revision(&self, id: &WorkflowRevisionId) -> Result<(), DeleteRevisionError> {
        let mut tx = self.pool.begin().await.map_err(DeleteRevisionError::Database)?;

        let (active, _) = fetch_lock_state(&mut tx, id)
            .await
            .map_err(DeleteRevisionError::Database)?
            .ok_or_else(|| DeleteRevisionError::NotFound(id.clone()))?;

        if active {
            return Err(DeleteRevisionError::ActiveRevisionConflict(id.to_string()));
        }

        sqlx::query(
            "DELETE FROM workflow_revisions WHERE namespace = $1 AND workflow_id = $2 AND version = $3",
        )
        .bind(&id.namespace)
        .bind(&id.workflow_id)
        .bind(id.version)
        .execute(&mut *tx)
        .await
        .map_err(DeleteRevisionError::Database)?;

        tx.commit().await.map_err(DeleteRevisionError::Database)?;
        Ok(())
    }

    async fn delete_workflow(
        &self,
        namespace: &str,
        workflow_id: &str,
    ) -> Result<(), DeleteRevisionError> {
        let mut tx = self.pool.begin().await.map_err(DeleteRevisionError::Database)?;
        lock_workflow(&mut tx, namespace, workflow_id)
            .await
            .map_err(DeleteRevisionError::Database)?;

        let active_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM workflow_revisions WHERE namespace = $1 AND workflow_id = $2 AND active",
        )
        .bind(namespace)
        .bind(workflow_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(DeleteRevisionError::Database)?;

        if active_count > 0 {
            return Err(DeleteRevisionError::ActiveRevisionConflict(format!(
                "{namespace}/{workflow_id} has active revisions"
            )));
        }

        sqlx::query("DELETE FROM workflow_revisions WHERE namespace = $1 AND workflow_id = $2")
            .bind(namespace)
            .bind(workflow_id)
            .execute(&mut *tx)
            .await
            .map_err(DeleteRevisionError::Database)?;

        tx.commit().await.map_err(DeleteRevisionError::Database)?;
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Serialize writers of one workflow for the duration of the transaction.
async fn lock_workflow(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    namespace: &str,
    workflow_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("{namespace}/{workflow_id}"))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn fetch_lock_state(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: &WorkflowRevisionId,
) -> Result<Option<(bool, DateTime<Utc>)>, sqlx::Error> {
    sqlx::query_as::<_, (bool, DateTime<Utc>)>(
        r#"
        SELECT active, updated_at
        FROM workflow_revisions
        WHERE namespace = $1 AND workflow_id = $2 AND version = $3
        FOR UPDATE
        "#,
    )
    .bind(&id.namespace)
    .bind(&id.workflow_id)
    .bind(id.version)
    .fetch_optional(&mut **tx)
    .await
}

async fn insert_revision(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    new: &NewRevision,
    version: i32,
) -> Result<RevisionRow, sqlx::Error> {
    sqlx::query_as::<_, RevisionRow>(
        r#"
        INSERT INTO workflow_revisions (
            namespace, workflow_id, version, name, description,
            parameters, root_step, source_text
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING namespace, workflow_id, version, name, description,
                  parameters, root_step, active, created_at, updated_at
        "#,
    )
    .bind(&new.namespace)
    .bind(&new.workflow_id)
    .bind(version)
    .bind(&new.name)
    .bind(&new.description)
    .bind(Json(&new.parameters))
    .bind(Json(&new.root_step))
    .bind(&new.source)
    .fetch_one(&mut **tx)
    .await
}

fn map_insert_error(e: sqlx::Error, new: &NewRevision) -> CreateRevisionError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return CreateRevisionError::AlreadyExists {
                namespace: new.namespace.clone(),
                workflow_id: new.workflow_id.clone(),
            };
        }
    }
    CreateRevisionError::Database(e)
}

// =============================================================================
// Internal row types for SQLx mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct RevisionRow {
    namespace: String,
    workflow_id: String,
    version: i32,
    name: String,
    description: Option<String>,
    parameters: Json<Vec<ParameterDefinition>>,
    root_step: Json<Step>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RevisionRow> for WorkflowRevision {
    fn from(row: RevisionRow) -> Self {
        Self {
            id: WorkflowRevisionId {
                namespace: row.namespace,
                workflow_id: row.workflow_id,
                version: row.version,
            },
            name: row.name,
            description: row.description,
            parameters: row.parameters.0,
            root_step: row.root_step.0,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RevisionWithSourceRow {
    #[sqlx(flatten)]
    revision: RevisionRow,
    source_text: String,
}

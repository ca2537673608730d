//! Persistence layer for Maestro
//!
//! Repository traits for workflow revisions and executions, with PostgreSQL
//! implementations for production and in-memory implementations for
//! development and tests.

pub mod pagination;
pub mod pool;
pub mod repo;

pub use pagination::{Page, Pagination};
pub use pool::connect;
pub use repo::errors::{
    AppendStepError, CreateExecutionError, CreateRevisionError, DeleteRevisionError,
    ExecutionStoreError, RevisionStoreError, SetTerminalError, UpdateRevisionError,
};
pub use repo::memory::{MemExecutionRepository, MemRevisionRepository};
pub use repo::pg_execution::PgExecutionRepository;
pub use repo::pg_revision::PgRevisionRepository;
pub use repo::traits::{
    ExecutionFilter, ExecutionRecord, ExecutionRepository, ExecutionSummary, NewRevision,
    RevisionRepository, RevisionUpdate,
};

/// Embedded schema migrations (applied by `pool::connect`)
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

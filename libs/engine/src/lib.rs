//! Maestro execution engine
//!
//! Everything between the HTTP boundary and the stores: the declarative
//! document parser, the parameter validation engine, the step tree
//! interpreter, the execution coordinator that checkpoints every state
//! transition, and the stale-execution sweeper.

pub mod condition;
pub mod context;
pub mod coordinator;
pub mod interpreter;
pub mod params;
pub mod parser;
pub mod sweeper;
pub mod work;

pub use condition::ConditionError;
pub use context::ExecutionContext;
pub use coordinator::{ExecuteError, ExecutionCoordinator};
pub use interpreter::{
    CheckpointError, FinalStatus, RunOutcome, StepInterpreter, StepResultSink,
};
pub use params::{validate_parameters, ParamError};
pub use parser::{parse_revision, ParseError, ParsedRevision, ValidationError};
pub use sweeper::StaleExecutionSweeper;
pub use work::{EchoExecutor, WorkError, WorkExecutor, WorkRegistry};

//! Step tree interpreter
//!
//! Walks a revision's step tree depth-first, left-to-right against an
//! execution context and emits an ordered stream of step results through a
//! checkpointing sink. Leaves are numbered by a single monotonic index
//! shared across the whole tree; orchestration nodes only appear in the
//! stream when they themselves fail (condition error, depth guard).
//!
//! Failure is fail-fast: the first FAILED result short-circuits the
//! enclosing sequence and every unvisited descendant leaf of the remaining
//! children is recorded as SKIPPED.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use maestro_domain::{
    step::MAX_NESTING_DEPTH, ErrorDetails, ExecutionId, ExecutionStepResult, Step,
    StepResultStatus,
};

use crate::condition;
use crate::context::ExecutionContext;
use crate::work::WorkRegistry;

/// Error type recorded when an `if` condition cannot be evaluated
pub const ERROR_TYPE_CONDITION: &str = "ConditionEvaluationError";

/// Error type recorded when no executor is registered for a work kind
pub const ERROR_TYPE_UNKNOWN_WORK_KIND: &str = "UnknownWorkKind";

/// Error type recorded when traversal descends past the depth limit
pub const ERROR_TYPE_NESTING_DEPTH: &str = "NestingDepthExceeded";

/// A step result could not be committed; the run must abort.
#[derive(Debug, Error, Clone)]
#[error("step result checkpoint failed: {message}")]
pub struct CheckpointError {
    pub message: String,
}

impl CheckpointError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Receives every step result in execution order.
///
/// The sink must durably commit the result before returning: the
/// interpreter does not advance past a step until its result is stored.
#[async_trait]
pub trait StepResultSink: Send {
    async fn emit(&mut self, result: ExecutionStepResult) -> Result<(), CheckpointError>;
}

/// Final status of an interpreter run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalStatus {
    Completed,
    Failed,
}

/// Everything a run produced besides the checkpointed results
#[derive(Debug)]
pub struct RunOutcome {
    pub status: FinalStatus,
    pub context: ExecutionContext,
    /// Error message of the first FAILED step, when the run failed
    pub first_error: Option<String>,
}

/// Drives a step tree against an execution context
pub struct StepInterpreter<'w> {
    work: &'w WorkRegistry,
}

impl<'w> StepInterpreter<'w> {
    #[must_use]
    pub fn new(work: &'w WorkRegistry) -> Self {
        Self { work }
    }

    /// Run the tree rooted at `root`, emitting results through `sink`.
    ///
    /// Returns an error only when a checkpoint commit fails; step failures
    /// are reported through `RunOutcome::status`.
    pub async fn run(
        &self,
        execution_id: &ExecutionId,
        root: &Step,
        ctx: ExecutionContext,
        sink: &mut dyn StepResultSink,
    ) -> Result<RunOutcome, CheckpointError> {
        let mut run = Run {
            work: self.work,
            execution_id,
            sink,
            next_index: 0,
            first_error: None,
        };

        let (status, context) = run.visit(root, ctx, 1).await?;
        Ok(RunOutcome {
            status: match status {
                NodeStatus::Completed => FinalStatus::Completed,
                NodeStatus::Failed => FinalStatus::Failed,
            },
            context,
            first_error: run.first_error,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStatus {
    Completed,
    Failed,
}

/// Mutable state of one traversal
struct Run<'a> {
    work: &'a WorkRegistry,
    execution_id: &'a ExecutionId,
    sink: &'a mut dyn StepResultSink,
    next_index: i32,
    first_error: Option<String>,
}

impl Run<'_> {
    fn visit<'a>(
        &'a mut self,
        node: &'a Step,
        ctx: ExecutionContext,
        depth: usize,
    ) -> BoxFuture<'a, Result<(NodeStatus, ExecutionContext), CheckpointError>> {
        Box::pin(async move {
            if depth > MAX_NESTING_DEPTH {
                self.emit_node_failure(
                    node,
                    &ctx,
                    ERROR_TYPE_NESTING_DEPTH,
                    format!("step tree exceeds maximum nesting depth of {MAX_NESTING_DEPTH}"),
                )
                .await?;
                return Ok((NodeStatus::Failed, ctx));
            }

            match node {
                Step::Sequence { children, .. } => self.visit_children(children, ctx, depth).await,

                Step::If {
                    condition: expr,
                    then,
                    otherwise,
                    ..
                } => match condition::evaluate(expr, &ctx) {
                    Ok(taken) => {
                        // The non-taken branch never enters the visit order
                        let branch = if taken { then } else { otherwise };
                        self.visit_children(branch, ctx, depth).await
                    }
                    Err(err) => {
                        self.emit_node_failure(node, &ctx, ERROR_TYPE_CONDITION, err.to_string())
                            .await?;
                        Ok((NodeStatus::Failed, ctx))
                    }
                },

                Step::Log { message, .. } => {
                    let started_at = Utc::now();
                    let input_data = ctx.snapshot();
                    let step_index = self.take_index();
                    let step_id = resolve_step_id(node, step_index);

                    let rendered = render_message(message, &ctx);
                    tracing::info!(
                        execution_id = %self.execution_id,
                        step_id = %step_id,
                        "{rendered}"
                    );

                    self.emit(ExecutionStepResult {
                        result_id: Uuid::now_v7(),
                        execution_id: self.execution_id.clone(),
                        step_index,
                        step_id,
                        step_type: node.step_type(),
                        status: StepResultStatus::Completed,
                        input_data,
                        output_data: None,
                        error_message: None,
                        error_details: None,
                        started_at,
                        completed_at: Utc::now(),
                    })
                    .await?;

                    Ok((NodeStatus::Completed, ctx))
                }

                Step::Work { kind, config, .. } => {
                    let started_at = Utc::now();
                    let input_data = ctx.snapshot();
                    let step_index = self.take_index();
                    let step_id = resolve_step_id(node, step_index);

                    let Some(executor) = self.work.get(kind).await else {
                        self.emit_failure(
                            node,
                            step_index,
                            step_id,
                            input_data,
                            started_at,
                            ERROR_TYPE_UNKNOWN_WORK_KIND,
                            format!("no work executor registered for kind '{kind}'"),
                        )
                        .await?;
                        return Ok((NodeStatus::Failed, ctx));
                    };

                    match executor.execute(&step_id, config, &ctx).await {
                        Ok(output) => {
                            let next_ctx = ctx.with_step_output(&step_id, output.clone());
                            self.emit(ExecutionStepResult {
                                result_id: Uuid::now_v7(),
                                execution_id: self.execution_id.clone(),
                                step_index,
                                step_id,
                                step_type: node.step_type(),
                                status: StepResultStatus::Completed,
                                input_data,
                                output_data: Some(output),
                                error_message: None,
                                error_details: None,
                                started_at,
                                completed_at: Utc::now(),
                            })
                            .await?;
                            Ok((NodeStatus::Completed, next_ctx))
                        }
                        Err(err) => {
                            self.emit_failure(
                                node,
                                step_index,
                                step_id,
                                input_data,
                                started_at,
                                &err.error_type,
                                err.message,
                            )
                            .await?;
                            Ok((NodeStatus::Failed, ctx))
                        }
                    }
                }
            }
        })
    }

    /// Execute an ordered child list with fail-fast semantics.
    fn visit_children<'a>(
        &'a mut self,
        children: &'a [Step],
        ctx: ExecutionContext,
        depth: usize,
    ) -> BoxFuture<'a, Result<(NodeStatus, ExecutionContext), CheckpointError>> {
        Box::pin(async move {
            let mut ctx = ctx;
            let mut failed = false;

            for child in children {
                if failed {
                    self.skip_leaves(child, &ctx).await?;
                    continue;
                }

                let (status, next_ctx) = self.visit(child, ctx, depth + 1).await?;
                ctx = next_ctx;
                if status == NodeStatus::Failed {
                    failed = true;
                }
            }

            let status = if failed {
                NodeStatus::Failed
            } else {
                NodeStatus::Completed
            };
            Ok((status, ctx))
        })
    }

    /// Record every leaf under `node` as SKIPPED, in document order.
    ///
    /// An unvisited `if` never had its condition evaluated, so neither
    /// branch was taken and the leaves of both are skipped.
    fn skip_leaves<'a>(
        &'a mut self,
        node: &'a Step,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<(), CheckpointError>> {
        Box::pin(async move {
            match node {
                Step::Sequence { children, .. } => {
                    for child in children {
                        self.skip_leaves(child, ctx).await?;
                    }
                }
                Step::If {
                    then, otherwise, ..
                } => {
                    for child in then.iter().chain(otherwise) {
                        self.skip_leaves(child, ctx).await?;
                    }
                }
                leaf => {
                    let now = Utc::now();
                    let step_index = self.take_index();
                    self.emit(ExecutionStepResult {
                        result_id: Uuid::now_v7(),
                        execution_id: self.execution_id.clone(),
                        step_index,
                        step_id: resolve_step_id(leaf, step_index),
                        step_type: leaf.step_type(),
                        status: StepResultStatus::Skipped,
                        input_data: ctx.snapshot(),
                        output_data: None,
                        error_message: None,
                        error_details: None,
                        started_at: now,
                        completed_at: now,
                    })
                    .await?;
                }
            }
            Ok(())
        })
    }

    /// FAILED result emitted on behalf of an orchestration node.
    async fn emit_node_failure(
        &mut self,
        node: &Step,
        ctx: &ExecutionContext,
        error_type: &str,
        message: String,
    ) -> Result<(), CheckpointError> {
        let started_at = Utc::now();
        let input_data = ctx.snapshot();
        let step_index = self.take_index();
        let step_id = resolve_step_id(node, step_index);
        self.emit_failure(node, step_index, step_id, input_data, started_at, error_type, message)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_failure(
        &mut self,
        node: &Step,
        step_index: i32,
        step_id: String,
        input_data: Value,
        started_at: chrono::DateTime<Utc>,
        error_type: &str,
        message: String,
    ) -> Result<(), CheckpointError> {
        let details = ErrorDetails {
            error_type: error_type.to_string(),
            stack_trace: None,
            step_inputs: input_data.clone(),
        };
        self.emit(ExecutionStepResult {
            result_id: Uuid::now_v7(),
            execution_id: self.execution_id.clone(),
            step_index,
            step_id,
            step_type: node.step_type(),
            status: StepResultStatus::Failed,
            input_data,
            output_data: None,
            error_message: Some(message),
            error_details: Some(details),
            started_at,
            completed_at: Utc::now(),
        })
        .await
    }

    async fn emit(&mut self, result: ExecutionStepResult) -> Result<(), CheckpointError> {
        if result.status == StepResultStatus::Failed && self.first_error.is_none() {
            self.first_error.clone_from(&result.error_message);
        }
        self.sink.emit(result).await
    }

    fn take_index(&mut self) -> i32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }
}

/// Explicit step id, or the synthesized `step-<index>` fallback.
fn resolve_step_id(node: &Step, index: i32) -> String {
    node.step_id()
        .map_or_else(|| format!("step-{index}"), str::to_string)
}

/// Substitute `{name}` tokens with the string form of the matching input
/// parameter. Unknown tokens are left in place.
fn render_message(template: &str, ctx: &ExecutionContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        match tail.find('}') {
            Some(close) => {
                let name = &tail[..close];
                match ctx.parameter(name) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &tail[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

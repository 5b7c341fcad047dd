//! The user-facing task contract.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::executor::TaskContext;
use crate::models::TaskType;

/// One unit of orchestration work, either a top-level job or a subtask.
///
/// Authors implement `run` as a sequential body. A top-level task builds
/// subtask groups through the [`TaskContext`] and invokes
/// [`TaskContext::run_groups`] exactly once; a subtask typically ignores the
/// context apart from cooperative abort checks at its natural suspension
/// points.
#[async_trait]
pub trait Task: Send + Sync {
    /// Registered type tag of this task.
    fn task_type(&self) -> TaskType;

    /// Human-readable name used in logs and error strings.
    fn name(&self) -> String {
        self.task_type().to_string()
    }

    /// Bind parameters. Called once, before the task is wrapped in a
    /// runnable.
    fn initialize(&mut self, params: Value) -> Result<()>;

    /// Current parameter blob; persisted (in redacted form) into the task
    /// record.
    fn params(&self) -> Value;

    /// The task body. Errors map the record to `Failure`; returning
    /// [`ExecutorError::Cancelled`](crate::ExecutorError::Cancelled) maps it
    /// to `Aborted`.
    async fn run(&self, ctx: &TaskContext) -> Result<()>;

    /// Cleanup hook invoked on every exit path, after the terminal state has
    /// been written.
    async fn terminate(&self) {}
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{ExecutorError, Result};
use crate::models::TaskState;
use crate::task::Task;

use super::listener::{publish_after, publish_before};
use super::record_handle::RecordHandle;
use super::{ExecutionListener, ExecutorContext, TaskContext};

/// Shared worker-side lifecycle for top-level tasks and subtasks: state
/// updates around the user `run`, duration metrics, listener callbacks and
/// the terminate hook on every exit path.
pub(crate) struct TaskRunner {
    pub task: Box<dyn Task>,
    pub record: RecordHandle,
    pub exec_ctx: Arc<ExecutorContext>,
    is_subtask: bool,
}

impl TaskRunner {
    pub fn top_level(task: Box<dyn Task>, record: RecordHandle, exec_ctx: Arc<ExecutorContext>) -> Self {
        Self {
            task,
            record,
            exec_ctx,
            is_subtask: false,
        }
    }

    pub fn subtask(task: Box<dyn Task>, record: RecordHandle, exec_ctx: Arc<ExecutorContext>) -> Self {
        Self {
            task,
            record,
            exec_ctx,
            is_subtask: true,
        }
    }

    /// Worker-side body. `abort_requested` is resolved by the caller at
    /// entry; a task that observes it transitions straight to `Aborted`
    /// without running.
    pub async fn execute(
        &self,
        abort_requested: bool,
        listener: Option<&Arc<dyn ExecutionListener>>,
        ctx: &TaskContext,
    ) -> Result<()> {
        let started = self.record.mark_started().await;
        if !self.is_subtask {
            let snapshot = self.record.snapshot().await;
            if let (Some(scheduled), Some(started)) = (snapshot.scheduled_at, snapshot.started_at) {
                self.exec_ctx
                    .telemetry
                    .observe_wait(self.record.task_type(), duration_secs(scheduled, started));
            }
        }

        let result = match started {
            Ok(()) => self.execute_inner(abort_requested, listener, ctx).await,
            Err(cause) => {
                let _ = self.record.update_on_error(TaskState::Failure, &cause).await;
                Err(cause)
            }
        };

        // Finalize on all exits: completion metric, after-task listener,
        // terminate hook.
        let terminal = self.record.snapshot().await;
        let execution_secs = match (terminal.started_at, terminal.completed_at) {
            (Some(started), Some(completed)) => duration_secs(started, completed),
            _ => 0.0,
        };
        self.exec_ctx
            .telemetry
            .observe_execution(self.record.task_type(), terminal.state, execution_secs);
        publish_after(listener, &terminal, result.as_ref().err());
        self.task.terminate().await;
        result
    }

    async fn execute_inner(
        &self,
        abort_requested: bool,
        listener: Option<&Arc<dyn ExecutionListener>>,
        ctx: &TaskContext,
    ) -> Result<()> {
        if abort_requested {
            let cause =
                ExecutorError::Cancelled(format!("task {} is aborted", self.task.name()));
            let _ = self.record.update_on_error(TaskState::Aborted, &cause).await;
            return Err(cause);
        }

        let snapshot = self.record.snapshot().await;
        if let Err(cause) = publish_before(listener, &snapshot) {
            let state = error_state(&cause);
            let _ = self.record.update_on_error(state, &cause).await;
            return Err(cause);
        }

        self.record.set_state(TaskState::Running).await?;
        debug!("invoking run() of task {}", self.task.name());
        match self.task.run(ctx).await {
            Ok(()) => {
                self.record.set_state(TaskState::Success).await?;
                Ok(())
            }
            Err(cause) => {
                let _ = self.record.update_on_error(error_state(&cause), &cause).await;
                Err(cause)
            }
        }
    }
}

fn error_state(cause: &ExecutorError) -> TaskState {
    if cause.is_cancelled() {
        TaskState::Aborted
    } else {
        TaskState::Failure
    }
}

pub(crate) fn duration_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds().max(0) as f64 / 1000.0
}

use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{ExecutorError, Result};
use crate::models::{TaskRecord, TaskState, TaskType};
use crate::task::Task;

use super::record_handle::RecordHandle;
use super::runner::TaskRunner;
use super::runnable_task::RunnableTask;
use super::{ExecutorContext, TaskContext, WorkerPool};

/// One unit of work inside a subtask group: the user task, its durable
/// record and the handle of its in-flight future.
///
/// Constructed internally by [`SubTaskGroup::add_subtask`](super::SubTaskGroup::add_subtask);
/// authors never build one directly.
pub struct RunnableSubTask {
    runner: TaskRunner,
    parent: OnceLock<Weak<RunnableTask>>,
    handle: Mutex<Option<JoinHandle<Result<()>>>>,
    time_limit: Duration,
}

impl RunnableSubTask {
    pub(crate) fn new(
        task: Box<dyn Task>,
        record: TaskRecord,
        exec_ctx: Arc<ExecutorContext>,
    ) -> Self {
        let time_limit = record.time_limit();
        let record = RecordHandle::new(record, Arc::clone(&exec_ctx.store));
        Self {
            runner: TaskRunner::subtask(task, record, exec_ctx),
            parent: OnceLock::new(),
            handle: Mutex::new(None),
            time_limit,
        }
    }

    pub fn id(&self) -> Uuid {
        self.runner.record.id()
    }

    pub fn task_type(&self) -> &TaskType {
        self.runner.record.task_type()
    }

    /// Time limit parsed from the payload; zero means unbounded.
    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    pub(crate) fn record(&self) -> &RecordHandle {
        &self.runner.record
    }

    pub(crate) fn bind_parent(&self, parent: &Arc<RunnableTask>) {
        let _ = self.parent.set(Arc::downgrade(parent));
    }

    fn parent(&self) -> Option<Arc<RunnableTask>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// Stamp the scheduling time and hand the execution body to the pool.
    /// On a submission error the record is transitioned to Failure and the
    /// after-task listener fires before the error is returned; the caller
    /// keeps submitting the remaining group members.
    pub(crate) async fn submit_to(self: &Arc<Self>, pool: &WorkerPool) -> Result<()> {
        let submission = async {
            self.runner.record.mark_scheduled().await?;
            let this = Arc::clone(self);
            let handle = pool.submit(async move { this.execute().await })?;
            *self.handle.lock().expect("subtask handle lock poisoned") = Some(handle);
            Ok(())
        }
        .await;

        if let Err(cause) = &submission {
            let _ = self
                .runner
                .record
                .update_on_error(TaskState::Failure, cause)
                .await;
            self.publish_after(Some(cause)).await;
        }
        submission
    }

    async fn execute(self: Arc<Self>) -> Result<()> {
        let parent = self.parent();
        let abort_requested = parent
            .as_ref()
            .map(|p| p.abort_time().is_some())
            .unwrap_or(false);
        let listener = parent.as_ref().and_then(|p| p.listener());
        let ctx = match parent.as_ref() {
            Some(parent) => TaskContext::new(parent),
            None => TaskContext::detached(self.id()),
        };
        self.runner.execute(abort_requested, listener.as_ref(), &ctx).await
    }

    /// Take the future handle for the group wait; `None` if submission
    /// failed or the handle was already claimed.
    pub(crate) fn take_handle(&self) -> Option<JoinHandle<Result<()>>> {
        self.handle.lock().expect("subtask handle lock poisoned").take()
    }

    /// Fire the parent's after-task listener with this subtask's record.
    pub(crate) async fn publish_after(&self, error: Option<&ExecutorError>) {
        if let Some(parent) = self.parent() {
            let listener = parent.listener();
            let snapshot = self.runner.record.snapshot().await;
            super::listener::publish_after(listener.as_ref(), &snapshot, error);
        }
    }
}

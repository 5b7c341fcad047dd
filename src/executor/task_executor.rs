//! # Task Executor
//!
//! The coordinator facade: constructs runnables from registered task types,
//! submits them to worker pools, tracks them in the live-tasks map, and
//! exposes abort, wait and drain-on-shutdown.
//!
//! A task is submitted by first creating a runnable:
//!
//! ```no_run
//! # use conductor_core::*;
//! # use std::sync::Arc;
//! # async fn example(executor: Arc<TaskExecutor>, pool: Arc<WorkerPool>) -> Result<()> {
//! let runnable = executor
//!     .create_runnable(&TaskType::from("upgrade_software"), serde_json::json!({}))
//!     .await?;
//! let task_id = executor.submit(runnable, &pool).await?;
//! executor.wait_for(task_id).await?;
//! # Ok(())
//! # }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{ExecutorError, Result};
use crate::models::{GroupType, TaskRecord, TaskState, TaskType};
use crate::redaction::redact_payload;

use super::drainable_map::DrainableMap;
use super::group::SubTaskGroup;
use super::runnable_task::RunnableTask;
use super::{ExecutorContext, WorkerPool};

pub struct TaskExecutor {
    context: Arc<ExecutorContext>,
    live_tasks: Arc<DrainableMap<Uuid, Arc<RunnableTask>>>,
    is_shutdown: AtomicBool,
}

impl TaskExecutor {
    pub fn new(context: ExecutorContext) -> Arc<Self> {
        Arc::new(Self {
            context: Arc::new(context),
            live_tasks: Arc::new(DrainableMap::new()),
            is_shutdown: AtomicBool::new(false),
        })
    }

    pub fn context(&self) -> &ExecutorContext {
        &self.context
    }

    /// Construct a runnable for a registered task type: build the task,
    /// bind its params, persist the fresh record at position -1.
    pub async fn create_runnable(
        &self,
        task_type: &TaskType,
        params: Value,
    ) -> Result<Arc<RunnableTask>> {
        let mut task = self.context.registry.create(task_type)?;
        task.initialize(params)?;

        let payload = redact_payload(&task.params());
        let record = TaskRecord::new(task_type.clone(), payload, &self.context.config.owner);
        let runnable = RunnableTask::new(task, record, Arc::clone(&self.context));
        runnable.record_handle().save().await?;
        runnable
            .record_handle()
            .set_state(TaskState::Initializing)
            .await?;
        Ok(runnable)
    }

    /// Submit a runnable for execution on the given pool and return its
    /// task id. Fails with [`ExecutorError::ShuttingDown`] once shutdown
    /// has begun; a submission failure removes the task from the live map
    /// and flags its record Failure.
    pub async fn submit(&self, runnable: Arc<RunnableTask>, pool: &WorkerPool) -> Result<Uuid> {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(ExecutorError::ShuttingDown);
        }
        let task_id = runnable.id();
        if !self.live_tasks.insert(task_id, Arc::clone(&runnable)) {
            if self.live_tasks.is_sealed() {
                return Err(ExecutorError::ShuttingDown);
            }
            return Err(ExecutorError::Submission(format!(
                "task {task_id} is already submitted"
            )));
        }

        let submission = async {
            runnable.record_handle().mark_scheduled().await?;
            let wrapper = {
                let runnable = Arc::clone(&runnable);
                let live_tasks = Arc::clone(&self.live_tasks);
                let hooks = Arc::clone(&self.context.hooks);
                async move {
                    let result = match AssertUnwindSafe(Arc::clone(&runnable).run())
                        .catch_unwind()
                        .await
                    {
                        Ok(result) => result,
                        Err(_panic) => {
                            let cause = ExecutorError::TaskFailed(format!(
                                "task {} panicked",
                                runnable.id()
                            ));
                            let _ = runnable
                                .record_handle()
                                .update_on_error(TaskState::Failure, &cause)
                                .await;
                            Err(cause)
                        }
                    };
                    // Completion path on every exit: leave the live map
                    // first so external observers of the terminal state
                    // never see the task as still in flight.
                    live_tasks.remove(&runnable.id());
                    let record = runnable.record().await;
                    hooks.task_completed(&record).await;
                    hooks.replication_sync().await;
                    runnable.set_outcome(result.clone());
                    result
                }
            };
            pool.submit(wrapper).map(|_handle| ())
        }
        .await;

        if let Err(cause) = submission {
            self.live_tasks.remove(&task_id);
            if let Err(e) = runnable
                .record_handle()
                .update_on_error(TaskState::Failure, &cause)
                .await
            {
                error!(task_id = %task_id, "failed to record submission error: {e}");
            }
            return Err(cause);
        }
        info!(task_id = %task_id, task_type = %runnable.task_type(), "task submitted");
        Ok(task_id)
    }

    /// Block until the task completes. Returns immediately if the task is
    /// not in flight (completed or never existed); execution errors are
    /// unwrapped to their cause.
    pub async fn wait_for(&self, task_id: Uuid) -> Result<()> {
        self.wait(task_id, None).await
    }

    /// Like [`wait_for`](Self::wait_for), giving up with
    /// [`ExecutorError::Timeout`] after `timeout`. The task itself is not
    /// affected.
    pub async fn wait_for_timeout(&self, task_id: Uuid, timeout: Duration) -> Result<()> {
        self.wait(task_id, Some(timeout)).await
    }

    async fn wait(&self, task_id: Uuid, timeout: Option<Duration>) -> Result<()> {
        let Some(runnable) = self.live_tasks.get(&task_id) else {
            return Ok(());
        };
        runnable.wait_for_outcome(timeout).await
    }

    /// Signal a running task to abort. Returns `None` if the task is not in
    /// flight, fails with [`ExecutorError::NotAbortable`] if its type lacks
    /// the abortable marker. Idempotent: repeated calls observe the first
    /// abort instant. Running subtasks are cancelled cooperatively after
    /// the abort grace.
    pub async fn abort(&self, task_id: Uuid) -> Result<Option<TaskRecord>> {
        info!(task_id = %task_id, "aborting task");
        let Some(runnable) = self.live_tasks.get(&task_id) else {
            info!(task_id = %task_id, "task is not found; it is either completed or non-existing");
            return Ok(None);
        };
        if !self.context.registry.is_abortable(runnable.task_type()) {
            return Err(ExecutorError::NotAbortable(runnable.task_type().clone()));
        }
        runnable.signal_abort(Instant::now());
        runnable
            .record_handle()
            .compare_and_set_state(
                &[
                    TaskState::Initializing,
                    TaskState::Created,
                    TaskState::Running,
                ],
                TaskState::Aborted,
            )
            .await?;
        Ok(Some(runnable.record().await))
    }

    /// Drain: seal the live-tasks map so nothing new enters, broadcast the
    /// abort signal to every in-flight task, then wait up to `timeout` for
    /// the map to empty. Idempotent; a later call with any timeout returns
    /// true immediately once the map is empty. Worker pools are shut down
    /// separately by their owners.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        if self
            .is_shutdown
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!("task executor is shutting down");
            self.live_tasks.seal();
            let abort_time = Instant::now();
            self.live_tasks.for_each(|_, runnable| {
                runnable.signal_abort(abort_time);
            });
        }
        self.live_tasks.wait_until_empty(Some(timeout)).await
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    /// The in-flight runnable for a task id; fails if it is not present.
    pub fn get_runnable(&self, task_id: Uuid) -> Result<Arc<RunnableTask>> {
        self.live_tasks
            .get(&task_id)
            .ok_or(ExecutorError::TaskNotFound(task_id))
    }

    pub fn is_task_running(&self, task_id: Uuid) -> bool {
        self.live_tasks.contains_key(&task_id)
    }

    /// Create a group with no phase tag and errors propagating.
    pub fn create_group(&self, name: impl Into<String>) -> Arc<SubTaskGroup> {
        self.create_group_with(name, GroupType::Invalid, false)
    }

    pub fn create_group_with(
        &self,
        name: impl Into<String>,
        group_type: GroupType,
        ignore_errors: bool,
    ) -> Arc<SubTaskGroup> {
        SubTaskGroup::new(name, group_type, ignore_errors, Arc::clone(&self.context))
    }

    pub fn is_abortable(&self, task_type: &TaskType) -> bool {
        self.context.registry.is_abortable(task_type)
    }

    pub fn is_retryable(&self, task_type: &TaskType) -> bool {
        self.context.registry.is_retryable(task_type)
    }

    /// Register `shutdown` with the process teardown: a background task
    /// drains the executor on ctrl-c using the configured timeout.
    pub fn install_shutdown_hook(self: &Arc<Self>) {
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let timeout = executor.context.config.shutdown_timeout;
                let drained = executor.shutdown(timeout).await;
                if !drained {
                    error!("executor did not drain within {:?}", timeout);
                }
            }
        });
    }
}

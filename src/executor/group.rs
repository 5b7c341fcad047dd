//! Subtask groups: the unit of concurrency inside a task.
//!
//! A group is an in-memory collection of subtasks executed concurrently on
//! one worker pool. The owning task runs its groups strictly in attachment
//! order; within a group the wait policy is a cooperative round-robin poll
//! that enforces per-subtask time limits and the abort grace.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ExecutorError, Result};
use crate::models::{GroupType, TaskRecord, TaskState};
use crate::redaction::redact_payload;
use crate::task::Task;

use super::runnable_task::RunnableTask;
use super::subtask::RunnableSubTask;
use super::{ExecutorContext, WorkerPool};

/// A named set of subtasks executed concurrently, plus the group policy:
/// the phase tag applied to every member record, whether member failures
/// propagate to the parent, and an optional dedicated worker pool.
pub struct SubTaskGroup {
    name: String,
    group_type: GroupType,
    ignore_errors: bool,
    exec_ctx: Arc<ExecutorContext>,
    subtasks: Mutex<Vec<Arc<RunnableSubTask>>>,
    total_count: AtomicUsize,
    completed_count: AtomicUsize,
    pool: Mutex<Option<Arc<WorkerPool>>>,
    attached: AtomicBool,
}

impl SubTaskGroup {
    pub(crate) fn new(
        name: impl Into<String>,
        group_type: GroupType,
        ignore_errors: bool,
        exec_ctx: Arc<ExecutorContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            group_type,
            ignore_errors,
            exec_ctx,
            subtasks: Mutex::new(Vec::new()),
            total_count: AtomicUsize::new(0),
            completed_count: AtomicUsize::new(0),
            pool: Mutex::new(None),
            attached: AtomicBool::new(false),
        })
    }

    /// Add an initialized subtask. The subtask stays in memory until the
    /// group is attached to a task, at which point its record is persisted
    /// with the group's position.
    pub fn add_subtask(&self, task: Box<dyn Task>) -> Result<()> {
        if self.attached.load(Ordering::Acquire) {
            return Err(ExecutorError::Submission(format!(
                "subtask group {} is already attached",
                self.name
            )));
        }
        let index = self.total_count.fetch_add(1, Ordering::AcqRel);
        info!("adding subtask #{index}: {}", task.name());

        let payload = redact_payload(&task.params());
        let mut record = TaskRecord::new(task.task_type(), payload, &self.exec_ctx.config.owner);
        record.group_type = self.group_type;
        let subtask = Arc::new(RunnableSubTask::new(
            task,
            record,
            Arc::clone(&self.exec_ctx),
        ));
        self.subtasks
            .lock()
            .expect("subtask set lock poisoned")
            .push(subtask);
        Ok(())
    }

    /// Dedicate a worker pool to this group. Without one, the provider
    /// chooses a pool from the parent task's type at execution time.
    pub fn set_pool(&self, pool: Arc<WorkerPool>) {
        *self.pool.lock().expect("group pool lock poisoned") = Some(pool);
    }

    pub(crate) fn pool(&self) -> Option<Arc<WorkerPool>> {
        self.pool.lock().expect("group pool lock poisoned").clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_type(&self) -> GroupType {
        self.group_type
    }

    pub fn ignore_errors(&self) -> bool {
        self.ignore_errors
    }

    /// Number of subtasks ever added to this group.
    pub fn subtask_count(&self) -> usize {
        self.total_count.load(Ordering::Acquire)
    }

    /// Number of subtasks that finished waiting, on any path.
    pub fn completed_count(&self) -> usize {
        self.completed_count.load(Ordering::Acquire)
    }

    /// Bind every member to the parent task and persist its record with the
    /// assigned group position.
    pub(crate) async fn attach(&self, parent: &Arc<RunnableTask>, position: i32) -> Result<()> {
        self.attached.store(true, Ordering::Release);
        let members = self.members();
        for subtask in members {
            subtask.bind_parent(parent);
            subtask
                .record()
                .attach_to_parent(parent.id(), position, self.group_type)
                .await?;
        }
        Ok(())
    }

    /// Submit every member to the pool. A member whose submission fails is
    /// already flagged Failure by the subtask itself; submission of the
    /// remaining members continues and the first error is returned.
    pub(crate) async fn submit_all(&self, pool: &Arc<WorkerPool>) -> Result<()> {
        let mut first_error = None;
        for subtask in self.members() {
            if let Err(cause) = subtask.submit_to(pool).await {
                warn!(
                    subtask_id = %subtask.id(),
                    "subtask submission failed, continuing with remaining members: {cause}"
                );
                first_error.get_or_insert(cause);
            }
        }
        match first_error {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }

    /// Round-robin over the members with in-flight futures, polling each
    /// with the spin interval. Completion on any path removes the member
    /// and fires the after-task listener; time limits and the abort grace
    /// are enforced here because the subtask body cannot be trusted to
    /// observe them. Returns the first error seen once the set drains.
    pub(crate) async fn wait_for_completion(&self, parent: &RunnableTask) -> Result<()> {
        let config = &self.exec_ctx.config;
        let wait_started = Instant::now();
        let mut pending: Vec<(Arc<RunnableSubTask>, JoinHandle<Result<()>>)> = self
            .members()
            .into_iter()
            .filter_map(|s| s.take_handle().map(|h| (s, h)))
            .collect();
        let mut first_error: Option<ExecutorError> = None;

        while !pending.is_empty() {
            let mut still_running = Vec::with_capacity(pending.len());
            for (subtask, mut handle) in pending {
                match tokio::time::timeout(config.spin_interval, &mut handle).await {
                    Ok(Ok(Ok(()))) => {
                        self.complete_member(&subtask, None).await;
                    }
                    Ok(Ok(Err(cause))) => {
                        // State was already written by the subtask body.
                        first_error.get_or_insert(cause.clone());
                        self.complete_member(&subtask, Some(&cause)).await;
                    }
                    Ok(Err(join_error)) => {
                        let (state, cause) = if join_error.is_cancelled() {
                            (
                                TaskState::Aborted,
                                ExecutorError::Cancelled(format!(
                                    "subtask {} was cancelled",
                                    subtask.id()
                                )),
                            )
                        } else {
                            (
                                TaskState::Failure,
                                ExecutorError::TaskFailed(format!(
                                    "subtask {} panicked: {join_error}",
                                    subtask.id()
                                )),
                            )
                        };
                        if let Err(e) = subtask.record().update_on_error(state, &cause).await {
                            warn!(subtask_id = %subtask.id(), "state update failed: {e}");
                        }
                        first_error.get_or_insert(cause.clone());
                        self.complete_member(&subtask, Some(&cause)).await;
                    }
                    Err(_spin_elapsed) => {
                        let elapsed = wait_started.elapsed();
                        debug!(
                            group = %self.name,
                            subtask_id = %subtask.id(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            "subtask still running"
                        );
                        let time_limit = subtask.time_limit();
                        if !time_limit.is_zero() && elapsed > time_limit {
                            handle.abort();
                            let cause = ExecutorError::Timeout(format!(
                                "subtask {} exceeded its time limit of {}s",
                                subtask.id(),
                                time_limit.as_secs()
                            ));
                            if let Err(e) =
                                subtask.record().update_on_error(TaskState::Aborted, &cause).await
                            {
                                warn!(subtask_id = %subtask.id(), "state update failed: {e}");
                            }
                            first_error.get_or_insert(cause.clone());
                            self.complete_member(&subtask, Some(&cause)).await;
                        } else if self.should_cancel_on_abort(parent, &subtask) {
                            handle.abort();
                            let cause = ExecutorError::Cancelled(format!(
                                "subtask {} cancelled after abort grace",
                                subtask.id()
                            ));
                            if let Err(e) =
                                subtask.record().update_on_error(TaskState::Aborted, &cause).await
                            {
                                warn!(subtask_id = %subtask.id(), "state update failed: {e}");
                            }
                            first_error.get_or_insert(cause.clone());
                            self.complete_member(&subtask, Some(&cause)).await;
                        } else {
                            still_running.push((subtask, handle));
                        }
                    }
                }
            }
            pending = still_running;
        }

        match first_error {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }

    /// Forced cancellation is allowed once the abort grace has elapsed and
    /// either the policy skips the abortable check or the subtask's type is
    /// marked abortable.
    fn should_cancel_on_abort(&self, parent: &RunnableTask, subtask: &RunnableSubTask) -> bool {
        let Some(abort_time) = parent.abort_time() else {
            return false;
        };
        if abort_time.elapsed() <= self.exec_ctx.config.abort_grace {
            return false;
        }
        self.exec_ctx.config.skip_subtask_abortable_check
            || self.exec_ctx.registry.is_abortable(subtask.task_type())
    }

    async fn complete_member(&self, subtask: &Arc<RunnableSubTask>, error: Option<&ExecutorError>) {
        if let Some(cause) = error {
            error!(subtask_id = %subtask.id(), "error occurred in subtask: {cause}");
        }
        self.subtasks
            .lock()
            .expect("subtask set lock poisoned")
            .retain(|s| !Arc::ptr_eq(s, subtask));
        self.completed_count.fetch_add(1, Ordering::AcqRel);
        subtask.publish_after(error).await;
    }

    fn members(&self) -> Vec<Arc<RunnableSubTask>> {
        self.subtasks
            .lock()
            .expect("subtask set lock poisoned")
            .clone()
    }
}

impl fmt::Display for SubTaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} : completed {} out of {} tasks",
            self.name,
            self.completed_count(),
            self.subtask_count()
        )
    }
}

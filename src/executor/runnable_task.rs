//! The top-level job wrapper: owns the ordered group queue, the abort
//! signal, the execution listener and the completion broadcast.

use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{ExecutorError, Result};
use crate::models::{TaskRecord, TaskType};
use crate::task::Task;

use super::group::SubTaskGroup;
use super::record_handle::RecordHandle;
use super::runner::TaskRunner;
use super::{ExecutionListener, ExecutorContext, TaskContext};

struct GroupQueue {
    queue: Vec<Arc<SubTaskGroup>>,
    next_position: i32,
}

/// A submitted (or submittable) top-level task.
///
/// Created through [`TaskExecutor::create_runnable`](super::TaskExecutor::create_runnable);
/// lives in the executor's live-tasks map from submission until completion.
pub struct RunnableTask {
    runner: TaskRunner,
    groups: Mutex<GroupQueue>,
    abort_time: OnceLock<Instant>,
    listener: RwLock<Option<Arc<dyn ExecutionListener>>>,
    outcome_tx: watch::Sender<Option<Result<()>>>,
    outcome_rx: watch::Receiver<Option<Result<()>>>,
}

impl std::fmt::Debug for RunnableTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnableTask").field("id", &self.id()).finish()
    }
}

impl RunnableTask {
    pub(crate) fn new(
        task: Box<dyn Task>,
        record: TaskRecord,
        exec_ctx: Arc<ExecutorContext>,
    ) -> Arc<Self> {
        let record = RecordHandle::new(record, Arc::clone(&exec_ctx.store));
        let (outcome_tx, outcome_rx) = watch::channel(None);
        Arc::new(Self {
            runner: TaskRunner::top_level(task, record, exec_ctx),
            groups: Mutex::new(GroupQueue {
                queue: Vec::new(),
                next_position: 0,
            }),
            abort_time: OnceLock::new(),
            listener: RwLock::new(None),
            outcome_tx,
            outcome_rx,
        })
    }

    pub fn id(&self) -> Uuid {
        self.runner.record.id()
    }

    pub fn task_type(&self) -> &TaskType {
        self.runner.record.task_type()
    }

    /// Current snapshot of the durable record.
    pub async fn record(&self) -> TaskRecord {
        self.runner.record.snapshot().await
    }

    pub(crate) fn record_handle(&self) -> &RecordHandle {
        &self.runner.record
    }

    pub(crate) fn exec_ctx(&self) -> &Arc<ExecutorContext> {
        &self.runner.exec_ctx
    }

    /// Register callbacks fired around this task and each of its subtasks.
    pub fn set_listener(&self, listener: Arc<dyn ExecutionListener>) {
        *self.listener.write().expect("listener lock poisoned") = Some(listener);
    }

    pub(crate) fn listener(&self) -> Option<Arc<dyn ExecutionListener>> {
        self.listener.read().expect("listener lock poisoned").clone()
    }

    /// Instant at which abort was requested, if any.
    pub fn abort_time(&self) -> Option<Instant> {
        self.abort_time.get().copied()
    }

    /// Set the abort time once; later calls observe the first instant.
    pub(crate) fn signal_abort(&self, at: Instant) -> Instant {
        *self.abort_time.get_or_init(|| at)
    }

    /// Attach a group at the next position: every member's parent link and
    /// position are persisted, then the group joins the run queue. Not
    /// thread-safe against a concurrent `run_groups`.
    pub async fn add_group(self: &Arc<Self>, group: Arc<SubTaskGroup>) -> Result<()> {
        let position = {
            let mut groups = self.groups.lock().expect("group queue lock poisoned");
            let position = groups.next_position;
            groups.next_position += 1;
            position
        };
        info!("adding subtask group #{position}: {}", group.name());
        group.attach(self, position).await?;
        self.groups
            .lock()
            .expect("group queue lock poisoned")
            .queue
            .push(group);
        Ok(())
    }

    /// Attach a group at an explicit position, overriding the counter.
    /// Used when resumed work is inserted into an existing sequence.
    pub async fn add_group_at(self: &Arc<Self>, group: Arc<SubTaskGroup>, position: i32) -> Result<()> {
        self.groups
            .lock()
            .expect("group queue lock poisoned")
            .next_position = position;
        self.add_group(group).await
    }

    /// Execute the attached groups in order, invoked exactly once from
    /// inside the task's `run`.
    ///
    /// Policy: a group error propagates after that group's wait has
    /// returned and stops later groups, unless the group ignores errors, in
    /// which case the error is logged and iteration continues. Cancellation
    /// propagates immediately. A member submission error fails the overall
    /// call regardless of the ignore-errors flag.
    pub async fn run_groups(self: &Arc<Self>) -> Result<()> {
        let groups: Vec<Arc<SubTaskGroup>> = self
            .groups
            .lock()
            .expect("group queue lock poisoned")
            .queue
            .clone();

        let mut deferred_error: Option<ExecutorError> = None;
        for group in groups {
            if group.subtask_count() == 0 {
                debug!("skipping empty subtask group {}", group.name());
                continue;
            }

            let pool = match group.pool() {
                Some(pool) => pool,
                None => {
                    let pool = self.runner.exec_ctx.provider.pool_for(self.task_type());
                    group.set_pool(Arc::clone(&pool));
                    pool
                }
            };

            let submit_result = group.submit_all(&pool).await;
            // Wait for already-submitted members even when a submission
            // failed part-way through the group.
            let wait_result = group.wait_for_completion(self).await;

            if let Err(cause) = submit_result {
                deferred_error.get_or_insert(cause);
                break;
            }
            match wait_result {
                Ok(()) => {}
                Err(cause) if cause.is_cancelled() => {
                    return Err(ExecutorError::Cancelled(format!("{group} is cancelled")));
                }
                Err(cause) => {
                    if group.ignore_errors() {
                        error!("ignoring error for {group}: {cause}");
                    } else {
                        deferred_error =
                            Some(ExecutorError::TaskFailed(format!("{group} failed: {cause}")));
                        break;
                    }
                }
            }
        }

        match deferred_error {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }

    /// Clear the group queue and reset the position counter so a retryable
    /// task can be replayed. Persisted subtask records from the previous
    /// attempt are left to the replayer.
    pub fn reset(&self) {
        let mut groups = self.groups.lock().expect("group queue lock poisoned");
        groups.queue.clear();
        groups.next_position = 0;
    }

    /// Bump the record's modified timestamp as a liveness signal.
    pub async fn heartbeat(&self) -> Result<()> {
        debug!(task_id = %self.id(), "heartbeating task");
        self.runner.record.heartbeat().await
    }

    /// Persist updated params mid-run, in redacted form.
    pub async fn set_payload(&self, payload: Value) -> Result<()> {
        self.runner.record.set_payload(payload).await
    }

    /// Worker-side entry; invoked by the executor's submission wrapper.
    pub(crate) async fn run(self: Arc<Self>) -> Result<()> {
        let ctx = TaskContext::new(&self);
        let abort_requested = self.abort_time().is_some();
        let listener = self.listener();
        self.runner.execute(abort_requested, listener.as_ref(), &ctx).await
    }

    pub(crate) fn set_outcome(&self, outcome: Result<()>) {
        self.outcome_tx.send_replace(Some(outcome));
    }

    /// Block until the task completes, or until `timeout` elapses. Multiple
    /// waiters are allowed; each receives a clone of the outcome.
    pub(crate) async fn wait_for_outcome(&self, timeout: Option<Duration>) -> Result<()> {
        let mut rx = self.outcome_rx.clone();
        let wait = async move {
            loop {
                if let Some(outcome) = rx.borrow_and_update().clone() {
                    return outcome;
                }
                if rx.changed().await.is_err() {
                    return Err(ExecutorError::TaskFailed(
                        "task outcome channel closed".to_string(),
                    ));
                }
            }
        };
        match timeout {
            None => wait.await,
            Some(timeout) => match tokio::time::timeout(timeout, wait).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ExecutorError::Timeout(format!(
                    "waiting for task {}",
                    self.id()
                ))),
            },
        }
    }
}

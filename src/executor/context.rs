use std::sync::{Arc, Weak};

use serde_json::Value;
use uuid::Uuid;

use crate::error::{ExecutorError, Result};
use crate::models::GroupType;

use super::group::SubTaskGroup;
use super::runnable_task::RunnableTask;

/// The surface a task body sees: group construction and attachment, the
/// group run loop, heartbeat and cooperative abort checks.
///
/// A subtask receives a context bound to its parent task, so abort checks
/// and heartbeats act on the owning job.
pub struct TaskContext {
    task_id: Uuid,
    task: Weak<RunnableTask>,
}

impl TaskContext {
    pub(crate) fn new(task: &Arc<RunnableTask>) -> Self {
        Self {
            task_id: task.id(),
            task: Arc::downgrade(task),
        }
    }

    /// Context for a subtask whose parent is no longer reachable; abort
    /// checks report false and group operations fail.
    pub(crate) fn detached(task_id: Uuid) -> Self {
        Self {
            task_id,
            task: Weak::new(),
        }
    }

    /// Id of the top-level task this context is bound to.
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Create an empty group with no phase tag and errors propagating.
    pub fn create_group(&self, name: impl Into<String>) -> Result<Arc<SubTaskGroup>> {
        self.create_group_with(name, GroupType::Invalid, false)
    }

    pub fn create_group_with(
        &self,
        name: impl Into<String>,
        group_type: GroupType,
        ignore_errors: bool,
    ) -> Result<Arc<SubTaskGroup>> {
        let task = self.task()?;
        Ok(SubTaskGroup::new(
            name,
            group_type,
            ignore_errors,
            Arc::clone(task.exec_ctx()),
        ))
    }

    pub async fn add_group(&self, group: Arc<SubTaskGroup>) -> Result<()> {
        self.task()?.add_group(group).await
    }

    pub async fn add_group_at(&self, group: Arc<SubTaskGroup>, position: i32) -> Result<()> {
        self.task()?.add_group_at(group, position).await
    }

    /// Run the attached groups in order; see
    /// [`RunnableTask::run_groups`] for the error policy.
    pub async fn run_groups(&self) -> Result<()> {
        self.task()?.run_groups().await
    }

    /// Clear attached groups and the position counter for a replay.
    pub fn reset(&self) -> Result<()> {
        self.task()?.reset();
        Ok(())
    }

    pub async fn heartbeat(&self) -> Result<()> {
        self.task()?.heartbeat().await
    }

    /// Whether an abort has been requested for the owning task. Task bodies
    /// are expected to check this at natural suspension points and return
    /// [`ExecutorError::Cancelled`] promptly.
    pub fn abort_requested(&self) -> bool {
        self.task
            .upgrade()
            .map(|t| t.abort_time().is_some())
            .unwrap_or(false)
    }

    /// Persist updated task params mid-run, redacted.
    pub async fn set_payload(&self, payload: Value) -> Result<()> {
        self.task()?.set_payload(payload).await
    }

    fn task(&self) -> Result<Arc<RunnableTask>> {
        self.task
            .upgrade()
            .ok_or(ExecutorError::TaskNotFound(self.task_id))
    }
}

//! Per-record write-through wrapper.
//!
//! Every mutation of a [`TaskRecord`] goes through a handle that holds the
//! record behind an async mutex and writes it to the store before releasing
//! the lock, so a transition and its persistence are atomic and writes for
//! one record are serialized.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{ExecutorError, Result};
use crate::models::{GroupType, TaskRecord, TaskState, TaskType};
use crate::redaction::{format_task_error, redact_payload};
use crate::store::TaskStore;

pub(crate) struct RecordHandle {
    id: Uuid,
    task_type: TaskType,
    record: tokio::sync::Mutex<TaskRecord>,
    store: Arc<dyn TaskStore>,
}

impl RecordHandle {
    pub fn new(record: TaskRecord, store: Arc<dyn TaskStore>) -> Self {
        Self {
            id: record.id,
            task_type: record.task_type.clone(),
            record: tokio::sync::Mutex::new(record),
            store,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    pub async fn snapshot(&self) -> TaskRecord {
        self.record.lock().await.clone()
    }

    pub async fn state(&self) -> TaskState {
        self.record.lock().await.state
    }

    /// Initial persistence of the record.
    pub async fn save(&self) -> Result<()> {
        let record = self.record.lock().await;
        self.store.save(&record).await
    }

    /// Transition to `next` and write through. Illegal transitions (per the
    /// state graph) are logged and skipped; returns whether the record now
    /// carries `next`.
    pub async fn set_state(&self, next: TaskState) -> Result<bool> {
        let mut record = self.record.lock().await;
        let current = record.state;
        if current == next {
            return Ok(true);
        }
        if !current.can_transition_to(next) {
            warn!(
                task_id = %self.id,
                %current,
                %next,
                "ignoring illegal state transition"
            );
            return Ok(false);
        }
        record.state = next;
        if next.is_terminal() && record.completed_at.is_none() {
            record.completed_at = Some(Utc::now());
        }
        self.store.update(&record).await?;
        Ok(true)
    }

    /// Transition to `next` only if the current state is one of `expected`.
    pub async fn compare_and_set_state(
        &self,
        expected: &[TaskState],
        next: TaskState,
    ) -> Result<bool> {
        let mut record = self.record.lock().await;
        let current = record.state;
        if !expected.contains(&current) || !current.can_transition_to(next) {
            return Ok(false);
        }
        record.state = next;
        if next.is_terminal() && record.completed_at.is_none() {
            record.completed_at = Some(Utc::now());
        }
        self.store.update(&record).await?;
        Ok(true)
    }

    /// Write the error string and the Failure/Aborted state in one store
    /// write; the error is recorded before any observer can see the state.
    pub async fn update_on_error(&self, state: TaskState, cause: &ExecutorError) -> Result<()> {
        let mut record = self.record.lock().await;
        if let Err(refresh_err) = self.store.refresh(&mut record).await {
            warn!(task_id = %self.id, "refresh before error update failed: {refresh_err}");
        }
        error!(
            task_id = %self.id,
            task_type = %self.task_type,
            %state,
            "failed to execute task: {cause}"
        );
        record.error = Some(format_task_error(&record.payload, &cause.to_string()));
        let current = record.state;
        if current == state || current.can_transition_to(state) {
            record.state = state;
        } else {
            warn!(
                task_id = %self.id,
                %current,
                %state,
                "keeping terminal state on error update"
            );
        }
        if record.completed_at.is_none() {
            record.completed_at = Some(Utc::now());
        }
        self.store.update(&record).await
    }

    /// Stamp the scheduling time at submission, moving a freshly created
    /// record into `Initializing`.
    pub async fn mark_scheduled(&self) -> Result<()> {
        let mut record = self.record.lock().await;
        record.scheduled_at = Some(Utc::now());
        if record.state == TaskState::Created {
            record.state = TaskState::Initializing;
        }
        self.store.update(&record).await
    }

    /// Stamp the execution start time.
    pub async fn mark_started(&self) -> Result<()> {
        let mut record = self.record.lock().await;
        record.started_at = Some(Utc::now());
        self.store.update(&record).await
    }

    /// Bind a subtask record to its parent and group position, then persist
    /// it for the first time.
    pub async fn attach_to_parent(
        &self,
        parent_id: Uuid,
        position: i32,
        group_type: GroupType,
    ) -> Result<()> {
        let mut record = self.record.lock().await;
        record.parent_id = Some(parent_id);
        record.position = position;
        record.group_type = group_type;
        self.store.save(&record).await
    }

    /// Refresh from the store and bump the liveness timestamp.
    pub async fn heartbeat(&self) -> Result<()> {
        let mut record = self.record.lock().await;
        self.store.mark_dirty(self.id).await?;
        self.store.refresh(&mut record).await
    }

    /// Replace the persisted payload, redacting secrets first.
    pub async fn set_payload(&self, payload: Value) -> Result<()> {
        let mut record = self.record.lock().await;
        if let Err(refresh_err) = self.store.refresh(&mut record).await {
            warn!(task_id = %self.id, "refresh before payload update failed: {refresh_err}");
        }
        record.payload = redact_payload(&payload);
        self.store.update(&record).await
    }
}

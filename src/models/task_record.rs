use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use super::{GroupType, TaskState, TaskType};

/// Position value carried by every top-level task record; subtasks carry the
/// zero-based index of their owning group instead.
pub const TOP_LEVEL_POSITION: i32 = -1;

/// Payload key holding an optional per-subtask time limit in minutes.
pub const TIME_LIMIT_MINS_KEY: &str = "timeLimitMins";

/// Durable record for one task or subtask.
///
/// One record exists per task and per subtask; every state transition is
/// written through the [`TaskStore`](crate::store::TaskStore) before any
/// external effect depends on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    /// Id of the owning top-level task; `None` for top-level tasks.
    pub parent_id: Option<Uuid>,
    pub task_type: TaskType,
    pub state: TaskState,
    /// `-1` for a top-level task, otherwise the index of the owning group
    /// within the parent's group sequence.
    pub position: i32,
    pub group_type: GroupType,
    /// Host identifier of the process that owns execution.
    pub owner: String,
    /// Serialized parameters with secret fields already redacted.
    pub payload: Value,
    /// Textual error description when the state is Failure or Aborted.
    pub error: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a fresh top-level record in the `Created` state. The payload
    /// must already be redacted by the caller.
    pub fn new(task_type: TaskType, payload: Value, owner: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            task_type,
            state: TaskState::Created,
            position: TOP_LEVEL_POSITION,
            group_type: GroupType::Invalid,
            owner: owner.into(),
            payload,
            error: None,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Optional execution time limit parsed from `payload.timeLimitMins`.
    /// Zero means unbounded; unparsable values are treated as unbounded.
    pub fn time_limit(&self) -> Duration {
        let Some(raw) = self.payload.get(TIME_LIMIT_MINS_KEY) else {
            return Duration::ZERO;
        };
        let minutes = match raw {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        };
        match minutes {
            Some(m) if m > 0 => Duration::from_secs(m as u64 * 60),
            Some(_) => Duration::ZERO,
            None => {
                warn!(task_id = %self.id, value = %raw, "ignoring unparsable {}", TIME_LIMIT_MINS_KEY);
                Duration::ZERO
            }
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task or subtask record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Record exists but the task has not been handed to a worker pool.
    Created,
    /// Task is constructed and scheduled; waiting for a worker.
    Initializing,
    /// Task body is executing on a worker.
    Running,
    /// Task completed without error.
    Success,
    /// Task ended with an execution or submission error.
    Failure,
    /// Task was cancelled, either pre-start or after the abort grace expired.
    Aborted,
}

impl TaskState {
    /// Terminal states allow no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Aborted)
    }

    /// States carrying an error description in the record.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure | Self::Aborted)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Legal transition graph:
    /// Created → Initializing → Running → {Success, Failure, Aborted}, with
    /// Created and Initializing allowed to jump straight to Aborted
    /// (pre-start cancellation) or Failure (submission error). Writing the
    /// current state again is a no-op and always allowed.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Created => matches!(
                next,
                Self::Initializing | Self::Aborted | Self::Failure
            ),
            Self::Initializing => matches!(next, Self::Running | Self::Aborted | Self::Failure),
            Self::Running => matches!(next, Self::Success | Self::Failure | Self::Aborted),
            Self::Success | Self::Failure | Self::Aborted => false,
        }
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Created
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "initializing" => Ok(Self::Initializing),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "aborted" => Ok(Self::Aborted),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

use uuid::Uuid;

use crate::models::TaskType;

/// Error kinds surfaced by the executor core.
///
/// The variants are `Clone` so a task outcome can be broadcast to every
/// `wait_for` caller; user-task errors are therefore carried as rendered
/// strings rather than boxed sources.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    #[error("unknown task type: {0}")]
    UnknownTaskType(TaskType),

    #[error("task executor is shutting down")]
    ShuttingDown,

    #[error("task type {0} is not abortable")]
    NotAbortable(TaskType),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("submission failed: {0}")]
    Submission(String),

    #[error("task store error: {0}")]
    Store(String),

    #[error("task {0} is not present")]
    TaskNotFound(Uuid),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ExecutorError {
    /// True for cancellation errors, which propagate out of `run_groups`
    /// ahead of ordinary failures and map a record to `Aborted`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<anyhow::Error> for ExecutorError {
    fn from(error: anyhow::Error) -> Self {
        Self::TaskFailed(format!("{error:#}"))
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

//! # Task Registry
//!
//! Explicit registration table mapping task-type tags to factories and
//! capability flags. Task types are registered at startup; a lookup miss is
//! a hard error rather than a reflection fallback, so missing entries are
//! diagnosed at the call site.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::error::{ExecutorError, Result};
use crate::models::TaskType;
use crate::task::Task;

/// Zero-argument factory producing a fresh, uninitialized task instance.
pub type TaskFactory = Arc<dyn Fn() -> Box<dyn Task> + Send + Sync>;

/// Per-type descriptor: factory plus flat capability flags.
///
/// Capabilities default to false; `abortable` is consulted at abort time and
/// during the abort-grace check, `retryable` at resubmission time.
#[derive(Clone)]
pub struct TaskDescriptor {
    factory: TaskFactory,
    abortable: bool,
    retryable: bool,
}

impl TaskDescriptor {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn Task> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            abortable: false,
            retryable: false,
        }
    }

    pub fn abortable(mut self, abortable: bool) -> Self {
        self.abortable = abortable;
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_abortable(&self) -> bool {
        self.abortable
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Thread-safe mapping from task-type tag to [`TaskDescriptor`].
#[derive(Default)]
pub struct TaskRegistry {
    descriptors: RwLock<HashMap<TaskType, TaskDescriptor>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task type, replacing any previous registration for the
    /// same tag.
    pub fn register(&self, task_type: TaskType, descriptor: TaskDescriptor) {
        info!(
            task_type = %task_type,
            abortable = descriptor.abortable,
            retryable = descriptor.retryable,
            "registering task type"
        );
        self.descriptors
            .write()
            .expect("task registry lock poisoned")
            .insert(task_type, descriptor);
    }

    /// Construct a fresh task instance for the given tag.
    pub fn create(&self, task_type: &TaskType) -> Result<Box<dyn Task>> {
        let descriptors = self.descriptors.read().expect("task registry lock poisoned");
        descriptors
            .get(task_type)
            .map(|d| (d.factory)())
            .ok_or_else(|| ExecutorError::UnknownTaskType(task_type.clone()))
    }

    /// Whether a running instance of this type may receive an abort signal.
    /// Unregistered types are not abortable.
    pub fn is_abortable(&self, task_type: &TaskType) -> bool {
        self.descriptors
            .read()
            .expect("task registry lock poisoned")
            .get(task_type)
            .map(TaskDescriptor::is_abortable)
            .unwrap_or(false)
    }

    /// Whether a failed instance of this type may be resubmitted with the
    /// same params. Unregistered types are not retryable.
    pub fn is_retryable(&self, task_type: &TaskType) -> bool {
        self.descriptors
            .read()
            .expect("task registry lock poisoned")
            .get(task_type)
            .map(TaskDescriptor::is_retryable)
            .unwrap_or(false)
    }

    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.descriptors
            .read()
            .expect("task registry lock poisoned")
            .contains_key(task_type)
    }

    pub fn registered_types(&self) -> Vec<TaskType> {
        self.descriptors
            .read()
            .expect("task registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

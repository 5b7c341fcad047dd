//! # Executor runtime
//!
//! Task lifecycle, group scheduling, abort and timeout propagation, state
//! persistence and shutdown draining. See [`TaskExecutor`] for the facade.

pub mod context;
pub mod drainable_map;
pub mod group;
pub mod hooks;
pub mod listener;
pub mod provider;
pub(crate) mod record_handle;
pub(crate) mod runner;
pub mod runnable_task;
pub mod subtask;
pub mod task_executor;

use std::sync::Arc;

use crate::config::ExecutorConfig;
use crate::registry::TaskRegistry;
use crate::store::TaskStore;
use crate::telemetry::{NoopTelemetry, TelemetrySink};

pub use context::TaskContext;
pub use drainable_map::DrainableMap;
pub use group::SubTaskGroup;
pub use hooks::{CompletionHooks, NoopHooks};
pub use listener::ExecutionListener;
pub use provider::{ExecutorProvider, StaticExecutorProvider, WorkerPool};
pub use runnable_task::RunnableTask;
pub use subtask::RunnableSubTask;
pub use task_executor::TaskExecutor;

/// Explicit bundle of the executor's collaborators, passed at construction
/// instead of being resolved from ambient singletons.
pub struct ExecutorContext {
    pub store: Arc<dyn TaskStore>,
    pub provider: Arc<dyn ExecutorProvider>,
    pub registry: Arc<TaskRegistry>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub hooks: Arc<dyn CompletionHooks>,
    pub config: ExecutorConfig,
}

impl ExecutorContext {
    /// Context with no-op telemetry and hooks and the default config.
    pub fn new(
        store: Arc<dyn TaskStore>,
        provider: Arc<dyn ExecutorProvider>,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            store,
            provider,
            registry,
            telemetry: Arc::new(NoopTelemetry),
            hooks: Arc::new(NoopHooks),
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn CompletionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }
}

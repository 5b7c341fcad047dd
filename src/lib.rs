//! # conductor-core
//!
//! Concurrent execution engine for long-running, hierarchical orchestration
//! jobs in a cluster-management control plane. A job is a [`Task`] composed of
//! subtasks organized into ordered [`SubTaskGroup`]s whose members run
//! concurrently on [`WorkerPool`]s.
//!
//! A task is submitted by first creating a [`RunnableTask`]:
//!
//! ```no_run
//! # use conductor_core::*;
//! # use std::sync::Arc;
//! # async fn example(executor: Arc<TaskExecutor>, pool: Arc<WorkerPool>) -> Result<()> {
//! let runnable = executor
//!     .create_runnable(&TaskType::from("create_universe"), serde_json::json!({}))
//!     .await?;
//! let task_id = executor.submit(runnable, &pool).await?;
//! executor.wait_for(task_id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Inside the task's `run` body, subtasks are added to groups and the groups
//! are attached to the task context; `run_groups` then dispatches each group
//! sequentially, running the members of a group concurrently:
//!
//! ```no_run
//! # use conductor_core::*;
//! # async fn run(ctx: &TaskContext, nodes: Vec<Box<dyn Task>>) -> Result<()> {
//! let group = ctx.create_group("provision-nodes")?;
//! for node_task in nodes {
//!     group.add_subtask(node_task)?;
//! }
//! ctx.add_group(group).await?;
//! ctx.run_groups().await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod models;
pub mod redaction;
pub mod registry;
pub mod store;
pub mod task;
pub mod telemetry;

pub use config::ExecutorConfig;
pub use error::{ExecutorError, Result};
pub use executor::{
    CompletionHooks, ExecutionListener, ExecutorContext, ExecutorProvider, NoopHooks,
    RunnableTask, StaticExecutorProvider, SubTaskGroup, TaskContext, TaskExecutor, WorkerPool,
};
pub use models::{GroupType, TaskRecord, TaskState, TaskType};
pub use registry::{TaskDescriptor, TaskRegistry};
pub use store::{InMemoryTaskStore, TaskStore};
pub use task::Task;
pub use telemetry::{NoopTelemetry, PrometheusTelemetry, TelemetrySink};

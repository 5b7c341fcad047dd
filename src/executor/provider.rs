//! Worker pools and the provider seam that hands them out per task type.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{ExecutorError, Result};
use crate::models::TaskType;

/// A named, bounded pool of workers.
///
/// Submission spawns the future immediately; execution begins once one of
/// the pool's permits is free, so a saturated pool queues work rather than
/// rejecting it. A closed pool rejects submission outright.
pub struct WorkerPool {
    name: String,
    capacity: usize,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, capacity: usize) -> Arc<Self> {
        let name = name.into();
        debug!(pool = %name, capacity, "creating worker pool");
        Arc::new(Self {
            name,
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
            closed: AtomicBool::new(false),
        })
    }

    /// Submit a future for execution, returning its handle. Fails with
    /// [`ExecutorError::Submission`] once the pool is closed.
    pub fn submit<F>(&self, future: F) -> Result<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExecutorError::Submission(format!(
                "worker pool {} is closed",
                self.name
            )));
        }
        let permits = Arc::clone(&self.permits);
        Ok(tokio::spawn(async move {
            // A closed semaphore only happens if the pool owner closes it
            // explicitly; queued work is then allowed to proceed unbounded
            // rather than being lost.
            let _permit = permits.acquire_owned().await.ok();
            future.await
        }))
    }

    /// Close the pool. In-flight work keeps running; new submissions fail.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(pool = %self.name, "worker pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free; `capacity - available` workers are busy.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Supplies worker pools keyed by task type.
///
/// A subtask group without an explicit pool asks the provider for one based
/// on the parent task's type.
pub trait ExecutorProvider: Send + Sync {
    fn pool_for(&self, task_type: &TaskType) -> Arc<WorkerPool>;

    /// Close every pool this provider handed out. Called by the owner of
    /// the provider, not by the task executor.
    fn shutdown(&self) {}
}

/// Default provider: one lazily-created pool per task type, all with the
/// same capacity.
pub struct StaticExecutorProvider {
    pools: RwLock<HashMap<TaskType, Arc<WorkerPool>>>,
    default_capacity: usize,
}

impl StaticExecutorProvider {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    /// Pre-register a dedicated pool for a task type.
    pub fn register_pool(&self, task_type: TaskType, pool: Arc<WorkerPool>) {
        self.pools
            .write()
            .expect("provider lock poisoned")
            .insert(task_type, pool);
    }
}

impl ExecutorProvider for StaticExecutorProvider {
    fn pool_for(&self, task_type: &TaskType) -> Arc<WorkerPool> {
        if let Some(pool) = self.pools.read().expect("provider lock poisoned").get(task_type) {
            return Arc::clone(pool);
        }
        let mut pools = self.pools.write().expect("provider lock poisoned");
        Arc::clone(
            pools
                .entry(task_type.clone())
                .or_insert_with(|| WorkerPool::new(task_type.to_string(), self.default_capacity)),
        )
    }

    fn shutdown(&self) {
        for pool in self.pools.read().expect("provider lock poisoned").values() {
            pool.shutdown();
        }
    }
}

//! # Task Store
//!
//! Durable persistence seam for task records. The executor writes every
//! state transition through this interface before any external effect
//! depends on it; production deployments plug in a database-backed store,
//! while [`InMemoryTaskStore`] serves tests and embedders without one.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::TaskRecord;

pub use memory::InMemoryTaskStore;

/// Persistence contract for [`TaskRecord`]s.
///
/// Updates are full-record writes; cross-record ordering is not guaranteed.
/// Per-record write ordering is the caller's concern (the executor
/// serializes writes through a per-record lock).
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new record, or overwrite an existing one with the same id.
    async fn save(&self, record: &TaskRecord) -> Result<()>;

    /// Full-record write of an existing record. Bumps `updated_at`.
    async fn update(&self, record: &TaskRecord) -> Result<()>;

    /// Re-read the stored record into `record`.
    async fn refresh(&self, record: &mut TaskRecord) -> Result<()>;

    /// Bump `updated_at` without changing anything else; external watchers
    /// use this as a liveness signal.
    async fn mark_dirty(&self, id: Uuid) -> Result<()>;

    /// Fetch a record by id.
    async fn get(&self, id: Uuid) -> Result<TaskRecord>;
}

use async_trait::async_trait;

use crate::models::TaskRecord;

/// External effects fired when a top-level task finishes, on every exit
/// path: marking any owning customer task and scheduled-job record as
/// completed, and triggering a one-off HA replication sync.
#[async_trait]
pub trait CompletionHooks: Send + Sync {
    async fn task_completed(&self, record: &TaskRecord);

    async fn replication_sync(&self);
}

/// Default hooks for deployments without customer-task bookkeeping or HA.
pub struct NoopHooks;

#[async_trait]
impl CompletionHooks for NoopHooks {
    async fn task_completed(&self, _record: &TaskRecord) {}

    async fn replication_sync(&self) {}
}

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{ExecutorError, Result};
use crate::models::TaskRecord;

use super::TaskStore;

/// Process-local [`TaskStore`] backed by a hash map.
#[derive(Default)]
pub struct InMemoryTaskStore {
    records: Mutex<HashMap<Uuid, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All subtask records owned by `parent_id`, ordered by position then id.
    pub fn subtasks_of(&self, parent_id: Uuid) -> Vec<TaskRecord> {
        let records = self.records.lock().expect("task store lock poisoned");
        let mut subtasks: Vec<TaskRecord> = records
            .values()
            .filter(|r| r.parent_id == Some(parent_id))
            .cloned()
            .collect();
        subtasks.sort_by_key(|r| (r.position, r.id));
        subtasks
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("task store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, record: &TaskRecord) -> Result<()> {
        let mut records = self.records.lock().expect("task store lock poisoned");
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &TaskRecord) -> Result<()> {
        let mut records = self.records.lock().expect("task store lock poisoned");
        match records.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                stored.updated_at = Utc::now();
                Ok(())
            }
            None => Err(ExecutorError::Store(format!(
                "update of unknown record {}",
                record.id
            ))),
        }
    }

    async fn refresh(&self, record: &mut TaskRecord) -> Result<()> {
        let records = self.records.lock().expect("task store lock poisoned");
        match records.get(&record.id) {
            Some(stored) => {
                *record = stored.clone();
                Ok(())
            }
            None => Err(ExecutorError::Store(format!(
                "refresh of unknown record {}",
                record.id
            ))),
        }
    }

    async fn mark_dirty(&self, id: Uuid) -> Result<()> {
        let mut records = self.records.lock().expect("task store lock poisoned");
        match records.get_mut(&id) {
            Some(stored) => {
                stored.updated_at = Utc::now();
                Ok(())
            }
            None => Err(ExecutorError::Store(format!("mark_dirty of unknown record {id}"))),
        }
    }

    async fn get(&self, id: Uuid) -> Result<TaskRecord> {
        let records = self.records.lock().expect("task store lock poisoned");
        records
            .get(&id)
            .cloned()
            .ok_or_else(|| ExecutorError::Store(format!("record {id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskState, TaskType};
    use serde_json::json;

    fn record() -> TaskRecord {
        TaskRecord::new(TaskType::from("test_task"), json!({}), "host-1")
    }

    #[tokio::test]
    async fn save_get_round_trip() {
        let store = InMemoryTaskStore::new();
        let r = record();
        store.save(&r).await.unwrap();
        let fetched = store.get(r.id).await.unwrap();
        assert_eq!(fetched.id, r.id);
        assert_eq!(fetched.state, TaskState::Created);
    }

    #[tokio::test]
    async fn update_bumps_updated_at() {
        let store = InMemoryTaskStore::new();
        let mut r = record();
        store.save(&r).await.unwrap();
        let before = store.get(r.id).await.unwrap().updated_at;

        r.state = TaskState::Initializing;
        store.update(&r).await.unwrap();
        let after = store.get(r.id).await.unwrap();
        assert_eq!(after.state, TaskState::Initializing);
        assert!(after.updated_at >= before);
    }

    #[tokio::test]
    async fn refresh_reloads_the_stored_copy() {
        let store = InMemoryTaskStore::new();
        let mut r = record();
        store.save(&r).await.unwrap();

        let mut stale = r.clone();
        r.state = TaskState::Initializing;
        store.update(&r).await.unwrap();

        store.refresh(&mut stale).await.unwrap();
        assert_eq!(stale.state, TaskState::Initializing);
    }

    #[tokio::test]
    async fn operations_on_unknown_records_fail() {
        let store = InMemoryTaskStore::new();
        let r = record();
        assert!(store.get(r.id).await.is_err());
        assert!(store.update(&r).await.is_err());
        assert!(store.mark_dirty(r.id).await.is_err());
    }

    #[tokio::test]
    async fn subtasks_are_ordered_by_position() {
        let store = InMemoryTaskStore::new();
        let parent = record();
        store.save(&parent).await.unwrap();

        for position in [2, 0, 1] {
            let mut sub = record();
            sub.parent_id = Some(parent.id);
            sub.position = position;
            store.save(&sub).await.unwrap();
        }

        let subtasks = store.subtasks_of(parent.id);
        assert_eq!(subtasks.len(), 3);
        assert_eq!(
            subtasks.iter().map(|r| r.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }
}

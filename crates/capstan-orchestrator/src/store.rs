//! Task persistence.
//!
//! The runner writes task state through this trait before and after every
//! external call, so a crash mid-run leaves an accurate record of how far
//! the deployment got.

use async_trait::async_trait;
use capstan_common::Task;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use uuid::Uuid;

/// Errors from storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Backend-agnostic task storage.
///
/// The trait is object-safe and can be used with `Arc<dyn TaskStore>`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task. Fails with `AlreadyExists` if the id is taken.
    async fn save_task(&self, task: &Task) -> Result<()>;

    /// Overwrite an existing task. Fails with `NotFound` if it was never saved.
    async fn update_task(&self, task: &Task) -> Result<()>;

    /// Get a task by id.
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>>;

    /// All tasks for a deployment, oldest first.
    async fn tasks_for_deployment(&self, deployment_id: Uuid) -> Result<Vec<Task>>;

    /// The pending or running task for a deployment, if any. At most one is
    /// active per deployment; the runner refuses to start a second.
    async fn active_task_for_deployment(&self, deployment_id: Uuid) -> Result<Option<Task>> {
        Ok(self
            .tasks_for_deployment(deployment_id)
            .await?
            .into_iter()
            .find(|task| task.status.is_active()))
    }
}

/// In-memory task store for tests and single-process runs.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_lock(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Uuid, Task>>> {
        self.tasks
            .read()
            .map_err(|e| StoreError::Lock(format!("read lock poisoned: {}", e)))
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Task>>> {
        self.tasks
            .write()
            .map_err(|e| StoreError::Lock(format!("write lock poisoned: {}", e)))
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save_task(&self, task: &Task) -> Result<()> {
        let mut tasks = self.write_lock()?;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(format!("task {}", task.id)));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        let mut tasks = self.write_lock()?;
        if !tasks.contains_key(&task.id) {
            return Err(StoreError::NotFound(format!("task {}", task.id)));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.read_lock()?.get(&id).cloned())
    }

    async fn tasks_for_deployment(&self, deployment_id: Uuid) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .read_lock()?
            .values()
            .filter(|task| task.deployment_id == deployment_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_save_and_get_round_trip() {
        let store = MemoryTaskStore::new();
        let task = Task::new(Uuid::new_v4(), vec![]);

        store.save_task(&task).await.unwrap();
        let loaded = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded, task);
    }

    #[tokio::test]
    async fn test_save_rejects_duplicate_id() {
        let store = MemoryTaskStore::new();
        let task = Task::new(Uuid::new_v4(), vec![]);

        store.save_task(&task).await.unwrap();
        let err = store.save_task(&task).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_requires_existing_task() {
        let store = MemoryTaskStore::new();
        let task = Task::new(Uuid::new_v4(), vec![]);

        let err = store.update_task(&task).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        store.save_task(&task).await.unwrap();
        let mut updated = task.clone();
        updated.start();
        store.update_task(&updated).await.unwrap();

        let loaded = store.get_task(task.id).await.unwrap().unwrap();
        assert!(loaded.started_at.is_some());
    }

    #[tokio::test]
    async fn test_tasks_for_deployment_sorted_oldest_first() {
        let store = MemoryTaskStore::new();
        let deployment_id = Uuid::new_v4();

        let mut older = Task::new(deployment_id, vec![]);
        older.created_at = Utc::now() - Duration::minutes(5);
        let newer = Task::new(deployment_id, vec![]);
        let unrelated = Task::new(Uuid::new_v4(), vec![]);

        store.save_task(&newer).await.unwrap();
        store.save_task(&older).await.unwrap();
        store.save_task(&unrelated).await.unwrap();

        let tasks = store.tasks_for_deployment(deployment_id).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, older.id);
        assert_eq!(tasks[1].id, newer.id);
    }

    #[tokio::test]
    async fn test_active_task_skips_terminal_tasks() {
        let store = MemoryTaskStore::new();
        let deployment_id = Uuid::new_v4();

        let mut finished = Task::new(deployment_id, vec![]);
        finished.created_at = Utc::now() - Duration::minutes(5);
        finished.start();
        finished.succeed();
        store.save_task(&finished).await.unwrap();

        assert!(store
            .active_task_for_deployment(deployment_id)
            .await
            .unwrap()
            .is_none());

        let pending = Task::new(deployment_id, vec![]);
        store.save_task(&pending).await.unwrap();

        let active = store
            .active_task_for_deployment(deployment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, pending.id);
    }
}

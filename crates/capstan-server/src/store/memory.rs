//! In-memory storage backend.
//!
//! Simple storage for tests and for the fallback path when the redb database
//! cannot be opened. Uses RwLock for thread-safe access.

use async_trait::async_trait;
use capstan_common::{Deployment, Task};
use capstan_orchestrator::TaskStore;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::{DeploymentStore, Result, StoreError};

/// In-memory backend implementing both store traits.
#[derive(Default)]
pub struct MemoryStore {
    deployments: RwLock<HashMap<Uuid, Deployment>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_lock<T>(lock: &RwLock<T>) -> Result<std::sync::RwLockWriteGuard<'_, T>> {
        lock.write()
            .map_err(|e| StoreError::Lock(format!("write lock poisoned: {}", e)))
    }

    fn read_lock<T>(lock: &RwLock<T>) -> Result<std::sync::RwLockReadGuard<'_, T>> {
        lock.read()
            .map_err(|e| StoreError::Lock(format!("read lock poisoned: {}", e)))
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn save_deployment(&self, deployment: &Deployment) -> Result<()> {
        let mut deployments = Self::write_lock(&self.deployments)?;
        if deployments.contains_key(&deployment.id) {
            return Err(StoreError::AlreadyExists(format!(
                "deployment {}",
                deployment.id
            )));
        }
        deployments.insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        let mut deployments = Self::write_lock(&self.deployments)?;
        if !deployments.contains_key(&deployment.id) {
            return Err(StoreError::NotFound(format!(
                "deployment {}",
                deployment.id
            )));
        }
        deployments.insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn get_deployment(&self, id: Uuid) -> Result<Option<Deployment>> {
        Ok(Self::read_lock(&self.deployments)?.get(&id).cloned())
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>> {
        let mut deployments: Vec<Deployment> =
            Self::read_lock(&self.deployments)?.values().cloned().collect();
        deployments.sort_by_key(|d| d.created_at);
        Ok(deployments)
    }

    async fn delete_deployment(&self, id: Uuid) -> Result<bool> {
        let removed = Self::write_lock(&self.deployments)?.remove(&id).is_some();
        if removed {
            Self::write_lock(&self.tasks)?.retain(|_, task| task.deployment_id != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn save_task(&self, task: &Task) -> Result<()> {
        let mut tasks = Self::write_lock(&self.tasks)?;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(format!("task {}", task.id)));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        let mut tasks = Self::write_lock(&self.tasks)?;
        if !tasks.contains_key(&task.id) {
            return Err(StoreError::NotFound(format!("task {}", task.id)));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(Self::read_lock(&self.tasks)?.get(&id).cloned())
    }

    async fn tasks_for_deployment(&self, deployment_id: Uuid) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = Self::read_lock(&self.tasks)?
            .values()
            .filter(|task| task.deployment_id == deployment_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }
}

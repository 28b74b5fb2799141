//! redb storage backend.
//!
//! Persistent storage using the redb embedded database, with JSON
//! serialization for the stored records.
//!
//! ## Table Structure
//!
//! ```text
//! deployments         : UUID (bytes) -> Deployment (JSON)
//! tasks               : UUID (bytes) -> Task (JSON)
//! tasks_by_deployment : (deployment UUID, task UUID) -> ()
//! ```

use async_trait::async_trait;
use capstan_common::{Deployment, Task};
use capstan_orchestrator::TaskStore;
use redb::{
    Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable, TableDefinition,
};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::{DeploymentStore, Result, StoreError};

const DEPLOYMENTS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("deployments_v1");
const TASKS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("tasks_v1");
const TASKS_BY_DEPLOYMENT: MultimapTableDefinition<&[u8; 16], &[u8; 16]> =
    MultimapTableDefinition::new("tasks_by_deployment_v1");

/// redb backend implementing both store traits.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Database::create(path).map_err(|e| StoreError::Database(e.to_string()))?;

        // Create all tables on first open
        let write_txn = db
            .begin_write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        {
            let _ = write_txn.open_table(DEPLOYMENTS);
            let _ = write_txn.open_table(TASKS);
            let _ = write_txn.open_multimap_table(TASKS_BY_DEPLOYMENT);
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn uuid_to_bytes(id: Uuid) -> [u8; 16] {
        *id.as_bytes()
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
        serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
        serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl DeploymentStore for RedbStore {
    async fn save_deployment(&self, deployment: &Deployment) -> Result<()> {
        let db = Arc::clone(&self.db);
        let deployment = deployment.clone();

        tokio::task::spawn_blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let id_bytes = Self::uuid_to_bytes(deployment.id);
            {
                let mut table = write_txn
                    .open_table(DEPLOYMENTS)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                match table.get(&id_bytes) {
                    Ok(Some(_)) => {
                        return Err(StoreError::AlreadyExists(format!(
                            "deployment {}",
                            deployment.id
                        )))
                    }
                    Ok(None) => {}
                    Err(e) => return Err(StoreError::Database(e.to_string())),
                }
                let json = Self::to_json(&deployment)?;
                table
                    .insert(&id_bytes, json.as_str())
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
            write_txn
                .commit()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Database(format!("Task join error: {}", e)))?
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        let db = Arc::clone(&self.db);
        let deployment = deployment.clone();

        tokio::task::spawn_blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let id_bytes = Self::uuid_to_bytes(deployment.id);
            {
                let mut table = write_txn
                    .open_table(DEPLOYMENTS)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                match table.get(&id_bytes) {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        return Err(StoreError::NotFound(format!(
                            "deployment {}",
                            deployment.id
                        )))
                    }
                    Err(e) => return Err(StoreError::Database(e.to_string())),
                }
                let json = Self::to_json(&deployment)?;
                table
                    .insert(&id_bytes, json.as_str())
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
            write_txn
                .commit()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Database(format!("Task join error: {}", e)))?
    }

    async fn get_deployment(&self, id: Uuid) -> Result<Option<Deployment>> {
        let db = Arc::clone(&self.db);
        let id_bytes = Self::uuid_to_bytes(id);

        tokio::task::spawn_blocking(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let table = read_txn
                .open_table(DEPLOYMENTS)
                .map_err(|e| StoreError::Database(e.to_string()))?;

            match table.get(&id_bytes) {
                Ok(Some(access)) => {
                    let deployment: Deployment = Self::from_json(access.value())?;
                    Ok(Some(deployment))
                }
                Ok(None) => Ok(None),
                Err(e) => Err(StoreError::Database(e.to_string())),
            }
        })
        .await
        .map_err(|e| StoreError::Database(format!("Task join error: {}", e)))?
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>> {
        let db = Arc::clone(&self.db);

        tokio::task::spawn_blocking(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let table = read_txn
                .open_table(DEPLOYMENTS)
                .map_err(|e| StoreError::Database(e.to_string()))?;

            let mut deployments = Vec::new();
            for entry in table.iter().map_err(|e| StoreError::Database(e.to_string()))? {
                let (_, value) = entry.map_err(|e| StoreError::Database(e.to_string()))?;
                let deployment: Deployment = Self::from_json(value.value())?;
                deployments.push(deployment);
            }
            deployments.sort_by_key(|d| d.created_at);

            Ok(deployments)
        })
        .await
        .map_err(|e| StoreError::Database(format!("Task join error: {}", e)))?
    }

    async fn delete_deployment(&self, id: Uuid) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let id_bytes = Self::uuid_to_bytes(id);

        tokio::task::spawn_blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| StoreError::Database(e.to_string()))?;

            let existed = {
                let mut table = write_txn
                    .open_table(DEPLOYMENTS)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                let removed = table
                    .remove(&id_bytes)
                    .map_err(|e| StoreError::Database(e.to_string()))?
                    .is_some();
                removed
            };

            if existed {
                // Collect this deployment's task ids, then drop the rows and
                // the index entries.
                let task_ids: Vec<[u8; 16]> = {
                    let index = write_txn
                        .open_multimap_table(TASKS_BY_DEPLOYMENT)
                        .map_err(|e| StoreError::Database(e.to_string()))?;
                    let mut ids = Vec::new();
                    if let Ok(values) = index.get(&id_bytes) {
                        for entry in values {
                            let guard = entry.map_err(|e| StoreError::Database(e.to_string()))?;
                            ids.push(*guard.value());
                        }
                    }
                    ids
                };

                {
                    let mut tasks = write_txn
                        .open_table(TASKS)
                        .map_err(|e| StoreError::Database(e.to_string()))?;
                    for task_id in &task_ids {
                        let _ = tasks.remove(task_id);
                    }
                }
                {
                    let mut index = write_txn
                        .open_multimap_table(TASKS_BY_DEPLOYMENT)
                        .map_err(|e| StoreError::Database(e.to_string()))?;
                    for task_id in &task_ids {
                        let _ = index.remove(&id_bytes, task_id);
                    }
                }
            }

            write_txn
                .commit()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(existed)
        })
        .await
        .map_err(|e| StoreError::Database(format!("Task join error: {}", e)))?
    }
}

#[async_trait]
impl TaskStore for RedbStore {
    async fn save_task(&self, task: &Task) -> Result<()> {
        let db = Arc::clone(&self.db);
        let task = task.clone();

        tokio::task::spawn_blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let id_bytes = Self::uuid_to_bytes(task.id);
            let deployment_bytes = Self::uuid_to_bytes(task.deployment_id);
            {
                let mut table = write_txn
                    .open_table(TASKS)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                match table.get(&id_bytes) {
                    Ok(Some(_)) => {
                        return Err(StoreError::AlreadyExists(format!("task {}", task.id)))
                    }
                    Ok(None) => {}
                    Err(e) => return Err(StoreError::Database(e.to_string())),
                }
                let json = Self::to_json(&task)?;
                table
                    .insert(&id_bytes, json.as_str())
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
            {
                let mut index = write_txn
                    .open_multimap_table(TASKS_BY_DEPLOYMENT)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                index
                    .insert(&deployment_bytes, &id_bytes)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
            write_txn
                .commit()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Database(format!("Task join error: {}", e)))?
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        let db = Arc::clone(&self.db);
        let task = task.clone();

        tokio::task::spawn_blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let id_bytes = Self::uuid_to_bytes(task.id);
            {
                let mut table = write_txn
                    .open_table(TASKS)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                match table.get(&id_bytes) {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        return Err(StoreError::NotFound(format!("task {}", task.id)))
                    }
                    Err(e) => return Err(StoreError::Database(e.to_string())),
                }
                let json = Self::to_json(&task)?;
                table
                    .insert(&id_bytes, json.as_str())
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
            write_txn
                .commit()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Database(format!("Task join error: {}", e)))?
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let db = Arc::clone(&self.db);
        let id_bytes = Self::uuid_to_bytes(id);

        tokio::task::spawn_blocking(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let table = read_txn
                .open_table(TASKS)
                .map_err(|e| StoreError::Database(e.to_string()))?;

            match table.get(&id_bytes) {
                Ok(Some(access)) => {
                    let task: Task = Self::from_json(access.value())?;
                    Ok(Some(task))
                }
                Ok(None) => Ok(None),
                Err(e) => Err(StoreError::Database(e.to_string())),
            }
        })
        .await
        .map_err(|e| StoreError::Database(format!("Task join error: {}", e)))?
    }

    async fn tasks_for_deployment(&self, deployment_id: Uuid) -> Result<Vec<Task>> {
        let db = Arc::clone(&self.db);
        let deployment_bytes = Self::uuid_to_bytes(deployment_id);

        tokio::task::spawn_blocking(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let index = read_txn
                .open_multimap_table(TASKS_BY_DEPLOYMENT)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let tasks_table = read_txn
                .open_table(TASKS)
                .map_err(|e| StoreError::Database(e.to_string()))?;

            let mut tasks = Vec::new();
            if let Ok(values) = index.get(&deployment_bytes) {
                for entry in values {
                    let guard = entry.map_err(|e| StoreError::Database(e.to_string()))?;
                    let id_bytes = guard.value();
                    if let Ok(Some(access)) = tasks_table.get(&id_bytes) {
                        let task: Task = Self::from_json(access.value())?;
                        tasks.push(task);
                    }
                }
            }
            tasks.sort_by_key(|task| task.created_at);

            Ok(tasks)
        })
        .await
        .map_err(|e| StoreError::Database(format!("Task join error: {}", e)))?
    }
}

//! Deployment and task persistence for the server.
//!
//! One concrete store backs both the [`DeploymentStore`] trait defined here
//! and the orchestrator's `TaskStore`, so a deployment and its tasks live in
//! the same database. Backends: redb for real runs, memory for tests and as
//! the fallback when the database cannot be opened.

mod memory;
mod redb;
#[cfg(test)]
mod tests;

pub use memory::MemoryStore;
pub use redb::RedbStore;

use async_trait::async_trait;
use capstan_common::Deployment;
use capstan_orchestrator::TaskStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub use capstan_orchestrator::store::{Result, StoreError};

/// Backend-agnostic deployment storage.
///
/// The trait is object-safe and can be used with `Arc<dyn DeploymentStore>`.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Persist a new deployment. Fails with `AlreadyExists` if the id is taken.
    async fn save_deployment(&self, deployment: &Deployment) -> Result<()>;

    /// Overwrite an existing deployment. Fails with `NotFound` if it was
    /// never saved.
    async fn update_deployment(&self, deployment: &Deployment) -> Result<()>;

    /// Get a deployment by id.
    async fn get_deployment(&self, id: Uuid) -> Result<Option<Deployment>>;

    /// All deployments, oldest first.
    async fn list_deployments(&self) -> Result<Vec<Deployment>>;

    /// Delete a deployment and every task recorded for it. Returns false
    /// when it never existed.
    async fn delete_deployment(&self, id: Uuid) -> Result<bool>;
}

/// Which backing store to open.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Volatile, for tests and demos.
    Memory,
    /// redb database file at the given path.
    Redb { path: PathBuf },
}

/// Open the configured store as its two trait views.
///
/// A redb open failure is not fatal: the server comes up on the in-memory
/// store so the API stays reachable, and the warning tells the operator why
/// nothing persists.
pub fn open_store(config: &StoreConfig) -> (Arc<dyn DeploymentStore>, Arc<dyn TaskStore>) {
    match config {
        StoreConfig::Memory => {
            let store = Arc::new(MemoryStore::new());
            let deployments: Arc<dyn DeploymentStore> = store.clone();
            let tasks: Arc<dyn TaskStore> = store;
            (deployments, tasks)
        }
        StoreConfig::Redb { path } => match RedbStore::open(path) {
            Ok(store) => {
                info!(path = %path.display(), "Opened redb store");
                let store = Arc::new(store);
                let deployments: Arc<dyn DeploymentStore> = store.clone();
                let tasks: Arc<dyn TaskStore> = store;
                (deployments, tasks)
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Could not open redb store, falling back to in-memory storage"
                );
                let store = Arc::new(MemoryStore::new());
                let deployments: Arc<dyn DeploymentStore> = store.clone();
                let tasks: Arc<dyn TaskStore> = store;
                (deployments, tasks)
            }
        },
    }
}

//! Tests for the store traits.
//!
//! Written against the traits so the same assertions run against every
//! backend (MemoryStore, RedbStore).

use super::*;
use capstan_common::{fixtures, Task};
use chrono::{Duration, Utc};
use serde_json::json;

fn create_memory_store() -> MemoryStore {
    MemoryStore::new()
}

fn create_redb_store() -> (RedbStore, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let store = RedbStore::open(tmp.path().join("capstan.redb")).unwrap();
    (store, tmp)
}

fn sample_task(deployment_id: Uuid) -> Task {
    Task::new(
        deployment_id,
        vec![capstan_common::ActionExecution::planned(
            "configure_overcloud",
            "Configure a new tenant and networks on the Overcloud",
            json!({"deployment_name": "qci"}),
        )],
    )
}

async fn exercise_deployment_crud(store: &(impl DeploymentStore + TaskStore)) {
    let deployment = fixtures::configured_deployment();

    store.save_deployment(&deployment).await.unwrap();
    let err = store.save_deployment(&deployment).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));

    let loaded = store.get_deployment(deployment.id).await.unwrap().unwrap();
    assert_eq!(loaded, deployment);

    let mut renamed = deployment.clone();
    renamed.name = "qci-renamed".to_string();
    store.update_deployment(&renamed).await.unwrap();
    let loaded = store.get_deployment(deployment.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "qci-renamed");

    let unknown = fixtures::configured_deployment();
    let err = store.update_deployment(&unknown).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let listed = store.list_deployments().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, deployment.id);

    // Delete cascades to the deployment's tasks.
    let task = sample_task(deployment.id);
    store.save_task(&task).await.unwrap();
    assert!(store.delete_deployment(deployment.id).await.unwrap());
    assert!(!store.delete_deployment(deployment.id).await.unwrap());
    assert!(store.get_deployment(deployment.id).await.unwrap().is_none());
    assert!(store.get_task(task.id).await.unwrap().is_none());
    assert!(store
        .tasks_for_deployment(deployment.id)
        .await
        .unwrap()
        .is_empty());
}

async fn exercise_task_crud(store: &impl TaskStore) {
    let deployment_id = Uuid::new_v4();
    let task = sample_task(deployment_id);

    store.save_task(&task).await.unwrap();
    let err = store.save_task(&task).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));

    let loaded = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(loaded, task);
    assert_eq!(loaded.actions[0].name, "configure_overcloud");

    let mut running = task.clone();
    running.start();
    store.update_task(&running).await.unwrap();
    let loaded = store.get_task(task.id).await.unwrap().unwrap();
    assert!(loaded.started_at.is_some());

    let err = store
        .update_task(&sample_task(deployment_id))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    // Ordering and the active-task lookup.
    let mut older = sample_task(deployment_id);
    older.created_at = Utc::now() - Duration::minutes(5);
    older.start();
    older.succeed();
    store.save_task(&older).await.unwrap();
    store.save_task(&sample_task(Uuid::new_v4())).await.unwrap();

    let tasks = store.tasks_for_deployment(deployment_id).await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, older.id);
    assert_eq!(tasks[1].id, task.id);

    let active = store
        .active_task_for_deployment(deployment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.id, task.id);
}

#[tokio::test]
async fn test_memory_deployment_crud() {
    let store = create_memory_store();
    exercise_deployment_crud(&store).await;
}

#[tokio::test]
async fn test_memory_task_crud() {
    let store = create_memory_store();
    exercise_task_crud(&store).await;
}

#[tokio::test]
async fn test_redb_deployment_crud() {
    let (store, _tmp) = create_redb_store();
    exercise_deployment_crud(&store).await;
}

#[tokio::test]
async fn test_redb_task_crud() {
    let (store, _tmp) = create_redb_store();
    exercise_task_crud(&store).await;
}

#[tokio::test]
async fn test_redb_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("capstan.redb");
    let deployment = fixtures::configured_deployment();
    let task = sample_task(deployment.id);

    {
        let store = RedbStore::open(&path).unwrap();
        store.save_deployment(&deployment).await.unwrap();
        store.save_task(&task).await.unwrap();
    }

    let store = RedbStore::open(&path).unwrap();
    let loaded = store.get_deployment(deployment.id).await.unwrap().unwrap();
    assert_eq!(loaded, deployment);
    let tasks = store.tasks_for_deployment(deployment.id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, task.id);
}

#[tokio::test]
async fn test_open_store_memory_fallback() {
    let tmp = tempfile::tempdir().unwrap();
    // A directory at the database path makes redb fail to open.
    let path = tmp.path().join("occupied");
    std::fs::create_dir_all(&path).unwrap();

    let (deployments, _tasks) = open_store(&StoreConfig::Redb { path });
    let deployment = fixtures::configured_deployment();
    deployments.save_deployment(&deployment).await.unwrap();
    assert!(deployments
        .get_deployment(deployment.id)
        .await
        .unwrap()
        .is_some());
}

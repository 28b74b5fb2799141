//! JSON API routes.
//!
//! All routes are nested under `/api` by [`crate::app_router`]. Deployment
//! bodies use the `{"deployment": ...}` / `{"deployments": [...]}` root keys
//! the UI expects; errors render as an [`ErrorResponse`] except for
//! validation failures, which render the full field error map under
//! `{"errors": ...}`.

use crate::logs::LogType;
use crate::AppState;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use capstan_common::models::{DeployResponse, Deployment, DeploymentRequest, TaskView};
use capstan_common::models::{ValidationReport, ValidationResponse};
use capstan_common::{validate_deployment, validate_name, ErrorResponse};
use capstan_orchestrator::{OrchestratorError, StoreError};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/deployments", get(list_deployments).post(create_deployment))
        .route(
            "/deployments/{id}",
            get(get_deployment)
                .put(update_deployment)
                .delete(delete_deployment),
        )
        .route("/deployments/{id}/validate", post(validate))
        .route("/deployments/{id}/deploy", post(deploy))
        .route("/deployments/{id}/redeploy", post(redeploy))
        .route("/deployments/{id}/tasks/{task_id}", get(get_task))
        .route("/deployments/{id}/tasks/{task_id}/cancel", post(cancel_task))
        .route("/deployments/{id}/log", get(get_log))
}

async fn list_deployments(State(state): State<AppState>) -> Response {
    match state.deployments.list_deployments().await {
        Ok(deployments) => (StatusCode::OK, Json(json!({ "deployments": deployments }))).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn create_deployment(
    State(state): State<AppState>,
    Json(request): Json<DeploymentRequest>,
) -> Response {
    // Only the name is validated here. Platform configuration is checked by
    // the validate and deploy endpoints once the user has filled it in.
    let errors = validate_name(&request.name);
    if !errors.is_empty() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "errors": errors })))
            .into_response();
    }

    let mut deployment = Deployment::new(request.name.clone());
    deployment.apply_request(&request);

    match state.deployments.save_deployment(&deployment).await {
        Ok(()) => {
            info!("Created deployment {} ({})", deployment.name, deployment.id);
            (StatusCode::CREATED, Json(json!({ "deployment": deployment }))).into_response()
        }
        Err(e) => store_error_response(e),
    }
}

async fn get_deployment(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.deployments.get_deployment(id).await {
        Ok(Some(deployment)) => {
            (StatusCode::OK, Json(json!({ "deployment": deployment }))).into_response()
        }
        Ok(None) => deployment_not_found(id),
        Err(e) => store_error_response(e),
    }
}

async fn update_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<DeploymentRequest>,
) -> Response {
    let existing = match state.deployments.get_deployment(id).await {
        Ok(Some(deployment)) => deployment,
        Ok(None) => return deployment_not_found(id),
        Err(e) => return store_error_response(e),
    };

    let mut updated = existing.clone();
    updated.apply_request(&request);
    // The undercloud fields are owned by the undercloud registration flow and
    // never change through a plain deployment update.
    updated.openstack.undercloud_address = existing.openstack.undercloud_address;
    updated.openstack.undercloud_user = existing.openstack.undercloud_user;
    updated.openstack.undercloud_user_password = existing.openstack.undercloud_user_password;
    updated.openstack.undercloud_password = existing.openstack.undercloud_password;

    match state.deployments.update_deployment(&updated).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "deployment": updated }))).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn delete_deployment(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.deployments.delete_deployment(id).await {
        Ok(true) => {
            info!("Deleted deployment {}", id);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => deployment_not_found(id),
        Err(e) => store_error_response(e),
    }
}

async fn validate(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let deployment = match state.deployments.get_deployment(id).await {
        Ok(Some(deployment)) => deployment,
        Ok(None) => return deployment_not_found(id),
        Err(e) => return store_error_response(e),
    };

    let validation = validate_deployment(&deployment);
    let response = ValidationResponse {
        validation: ValidationReport {
            deployment_id: id,
            errors: validation.errors.full_messages(),
            warnings: validation.warnings,
        },
    };
    (StatusCode::OK, Json(response)).into_response()
}

async fn deploy(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let deployment = match state.deployments.get_deployment(id).await {
        Ok(Some(deployment)) => deployment,
        Ok(None) => return deployment_not_found(id),
        Err(e) => return store_error_response(e),
    };

    match state.runner.start(&deployment).await {
        Ok(task) => launched(&state, deployment, &task).await,
        Err(e) => orchestrator_error_response(e),
    }
}

async fn redeploy(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let deployment = match state.deployments.get_deployment(id).await {
        Ok(Some(deployment)) => deployment,
        Ok(None) => return deployment_not_found(id),
        Err(e) => return store_error_response(e),
    };

    match state.runner.redeploy(&deployment).await {
        Ok(task) => launched(&state, deployment, &task).await,
        Err(e) => orchestrator_error_response(e),
    }
}

/// Record the new task on the deployment and answer 202 with the ids the
/// client polls with. The task is already running, so a failed record is
/// logged rather than surfaced.
async fn launched(
    state: &AppState,
    mut deployment: Deployment,
    task: &capstan_common::models::Task,
) -> Response {
    deployment.current_task_id = Some(task.id);
    deployment.touch();
    if let Err(e) = state.deployments.update_deployment(&deployment).await {
        error!(
            "Failed to record task {} on deployment {}: {}",
            task.id, deployment.id, e
        );
    }

    let response = DeployResponse {
        task_id: task.id,
        deployment_id: deployment.id,
        status: task.status,
    };
    (StatusCode::ACCEPTED, Json(response)).into_response()
}

async fn get_task(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(Uuid, Uuid)>,
) -> Response {
    match state.tasks.get_task(task_id).await {
        Ok(Some(task)) if task.deployment_id == id => {
            (StatusCode::OK, Json(json!({ "task": TaskView::from(&task) }))).into_response()
        }
        Ok(_) => task_not_found(id, task_id),
        Err(e) => store_error_response(e),
    }
}

async fn cancel_task(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(Uuid, Uuid)>,
) -> Response {
    match state.tasks.get_task(task_id).await {
        Ok(Some(task)) if task.deployment_id == id => {}
        Ok(_) => return task_not_found(id, task_id),
        Err(e) => return store_error_response(e),
    }

    match state.runner.cancel(task_id).await {
        Ok(task) => {
            (StatusCode::OK, Json(json!({ "task": TaskView::from(&task) }))).into_response()
        }
        Err(e) => orchestrator_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    log_type: Option<String>,
    line_number_gt: Option<u64>,
}

async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> Response {
    match state.deployments.get_deployment(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return deployment_not_found(id),
        Err(e) => return store_error_response(e),
    }

    let log_type = match query.log_type.as_deref() {
        None => LogType::default(),
        Some(name) => match LogType::parse(name) {
            Some(log_type) => log_type,
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new(
                        "Bad Request",
                        format!("Unknown log type: {}", name),
                    )),
                )
                    .into_response();
            }
        },
    };

    let file = match query.line_number_gt {
        Some(line_number) => state.logs.read_after(id, log_type, line_number).await,
        None => state.logs.read_full(id, log_type).await,
    };
    match file {
        // A log that was never written renders as null, not as an error.
        Ok(file) => (StatusCode::OK, Json(json!({ log_type.as_str(): file }))).into_response(),
        Err(e) => {
            error!("Failed to read log for deployment {}: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Log Error", e.to_string())),
            )
                .into_response()
        }
    }
}

fn deployment_not_found(id: Uuid) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            "Not Found",
            format!("Deployment with ID {} not found", id),
        )),
    )
        .into_response()
}

fn task_not_found(deployment_id: Uuid, task_id: Uuid) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            "Not Found",
            format!(
                "Task with ID {} not found for deployment {}",
                task_id, deployment_id
            ),
        )),
    )
        .into_response()
}

fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(message) => {
            (StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not Found", message)))
                .into_response()
        }
        StoreError::AlreadyExists(message) => {
            (StatusCode::CONFLICT, Json(ErrorResponse::new("Conflict", message))).into_response()
        }
        other => {
            error!("Store error: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database Error", other.to_string())),
            )
                .into_response()
        }
    }
}

fn orchestrator_error_response(err: OrchestratorError) -> Response {
    match err {
        OrchestratorError::Validation(errors) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "errors": errors })))
                .into_response()
        }
        OrchestratorError::Conflict => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(
                "Conflict",
                "deployment already has an active task",
            )),
        )
            .into_response(),
        OrchestratorError::Store(inner) => store_error_response(inner),
        other => {
            error!("Task start failed: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal Error", other.to_string())),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogManager;
    use crate::store::MemoryStore;
    use capstan_actions::testing::mock_providers;
    use capstan_common::fixtures;
    use capstan_common::models::Task;
    use capstan_orchestrator::{TaskRunner, TaskStore};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let logs = Arc::new(LogManager::new(dir.path()));
        let (providers, _) = mock_providers();
        let runner = Arc::new(TaskRunner::new(store.clone(), providers));
        let state = AppState {
            deployments: store.clone(),
            tasks: store,
            runner,
            logs,
        };
        (state, dir)
    }

    fn request_from(deployment: &Deployment) -> DeploymentRequest {
        DeploymentRequest {
            name: deployment.name.clone(),
            description: deployment.description.clone(),
            deploy_openstack: deployment.deploy_openstack,
            deploy_cfme: deployment.deploy_cfme,
            deploy_rhev: deployment.deploy_rhev,
            deploy_openshift: deployment.deploy_openshift,
            openstack: deployment.openstack.clone(),
            cfme: deployment.cfme.clone(),
            rhev: deployment.rhev.clone(),
            openshift: deployment.openshift.clone(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn wait_terminal(state: &AppState, task_id: Uuid) -> Task {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(task) = state.tasks.get_task(task_id).await.unwrap() {
                if task.status.is_terminal() {
                    return task;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "task {} did not reach a terminal state",
                task_id
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_create_get_and_list() {
        let (state, _dir) = test_state();
        let request = request_from(&fixtures::configured_deployment());

        let response = create_deployment(State(state.clone()), Json(request)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let id: Uuid = serde_json::from_value(body["deployment"]["id"].clone()).unwrap();
        assert_eq!(body["deployment"]["name"], "qci");

        let response = get_deployment(State(state.clone()), Path(id)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = list_deployments(State(state)).await;
        let body = body_json(response).await;
        assert_eq!(body["deployments"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name() {
        let (state, _dir) = test_state();
        let mut deployment = fixtures::configured_deployment();
        deployment.name = "   ".to_string();

        let response =
            create_deployment(State(state), Json(request_from(&deployment))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["errors"]["name"][0], "can't be blank");
    }

    #[tokio::test]
    async fn test_get_unknown_deployment_is_404() {
        let (state, _dir) = test_state();
        let response = get_deployment(State(state), Path(Uuid::new_v4())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not Found");
    }

    #[tokio::test]
    async fn test_update_preserves_undercloud_fields() {
        let (state, _dir) = test_state();
        let mut deployment = fixtures::configured_deployment();
        deployment.openstack.undercloud_address = "192.0.2.10".to_string();
        deployment.openstack.undercloud_password = "sealed".to_string();
        state.deployments.save_deployment(&deployment).await.unwrap();

        let mut request = request_from(&deployment);
        request.description = Some("updated".to_string());
        request.openstack.undercloud_address = "198.51.100.99".to_string();
        request.openstack.undercloud_password = "overwritten".to_string();

        let response =
            update_deployment(State(state.clone()), Path(deployment.id), Json(request)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let stored = state
            .deployments
            .get_deployment(deployment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.description.as_deref(), Some("updated"));
        assert_eq!(stored.openstack.undercloud_address, "192.0.2.10");
        assert_eq!(stored.openstack.undercloud_password, "sealed");
    }

    #[tokio::test]
    async fn test_update_unknown_deployment_is_404() {
        let (state, _dir) = test_state();
        let request = request_from(&fixtures::configured_deployment());
        let response = update_deployment(State(state), Path(Uuid::new_v4()), Json(request)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_deployment() {
        let (state, _dir) = test_state();
        let deployment = fixtures::configured_deployment();
        state.deployments.save_deployment(&deployment).await.unwrap();

        let response = delete_deployment(State(state.clone()), Path(deployment.id)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = get_deployment(State(state.clone()), Path(deployment.id)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = delete_deployment(State(state), Path(deployment.id)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validate_reports_field_errors() {
        let (state, _dir) = test_state();
        let mut deployment = Deployment::new("qci");
        deployment.deploy_rhev = true;
        state.deployments.save_deployment(&deployment).await.unwrap();

        let response = validate(State(state), Path(deployment.id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["validation"]["deployment_id"], deployment.id.to_string());
        let errors = body["validation"]["errors"].as_array().unwrap();
        assert!(errors
            .iter()
            .any(|m| m.as_str().unwrap().contains("rhev.engine_host")));
        assert!(body["validation"]["warnings"].is_array());
    }

    #[tokio::test]
    async fn test_deploy_rejects_deployment_without_platforms() {
        let (state, _dir) = test_state();
        // All toggles off: valid to store, not valid to deploy.
        let deployment = fixtures::configured_deployment();
        state.deployments.save_deployment(&deployment).await.unwrap();

        let response = deploy(State(state), Path(deployment.id)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["errors"]["deployment"][0], "has no platforms selected");
    }

    #[tokio::test]
    async fn test_deploy_starts_task_and_records_it() {
        let (state, _dir) = test_state();
        let mut deployment = fixtures::configured_deployment();
        deployment.deploy_rhev = true;
        state.deployments.save_deployment(&deployment).await.unwrap();

        let response = deploy(State(state.clone()), Path(deployment.id)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        let task_id: Uuid = serde_json::from_value(body["task_id"].clone()).unwrap();
        assert_eq!(body["deployment_id"], deployment.id.to_string());

        let stored = state
            .deployments
            .get_deployment(deployment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_task_id, Some(task_id));

        let task = wait_terminal(&state, task_id).await;
        assert!(task.status.is_terminal());

        let response = get_task(State(state), Path((deployment.id, task_id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["task"]["status"], "SUCCEEDED");
    }

    #[tokio::test]
    async fn test_second_deploy_conflicts() {
        let (state, _dir) = test_state();
        let mut deployment = fixtures::configured_deployment();
        deployment.deploy_rhev = true;
        state.deployments.save_deployment(&deployment).await.unwrap();

        // On the current-thread test runtime the spawned run makes no
        // progress between these two calls, so the first task is still
        // pending when the second deploy checks for an active one.
        let first = deploy(State(state.clone()), Path(deployment.id)).await;
        assert_eq!(first.status(), StatusCode::ACCEPTED);

        let second = deploy(State(state.clone()), Path(deployment.id)).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let body = body_json(second).await;
        assert_eq!(body["error"], "Conflict");
    }

    #[tokio::test]
    async fn test_redeploy_after_success_starts_new_task() {
        let (state, _dir) = test_state();
        let mut deployment = fixtures::configured_deployment();
        deployment.deploy_rhev = true;
        state.deployments.save_deployment(&deployment).await.unwrap();

        let response = deploy(State(state.clone()), Path(deployment.id)).await;
        let body = body_json(response).await;
        let first_task: Uuid = serde_json::from_value(body["task_id"].clone()).unwrap();
        wait_terminal(&state, first_task).await;

        let response = redeploy(State(state.clone()), Path(deployment.id)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        let second_task: Uuid = serde_json::from_value(body["task_id"].clone()).unwrap();
        assert_ne!(first_task, second_task);

        let stored = state
            .deployments
            .get_deployment(deployment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_task_id, Some(second_task));
    }

    #[tokio::test]
    async fn test_get_task_checks_deployment_ownership() {
        let (state, _dir) = test_state();
        let mut deployment = fixtures::configured_deployment();
        deployment.deploy_rhev = true;
        state.deployments.save_deployment(&deployment).await.unwrap();
        let other = Deployment::new("other");
        state.deployments.save_deployment(&other).await.unwrap();

        let response = deploy(State(state.clone()), Path(deployment.id)).await;
        let body = body_json(response).await;
        let task_id: Uuid = serde_json::from_value(body["task_id"].clone()).unwrap();

        let response = get_task(State(state.clone()), Path((other.id, task_id))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = get_task(State(state), Path((deployment.id, Uuid::new_v4()))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancel_finished_task_is_a_noop() {
        let (state, _dir) = test_state();
        let mut deployment = fixtures::configured_deployment();
        deployment.deploy_rhev = true;
        state.deployments.save_deployment(&deployment).await.unwrap();

        let response = deploy(State(state.clone()), Path(deployment.id)).await;
        let body = body_json(response).await;
        let task_id: Uuid = serde_json::from_value(body["task_id"].clone()).unwrap();
        wait_terminal(&state, task_id).await;

        let response = cancel_task(State(state), Path((deployment.id, task_id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["task"]["status"], "SUCCEEDED");
    }

    #[tokio::test]
    async fn test_log_endpoint_contract() {
        let (state, _dir) = test_state();
        let deployment = fixtures::configured_deployment();
        state.deployments.save_deployment(&deployment).await.unwrap();

        // Never-written log renders as null.
        let response = get_log(
            State(state.clone()),
            Path(deployment.id),
            Query(LogQuery {
                log_type: None,
                line_number_gt: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["deployment_log"].is_null());

        state
            .logs
            .append(deployment.id, LogType::Deployment, "first")
            .await
            .unwrap();
        state
            .logs
            .append(deployment.id, LogType::Deployment, "second")
            .await
            .unwrap();

        let response = get_log(
            State(state.clone()),
            Path(deployment.id),
            Query(LogQuery {
                log_type: Some("deployment_log".to_string()),
                line_number_gt: Some(1),
            }),
        )
        .await;
        let body = body_json(response).await;
        let entries = body["deployment_log"]["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["line_number"], 2);

        let response = get_log(
            State(state.clone()),
            Path(deployment.id),
            Query(LogQuery {
                log_type: Some("ansible_log".to_string()),
                line_number_gt: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get_log(
            State(state),
            Path(Uuid::new_v4()),
            Query(LogQuery {
                log_type: None,
                line_number_gt: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

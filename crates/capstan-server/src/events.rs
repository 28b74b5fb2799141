//! Bridges task events into the per-deployment log files.
//!
//! The runner broadcasts a [`TaskEvent`] for every lifecycle transition. The
//! pump subscribes once at startup and mirrors each event into the right log
//! file: lifecycle lines into the deployment log, step progress and provider
//! detail into the provider log. Log writes are best effort; a failed append
//! never disturbs the running task.

use std::sync::Arc;

use capstan_orchestrator::TaskEvent;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::logs::{LogManager, LogType};

/// Spawn the background task that mirrors task events into log files. Runs
/// until the event channel closes or the server signals shutdown.
pub fn spawn_event_pump(
    logs: Arc<LogManager>,
    mut events: broadcast::Receiver<TaskEvent>,
    mut shutdown: watch::Receiver<()>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => write_event(&logs, &event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Log pump lagged behind task events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Task event channel closed, log pump shutting down");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    debug!("Shutdown signal received, log pump stopping");
                    break;
                }
            }
        }
    });
}

async fn write_event(logs: &LogManager, event: &TaskEvent) {
    match event {
        TaskEvent::TaskStarted {
            task_id,
            deployment_id,
        } => {
            append(
                logs,
                *deployment_id,
                LogType::Deployment,
                &format!("Task {} started", task_id),
            )
            .await;
        }
        TaskEvent::ActionStarted {
            deployment_id,
            action,
            description,
            ..
        } => {
            append(
                logs,
                *deployment_id,
                LogType::Deployment,
                &format!("Started: {} ({})", description, action),
            )
            .await;
        }
        TaskEvent::ActionProgress {
            deployment_id,
            action,
            message,
            ..
        } => {
            append(
                logs,
                *deployment_id,
                LogType::Provider,
                &format!("[{}] {}", action, message),
            )
            .await;
        }
        TaskEvent::ActionCompleted {
            deployment_id,
            action,
            message,
            details,
            ..
        } => {
            for detail in details {
                append(
                    logs,
                    *deployment_id,
                    LogType::Provider,
                    &format!("[{}] {}", action, detail),
                )
                .await;
            }
            append(
                logs,
                *deployment_id,
                LogType::Deployment,
                &format!("Completed: {}: {}", action, message),
            )
            .await;
        }
        TaskEvent::ActionFailed {
            deployment_id,
            action,
            error,
            ..
        } => {
            append(
                logs,
                *deployment_id,
                LogType::Deployment,
                &format!("Failed: {}: {}", action, error),
            )
            .await;
        }
        TaskEvent::TaskCompleted {
            task_id,
            deployment_id,
        } => {
            append(
                logs,
                *deployment_id,
                LogType::Deployment,
                &format!("Task {} succeeded", task_id),
            )
            .await;
        }
        TaskEvent::TaskFailed {
            task_id,
            deployment_id,
            error,
        } => {
            append(
                logs,
                *deployment_id,
                LogType::Deployment,
                &format!("Task {} failed: {}", task_id, error),
            )
            .await;
        }
    }
}

async fn append(logs: &LogManager, deployment_id: Uuid, log_type: LogType, line: &str) {
    if let Err(err) = logs.append(deployment_id, log_type, line).await {
        warn!(deployment_id = %deployment_id, error = %err, "Failed to append to deployment log");
    }
}

//! Task execution engine.
//!
//! The runner owns the background run of one task per deployment:
//! 1. Validates and plans, then persists the task before returning its id
//! 2. Executes each planned action in sequence on a spawned tokio task
//! 3. Persists every state transition before the provider call behind it
//! 4. Reports progress via events for the log pump and polling clients

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use capstan_actions::{ActionContext, Outcome, PlannedAction, ProgressReporter, ProviderSet};
use capstan_common::{validate_deployment, Deployment, Task};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::plan::{build_plan, ActionPlan};
use crate::store::{StoreError, TaskStore};

/// How many times one action is attempted before its failure is final.
const MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubles on each further one.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

const EVENT_CAPACITY: usize = 100;

/// Event emitted during task execution
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Task started
    TaskStarted { task_id: Uuid, deployment_id: Uuid },
    /// Action started
    ActionStarted {
        task_id: Uuid,
        deployment_id: Uuid,
        action: String,
        description: String,
    },
    /// Action progress update
    ActionProgress {
        task_id: Uuid,
        deployment_id: Uuid,
        action: String,
        message: String,
    },
    /// Action completed
    ActionCompleted {
        task_id: Uuid,
        deployment_id: Uuid,
        action: String,
        message: String,
        details: Vec<String>,
    },
    /// Action failed after its retries were spent
    ActionFailed {
        task_id: Uuid,
        deployment_id: Uuid,
        action: String,
        error: String,
    },
    /// Task completed
    TaskCompleted { task_id: Uuid, deployment_id: Uuid },
    /// Task failed or was cancelled
    TaskFailed {
        task_id: Uuid,
        deployment_id: Uuid,
        error: String,
    },
}

/// Task execution engine.
///
/// One runner serves every deployment; it enforces the single-active-task
/// rule, spawns the run in the background, and hands back the persisted
/// task so the client can start polling immediately.
pub struct TaskRunner {
    store: Arc<dyn TaskStore>,
    providers: ProviderSet,
    event_sender: broadcast::Sender<TaskEvent>,
    cancel_requests: Arc<Mutex<HashSet<Uuid>>>,
}

impl TaskRunner {
    pub fn new(store: Arc<dyn TaskStore>, providers: ProviderSet) -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            providers,
            event_sender,
            cancel_requests: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Subscribe to task events
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_sender.subscribe()
    }

    /// Validate the deployment, build its plan, and start a task for it.
    ///
    /// Fails with [`OrchestratorError::Conflict`] while the deployment still
    /// has a pending or running task.
    pub async fn start(&self, deployment: &Deployment) -> Result<Task> {
        let validation = validate_deployment(deployment);
        if !validation.is_valid() {
            return Err(OrchestratorError::Validation(validation.errors));
        }
        if self
            .store
            .active_task_for_deployment(deployment.id)
            .await?
            .is_some()
        {
            return Err(OrchestratorError::Conflict);
        }

        let plan = build_plan(deployment)?;
        info!(
            deployment_id = %deployment.id,
            steps = plan.len(),
            "Starting deployment task"
        );
        self.launch(deployment.id, plan).await
    }

    /// Start a fresh task for a deployment that has run before.
    pub async fn redeploy(&self, deployment: &Deployment) -> Result<Task> {
        warn!(
            "Attempting to redeploy deployment with id [ {} ]",
            deployment.id
        );
        self.start(deployment).await
    }

    /// Request cancellation of an active task.
    ///
    /// The run stops before its next step; a step already in flight is never
    /// interrupted. Cancelling a finished task is a no-op.
    pub async fn cancel(&self, task_id: Uuid) -> Result<Task> {
        let Some(task) = self.store.get_task(task_id).await? else {
            return Err(OrchestratorError::Store(StoreError::NotFound(format!(
                "task {}",
                task_id
            ))));
        };
        if task.status.is_terminal() {
            return Ok(task);
        }
        self.cancel_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_id);
        info!(%task_id, "Cancellation requested");
        Ok(task)
    }

    async fn launch(&self, deployment_id: Uuid, plan: ActionPlan) -> Result<Task> {
        let task = Task::new(deployment_id, plan.executions());
        self.store.save_task(&task).await?;

        let run = TaskRun {
            store: Arc::clone(&self.store),
            providers: self.providers.clone(),
            event_sender: self.event_sender.clone(),
            cancel_requests: Arc::clone(&self.cancel_requests),
        };
        let spawned = task.clone();
        tokio::spawn(async move {
            run.execute(spawned, plan).await;
        });

        Ok(task)
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner").finish_non_exhaustive()
    }
}

/// Owned state for one spawned run.
struct TaskRun {
    store: Arc<dyn TaskStore>,
    providers: ProviderSet,
    event_sender: broadcast::Sender<TaskEvent>,
    cancel_requests: Arc<Mutex<HashSet<Uuid>>>,
}

impl TaskRun {
    async fn execute(self, mut task: Task, plan: ActionPlan) {
        let task_id = task.id;
        let deployment_id = task.deployment_id;

        task.start();
        if let Err(err) = self.store.update_task(&task).await {
            error!(%task_id, error = %err, "Failed to persist task start");
            self.clear_cancel(task_id);
            return;
        }
        let _ = self.event_sender.send(TaskEvent::TaskStarted {
            task_id,
            deployment_id,
        });

        for (index, step) in plan.into_steps().into_iter().enumerate() {
            if self.cancel_requested(task_id) {
                info!(%task_id, "Task cancelled before step {}", index + 1);
                self.finish_failed(&mut task, "cancelled").await;
                return;
            }

            let action = step.name().to_string();

            // The running state reaches the store before any provider call,
            // so a crash cannot leave an externally-started step marked
            // as still planned.
            task.actions[index].start();
            if let Err(err) = self.store.update_task(&task).await {
                error!(%task_id, action = %action, error = %err, "Failed to persist action start");
                self.finish_failed(&mut task, format!("internal error: {}", err))
                    .await;
                return;
            }
            let _ = self.event_sender.send(TaskEvent::ActionStarted {
                task_id,
                deployment_id,
                action: action.clone(),
                description: step.description().to_string(),
            });
            info!(%task_id, action = %action, "Starting action");

            let reporter = Arc::new(EventProgressReporter {
                task_id,
                deployment_id,
                action: action.clone(),
                sender: self.event_sender.clone(),
            });
            let ctx = ActionContext::with_reporter(self.providers.clone(), reporter);

            let (result, attempts) = run_with_retry(&step, &ctx).await;
            task.actions[index].attempts = attempts;

            match result {
                Ok(outcome) => {
                    task.actions[index].complete(outcome.message.clone());
                    self.persist(&task).await;
                    let _ = self.event_sender.send(TaskEvent::ActionCompleted {
                        task_id,
                        deployment_id,
                        action: action.clone(),
                        message: outcome.message,
                        details: outcome.details,
                    });
                    info!(%task_id, action = %action, "Action completed successfully");
                }
                Err(err) => {
                    error!(%task_id, action = %action, error = %err, "Action failed");
                    task.actions[index].fail(err.to_string());
                    let _ = self.event_sender.send(TaskEvent::ActionFailed {
                        task_id,
                        deployment_id,
                        action: action.clone(),
                        error: err.to_string(),
                    });
                    self.finish_failed(&mut task, format!("{} failed: {}", action, err))
                        .await;
                    return;
                }
            }
        }

        task.succeed();
        self.persist(&task).await;
        let _ = self.event_sender.send(TaskEvent::TaskCompleted {
            task_id,
            deployment_id,
        });
        info!(%task_id, "Task completed successfully");
        self.clear_cancel(task_id);
    }

    async fn finish_failed(&self, task: &mut Task, error: impl Into<String>) {
        let error = error.into();
        task.fail(error.clone());
        self.persist(task).await;
        let _ = self.event_sender.send(TaskEvent::TaskFailed {
            task_id: task.id,
            deployment_id: task.deployment_id,
            error,
        });
        self.clear_cancel(task.id);
    }

    async fn persist(&self, task: &Task) {
        if let Err(err) = self.store.update_task(task).await {
            error!(task_id = %task.id, error = %err, "Failed to persist task state");
        }
    }

    fn cancel_requested(&self, task_id: Uuid) -> bool {
        self.cancel_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&task_id)
    }

    fn clear_cancel(&self, task_id: Uuid) {
        self.cancel_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&task_id);
    }
}

/// Run one step, retrying transient provider failures.
///
/// Returns the final result and the number of attempts made. Permanent
/// failures are final on the first attempt; transient ones are retried with
/// a doubling delay until [`MAX_ATTEMPTS`] is spent.
async fn run_with_retry(
    step: &PlannedAction,
    ctx: &ActionContext,
) -> (capstan_actions::Result<Outcome>, u32) {
    let mut attempt = 1u32;
    loop {
        match step.action.run(ctx).await {
            Ok(outcome) => return (Ok(outcome), attempt),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                warn!(
                    action = step.name(),
                    attempt,
                    error = %err,
                    "Transient failure, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return (Err(err), attempt),
        }
    }
}

/// Progress reporter that emits task events
struct EventProgressReporter {
    task_id: Uuid,
    deployment_id: Uuid,
    action: String,
    sender: broadcast::Sender<TaskEvent>,
}

#[async_trait]
impl ProgressReporter for EventProgressReporter {
    async fn report(&self, message: &str) {
        let _ = self.sender.send(TaskEvent::ActionProgress {
            task_id: self.task_id,
            deployment_id: self.deployment_id,
            action: self.action.clone(),
            message: message.to_string(),
        });
    }
}

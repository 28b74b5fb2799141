use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A deployment is the subject of orchestration: which platforms to install
/// and the per-platform configuration needed to install them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Deployment {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub deploy_openstack: bool,
    #[serde(default)]
    pub deploy_cfme: bool,
    #[serde(default)]
    pub deploy_rhev: bool,
    #[serde(default)]
    pub deploy_openshift: bool,
    #[serde(default)]
    pub openstack: OpenstackConfig,
    #[serde(default)]
    pub cfme: CfmeConfig,
    #[serde(default)]
    pub rhev: RhevConfig,
    #[serde(default)]
    pub openshift: OpenshiftConfig,
    /// Most recent orchestration task for this deployment, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            deploy_openstack: false,
            deploy_cfme: false,
            deploy_rhev: false,
            deploy_openshift: false,
            openstack: OpenstackConfig::default(),
            cfme: CfmeConfig::default(),
            rhev: RhevConfig::default(),
            openshift: OpenshiftConfig::default(),
            current_task_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True if any platform is selected for installation.
    pub fn has_platform_selected(&self) -> bool {
        self.deploy_openstack || self.deploy_cfme || self.deploy_rhev || self.deploy_openshift
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Copy every writable field from a request onto this deployment and bump
    /// the update timestamp. Id, task pointer and creation time are kept.
    pub fn apply_request(&mut self, request: &DeploymentRequest) {
        self.name = request.name.clone();
        self.description = request.description.clone();
        self.deploy_openstack = request.deploy_openstack;
        self.deploy_cfme = request.deploy_cfme;
        self.deploy_rhev = request.deploy_rhev;
        self.deploy_openshift = request.deploy_openshift;
        self.openstack = request.openstack.clone();
        self.cfme = request.cfme.clone();
        self.rhev = request.rhev.clone();
        self.openshift = request.openshift.clone();
        self.touch();
    }
}

/// OpenStack undercloud/overcloud configuration.
///
/// The undercloud fields are owned by the undercloud registration flow and are
/// stripped from plain deployment updates by the API layer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct OpenstackConfig {
    #[serde(default)]
    pub undercloud_address: String,
    #[serde(default)]
    pub undercloud_user: String,
    #[serde(default)]
    pub undercloud_user_password: String,
    /// Admin password for the undercloud API.
    #[serde(default)]
    pub undercloud_password: String,
    #[serde(default)]
    pub overcloud_address: String,
    /// Admin password for the overcloud API.
    #[serde(default)]
    pub overcloud_password: String,
    /// CIDR for the tenant network created on the overcloud.
    #[serde(default)]
    pub overcloud_private_net: String,
    /// CIDR for the external floating network.
    #[serde(default)]
    pub overcloud_float_net: String,
    #[serde(default)]
    pub overcloud_float_gateway: String,
    #[serde(default)]
    pub overcloud_ext_net_interface: String,
    #[serde(default)]
    pub overcloud_libvirt_type: String,
    #[serde(default)]
    pub controller_flavor: String,
    #[serde(default)]
    pub controller_count: u32,
    #[serde(default)]
    pub compute_flavor: String,
    #[serde(default)]
    pub compute_count: u32,
    #[serde(default)]
    pub ceph_storage_flavor: String,
    #[serde(default)]
    pub ceph_storage_count: u32,
    #[serde(default)]
    pub cinder_storage_flavor: String,
    #[serde(default)]
    pub cinder_storage_count: u32,
    #[serde(default)]
    pub swift_storage_flavor: String,
    #[serde(default)]
    pub swift_storage_count: u32,
}

/// CloudForms management engine configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct CfmeConfig {
    /// Which platform hosts the CFME appliance: "rhev" or "openstack".
    #[serde(default)]
    pub install_loc: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub root_password: String,
    #[serde(default)]
    pub admin_password: String,
}

/// RHEV engine and storage configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct RhevConfig {
    #[serde(default)]
    pub is_self_hosted: bool,
    #[serde(default)]
    pub engine_host: String,
    #[serde(default)]
    pub engine_admin_password: String,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub cpu_type: String,
    #[serde(default)]
    pub storage_name: String,
    /// "nfs" or "glusterfs".
    #[serde(default)]
    pub storage_type: String,
    #[serde(default)]
    pub storage_address: String,
    #[serde(default)]
    pub share_path: String,
    #[serde(default)]
    pub export_domain_name: String,
    #[serde(default)]
    pub export_domain_address: String,
    #[serde(default)]
    pub export_domain_path: String,
    #[serde(default)]
    pub root_password: String,
}

/// OpenShift node sizing and storage configuration. OpenShift nodes are
/// launched as VMs on the RHEV cluster.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct OpenshiftConfig {
    #[serde(default)]
    pub install_loc: String,
    #[serde(default)]
    pub number_master_nodes: u32,
    #[serde(default)]
    pub number_worker_nodes: u32,
    /// NFS storage reserved per deployment, in GB.
    #[serde(default)]
    pub storage_size: u32,
    #[serde(default)]
    pub master_vcpu: u32,
    #[serde(default)]
    pub master_ram: u32,
    #[serde(default)]
    pub master_disk: u32,
    #[serde(default)]
    pub node_vcpu: u32,
    #[serde(default)]
    pub node_ram: u32,
    #[serde(default)]
    pub node_disk: u32,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_password: String,
    #[serde(default)]
    pub subdomain_name: String,
    #[serde(default)]
    pub storage_name: String,
    #[serde(default)]
    pub storage_type: String,
}

/// Overall status of one orchestration task.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
        }
    }

    /// An active task blocks further deploys of the same deployment.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One orchestration run for a deployment. The task id is the correlation id
/// handed back to the polling client at start.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub status: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub actions: Vec<ActionExecution>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(deployment_id: Uuid, actions: Vec<ActionExecution>) -> Self {
        Self {
            id: Uuid::new_v4(),
            deployment_id,
            status: TaskState::Pending,
            started_at: None,
            completed_at: None,
            error: None,
            actions,
            created_at: Utc::now(),
        }
    }

    pub fn start(&mut self) {
        self.status = TaskState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn succeed(&mut self) {
        self.status = TaskState::Succeeded;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskState::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }
}

/// Status of one action execution within a task.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[default]
    Planned,
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Planned => "PLANNED",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One attempt to run one action within a task.
///
/// `inputs` is the snapshot captured at plan time; mutating the deployment
/// after planning does not change an already-planned step.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ActionExecution {
    pub name: String,
    pub description: String,
    pub inputs: serde_json::Value,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Duration in seconds, set on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
    /// Human-readable outcome on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error detail on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How many attempts the bounded retry used.
    #[serde(default)]
    pub attempts: u32,
}

impl ActionExecution {
    pub fn planned(
        name: impl Into<String>,
        description: impl Into<String>,
        inputs: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            inputs,
            status: ExecutionStatus::Planned,
            started_at: None,
            completed_at: None,
            seconds: None,
            message: None,
            error: None,
            attempts: 0,
        }
    }

    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, message: impl Into<String>) {
        self.status = ExecutionStatus::Success;
        self.completed_at = Some(Utc::now());
        self.message = Some(message.into());
        self.record_duration();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        self.record_duration();
    }

    fn record_duration(&mut self) {
        if let Some(started) = self.started_at {
            self.seconds = Some(
                Utc::now()
                    .signed_duration_since(started)
                    .num_seconds()
                    .max(0) as u64,
            );
        }
    }
}

/// Request body for creating or updating a deployment.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DeploymentRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub deploy_openstack: bool,
    #[serde(default)]
    pub deploy_cfme: bool,
    #[serde(default)]
    pub deploy_rhev: bool,
    #[serde(default)]
    pub deploy_openshift: bool,
    #[serde(default)]
    pub openstack: OpenstackConfig,
    #[serde(default)]
    pub cfme: CfmeConfig,
    #[serde(default)]
    pub rhev: RhevConfig,
    #[serde(default)]
    pub openshift: OpenshiftConfig,
}

/// Response body for a deploy/redeploy request: the correlation id the client
/// polls with, plus the initial task state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeployResponse {
    pub task_id: Uuid,
    pub deployment_id: Uuid,
    pub status: TaskState,
}

/// Per-action view returned by the status endpoint. Plan-time inputs are
/// deliberately not exposed here; they carry provider credentials.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActionExecutionView {
    pub name: String,
    pub description: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

impl From<&ActionExecution> for ActionExecutionView {
    fn from(exec: &ActionExecution) -> Self {
        Self {
            name: exec.name.clone(),
            description: exec.description.clone(),
            status: exec.status,
            started_at: exec.started_at,
            completed_at: exec.completed_at,
            seconds: exec.seconds,
            message: exec.message.clone(),
            error: exec.error.clone(),
            attempts: exec.attempts,
        }
    }
}

/// Read model for the status endpoint: overall task state plus per-action
/// status in plan order.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskView {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub status: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub actions: Vec<ActionExecutionView>,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            deployment_id: task.deployment_id,
            status: task.status,
            started_at: task.started_at,
            completed_at: task.completed_at,
            error: task.error.clone(),
            actions: task.actions.iter().map(ActionExecutionView::from).collect(),
        }
    }
}

/// Body of the validate endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub validation: ValidationReport,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationReport {
    pub deployment_id: Uuid,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_deployment_defaults() {
        let d = Deployment::new("qci");
        assert_eq!(d.name, "qci");
        assert!(!d.has_platform_selected());
        assert!(d.current_task_id.is_none());
    }

    #[test]
    fn test_task_state_roundtrip() {
        let json = serde_json::to_string(&TaskState::Succeeded).unwrap();
        assert_eq!(json, "\"SUCCEEDED\"");
        let back: TaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TaskState::Succeeded);
    }

    #[test]
    fn test_task_state_activity() {
        assert!(TaskState::Pending.is_active());
        assert!(TaskState::Running.is_active());
        assert!(!TaskState::Succeeded.is_active());
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn test_task_lifecycle() {
        let mut task = Task::new(Uuid::new_v4(), Vec::new());
        assert_eq!(task.status, TaskState::Pending);
        assert!(task.started_at.is_none());

        task.start();
        assert_eq!(task.status, TaskState::Running);
        assert!(task.started_at.is_some());

        task.fail("overcloud unreachable");
        assert_eq!(task.status, TaskState::Failed);
        assert_eq!(task.error.as_deref(), Some("overcloud unreachable"));
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_action_execution_lifecycle() {
        let mut exec =
            ActionExecution::planned("configure_overcloud", "Configure overcloud", serde_json::json!({}));
        assert_eq!(exec.status, ExecutionStatus::Planned);

        exec.start();
        assert_eq!(exec.status, ExecutionStatus::Running);

        exec.complete("tenant and networks configured");
        assert_eq!(exec.status, ExecutionStatus::Success);
        assert!(exec.seconds.is_some());
        assert_eq!(exec.message.as_deref(), Some("tenant and networks configured"));
    }

    #[test]
    fn test_task_view_hides_inputs() {
        let inputs = serde_json::json!({"overcloud_password": "secret"});
        let exec = ActionExecution::planned("configure_overcloud", "Configure overcloud", inputs);
        let task = Task::new(Uuid::new_v4(), vec![exec]);

        let view = TaskView::from(&task);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("configure_overcloud"));
    }

    #[test]
    fn test_deployment_request_partial_json() {
        let body = r#"{"name": "dev", "deploy_rhev": true, "rhev": {"engine_host": "rhev.example.com"}}"#;
        let req: DeploymentRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.name, "dev");
        assert!(req.deploy_rhev);
        assert!(!req.deploy_openstack);
        assert_eq!(req.rhev.engine_host, "rhev.example.com");
        assert!(req.rhev.cluster_name.is_empty());
    }
}

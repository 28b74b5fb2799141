//! The closed set of action kinds and the plan step that wraps them.

use serde::{Deserialize, Serialize};

use capstan_common::Deployment;

use crate::action::Action;
use crate::actions::{
    AttachRhevStorage, ConfigureOvercloud, ControllerCleanup, LaunchOpenshiftNodes,
    RegisterCloudProvider, SetupRhevEngine,
};
use crate::error::{ActionError, Result};

/// Every action the engine knows how to plan, in dependency order. The
/// enum is closed on purpose: an unknown action name in stored data is a
/// bug, not an extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SetupRhevEngine,
    AttachRhevStorage,
    ConfigureOvercloud,
    ControllerCleanup,
    LaunchOpenshiftNodes,
    RegisterCloudProvider,
}

impl ActionKind {
    /// Dependency order: the RHEV engine and its storage come before the
    /// OpenShift nodes that land on them, overcloud configuration before
    /// controller cleanup, and console registration last since it needs a
    /// reachable overcloud.
    pub const ALL: [ActionKind; 6] = [
        ActionKind::SetupRhevEngine,
        ActionKind::AttachRhevStorage,
        ActionKind::ConfigureOvercloud,
        ActionKind::ControllerCleanup,
        ActionKind::LaunchOpenshiftNodes,
        ActionKind::RegisterCloudProvider,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SetupRhevEngine => "setup_rhev_engine",
            ActionKind::AttachRhevStorage => "attach_rhev_storage",
            ActionKind::ConfigureOvercloud => "configure_overcloud",
            ActionKind::ControllerCleanup => "controller_cleanup",
            ActionKind::LaunchOpenshiftNodes => "launch_openshift_nodes",
            ActionKind::RegisterCloudProvider => "register_cloud_provider",
        }
    }

    pub fn parse(s: &str) -> Option<ActionKind> {
        ActionKind::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Whether the deployment's toggles put this action in the plan. The
    /// console registration needs both an appliance and an overcloud to
    /// point it at.
    pub fn enabled_for(&self, deployment: &Deployment) -> bool {
        match self {
            ActionKind::SetupRhevEngine | ActionKind::AttachRhevStorage => deployment.deploy_rhev,
            ActionKind::ConfigureOvercloud | ActionKind::ControllerCleanup => {
                deployment.deploy_openstack
            }
            ActionKind::LaunchOpenshiftNodes => deployment.deploy_openshift,
            ActionKind::RegisterCloudProvider => {
                deployment.deploy_cfme && deployment.deploy_openstack
            }
        }
    }

    /// Validate the deployment fields this action needs and snapshot them.
    /// Missing fields come back as `ActionError::InvalidInput`.
    pub fn plan(&self, deployment: &Deployment) -> Result<PlannedAction> {
        match self {
            ActionKind::SetupRhevEngine => planned(SetupRhevEngine::plan(deployment)?),
            ActionKind::AttachRhevStorage => planned(AttachRhevStorage::plan(deployment)?),
            ActionKind::ConfigureOvercloud => planned(ConfigureOvercloud::plan(deployment)?),
            ActionKind::ControllerCleanup => planned(ControllerCleanup::plan(deployment)?),
            ActionKind::LaunchOpenshiftNodes => planned(LaunchOpenshiftNodes::plan(deployment)?),
            ActionKind::RegisterCloudProvider => planned(RegisterCloudProvider::plan(deployment)?),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn planned<A>(action: A) -> Result<PlannedAction>
where
    A: Action + Serialize + 'static,
{
    let inputs = serde_json::to_value(&action)?;
    Ok(PlannedAction::new(Box::new(action), inputs))
}

/// One step of a built plan: the runnable action plus the input snapshot
/// that gets persisted on the execution record.
pub struct PlannedAction {
    pub action: Box<dyn Action>,
    pub inputs: serde_json::Value,
}

impl PlannedAction {
    pub fn new(action: Box<dyn Action>, inputs: serde_json::Value) -> Self {
        Self { action, inputs }
    }

    pub fn name(&self) -> &'static str {
        self.action.name()
    }

    pub fn description(&self) -> &'static str {
        self.action.description()
    }
}

impl std::fmt::Debug for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedAction")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

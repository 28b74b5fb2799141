//! Deployment plan construction.
//!
//! A plan is the ordered list of actions one deploy will run. The order is
//! fixed by `ActionKind::ALL`; the deploy toggles pick which of those actions
//! participate. Each step carries the input snapshot captured here, so edits
//! to the deployment after planning do not leak into a running task.

use capstan_actions::{ActionError, ActionKind, PlannedAction};
use capstan_common::{ActionExecution, Deployment, ValidationErrors};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid deployment: {0}")]
    Validation(ValidationErrors),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Ordered, toggle-filtered list of planned actions for one deploy.
#[derive(Debug)]
pub struct ActionPlan {
    steps: Vec<PlannedAction>,
}

impl ActionPlan {
    /// Build a plan from pre-constructed steps. Used by tests that drive the
    /// runner with doubles instead of the real action set.
    pub fn from_steps(steps: Vec<PlannedAction>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PlannedAction] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<PlannedAction> {
        self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Planned execution records for persisting alongside the task, one per
    /// step and in step order.
    pub fn executions(&self) -> Vec<ActionExecution> {
        self.steps
            .iter()
            .map(|step| {
                ActionExecution::planned(step.name(), step.description(), step.inputs.clone())
            })
            .collect()
    }
}

/// Plan a deploy for the given deployment.
///
/// Validation failures are collected across every participating action before
/// returning, so a client sees all missing fields at once rather than one per
/// round trip.
pub fn build_plan(deployment: &Deployment) -> Result<ActionPlan, PlanError> {
    let mut steps = Vec::new();
    let mut errors = ValidationErrors::new();

    for kind in ActionKind::ALL {
        if !kind.enabled_for(deployment) {
            continue;
        }
        match kind.plan(deployment) {
            Ok(step) => steps.push(step),
            Err(ActionError::InvalidInput(action_errors)) => errors.merge(action_errors),
            Err(other) => return Err(PlanError::Internal(other.to_string())),
        }
    }

    if !errors.is_empty() {
        return Err(PlanError::Validation(errors));
    }
    Ok(ActionPlan { steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_common::fixtures;

    fn step_names(plan: &ActionPlan) -> Vec<&'static str> {
        plan.steps().iter().map(|step| step.name()).collect()
    }

    #[test]
    fn test_all_toggles_produce_full_plan_in_order() {
        let mut deployment = fixtures::configured_deployment();
        deployment.deploy_rhev = true;
        deployment.deploy_openstack = true;
        deployment.deploy_cfme = true;
        deployment.deploy_openshift = true;

        let plan = build_plan(&deployment).unwrap();
        assert_eq!(
            step_names(&plan),
            vec![
                "setup_rhev_engine",
                "attach_rhev_storage",
                "configure_overcloud",
                "controller_cleanup",
                "launch_openshift_nodes",
                "register_cloud_provider",
            ]
        );
    }

    #[test]
    fn test_openstack_with_cfme_plan() {
        let mut deployment = fixtures::configured_deployment();
        deployment.deploy_openstack = true;
        deployment.deploy_cfme = true;

        let plan = build_plan(&deployment).unwrap();
        assert_eq!(
            step_names(&plan),
            vec![
                "configure_overcloud",
                "controller_cleanup",
                "register_cloud_provider",
            ]
        );
    }

    #[test]
    fn test_no_toggles_produce_empty_plan() {
        let deployment = fixtures::configured_deployment();
        let plan = build_plan(&deployment).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_every_toggle_combination_is_gated() {
        for mask in 0u8..16 {
            let mut deployment = fixtures::configured_deployment();
            deployment.deploy_rhev = mask & 1 != 0;
            deployment.deploy_openstack = mask & 2 != 0;
            deployment.deploy_cfme = mask & 4 != 0;
            deployment.deploy_openshift = mask & 8 != 0;

            let mut expected = Vec::new();
            if deployment.deploy_rhev {
                expected.extend(["setup_rhev_engine", "attach_rhev_storage"]);
            }
            if deployment.deploy_openstack {
                expected.extend(["configure_overcloud", "controller_cleanup"]);
            }
            if deployment.deploy_openshift {
                expected.push("launch_openshift_nodes");
            }
            if deployment.deploy_cfme && deployment.deploy_openstack {
                expected.push("register_cloud_provider");
            }

            let plan = build_plan(&deployment).unwrap();
            assert_eq!(step_names(&plan), expected, "toggle mask {:#06b}", mask);
        }
    }

    #[test]
    fn test_validation_errors_collected_across_actions() {
        let mut deployment = fixtures::configured_deployment();
        deployment.deploy_rhev = true;
        deployment.deploy_openstack = true;
        deployment.rhev.engine_host = String::new();
        deployment.openstack.overcloud_address = String::new();

        let err = build_plan(&deployment).unwrap_err();
        let PlanError::Validation(errors) = err else {
            panic!("expected validation error, got {:?}", err);
        };
        assert!(errors.contains("rhev.engine_host"));
        assert!(errors.contains("openstack.overcloud_address"));
    }

    #[test]
    fn test_executions_mirror_steps() {
        let mut deployment = fixtures::configured_deployment();
        deployment.deploy_rhev = true;

        let plan = build_plan(&deployment).unwrap();
        let executions = plan.executions();
        assert_eq!(executions.len(), plan.len());
        for (execution, step) in executions.iter().zip(plan.steps()) {
            assert_eq!(execution.name, step.name());
            assert_eq!(execution.description, step.description());
            assert_eq!(execution.inputs, step.inputs);
            assert_eq!(
                execution.status,
                capstan_common::ExecutionStatus::Planned
            );
        }
    }
}

use serde::Serialize;

use capstan_common::{Deployment, ValidationErrors};
use capstan_providers::{CloudProviderForm, ConsoleCredentials, ProviderError};

use crate::action::{Action, Outcome};
use crate::context::ActionContext;
use crate::error::Result;

/// Registers the overcloud as a cloud provider with the CloudForms console
/// so the appliance starts managing it. Provider entries are named
/// `{deployment}-RHOS` after the convention the console operators expect.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterCloudProvider {
    pub deployment_name: String,
    pub console_address: String,
    pub console_password: String,
    pub overcloud_address: String,
    pub overcloud_password: String,
}

impl RegisterCloudProvider {
    pub fn plan(deployment: &Deployment) -> std::result::Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if deployment.name.trim().is_empty() {
            errors.add("name", "can't be blank");
        }
        for (field, value) in [
            ("cfme.address", &deployment.cfme.address),
            ("cfme.admin_password", &deployment.cfme.admin_password),
            ("openstack.overcloud_address", &deployment.openstack.overcloud_address),
            ("openstack.overcloud_password", &deployment.openstack.overcloud_password),
        ] {
            if value.trim().is_empty() {
                errors.add(field, "can't be blank");
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            deployment_name: deployment.name.clone(),
            console_address: deployment.cfme.address.clone(),
            console_password: deployment.cfme.admin_password.clone(),
            overcloud_address: deployment.openstack.overcloud_address.clone(),
            overcloud_password: deployment.openstack.overcloud_password.clone(),
        })
    }

    pub fn provider_name(&self) -> String {
        format!("{}-RHOS", self.deployment_name)
    }
}

#[async_trait::async_trait]
impl Action for RegisterCloudProvider {
    fn name(&self) -> &'static str {
        "register_cloud_provider"
    }

    fn description(&self) -> &'static str {
        "Add the overcloud provider to CloudForms"
    }

    async fn run(&self, ctx: &ActionContext) -> Result<Outcome> {
        let provider_name = self.provider_name();
        ctx.progress(format!(
            "registering provider {} with the console at {}",
            provider_name, self.console_address
        ))
        .await;

        let creds = ConsoleCredentials::admin(&self.console_address, self.console_password.clone());
        let form = CloudProviderForm {
            name: provider_name.clone(),
            provider_type: "openstack".to_string(),
            hostname: self.overcloud_address.clone(),
            ip_address: self.overcloud_address.clone(),
            api_port: "5000".to_string(),
            zone: "default".to_string(),
            userid: "admin".to_string(),
            password: self.overcloud_password.clone(),
        };

        match ctx.providers.console.add_cloud_provider(&creds, &form).await {
            Ok(()) => Ok(Outcome::new(format!("Registered cloud provider {}", provider_name))),
            Err(ProviderError::Conflict(_)) => Ok(Outcome::new(format!(
                "Cloud provider {} was already registered",
                provider_name
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionError;
    use crate::testing::MockProviders;
    use capstan_common::fixtures::configured_deployment;
    use capstan_providers::MockConsoleClient;

    fn planned() -> RegisterCloudProvider {
        let mut deployment = configured_deployment();
        deployment.deploy_openstack = true;
        deployment.deploy_cfme = true;
        RegisterCloudProvider::plan(&deployment).unwrap()
    }

    #[test]
    fn test_plan_requires_console_and_overcloud() {
        let mut deployment = Deployment::new("bare");
        deployment.deploy_openstack = true;
        deployment.deploy_cfme = true;
        let errors = RegisterCloudProvider::plan(&deployment).unwrap_err();

        assert!(errors.contains("cfme.address"));
        assert!(errors.contains("cfme.admin_password"));
        assert!(errors.contains("openstack.overcloud_address"));
    }

    #[tokio::test]
    async fn test_submits_provider_form() {
        let action = planned();
        let handles = MockProviders::new();
        let ctx = ActionContext::new(handles.as_set());

        let outcome = action.run(&ctx).await.unwrap();
        assert!(outcome.message.contains("-RHOS"));

        let providers = handles.console.providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, action.provider_name());
        assert_eq!(providers[0].provider_type, "openstack");
        assert_eq!(providers[0].api_port, "5000");
        assert_eq!(providers[0].zone, "default");
        assert_eq!(providers[0].userid, "admin");
        assert_eq!(providers[0].hostname, action.overcloud_address);
    }

    #[tokio::test]
    async fn test_conflict_counts_as_registered() {
        let action = planned();
        let handles = MockProviders::new().with_console(MockConsoleClient::failing_with(
            ProviderError::Conflict("provider exists".to_string()),
        ));
        let ctx = ActionContext::new(handles.as_set());

        let outcome = action.run(&ctx).await.unwrap();
        assert!(outcome.message.contains("already registered"));
    }

    #[tokio::test]
    async fn test_auth_failure_is_permanent() {
        let action = planned();
        let handles = MockProviders::new().with_console(MockConsoleClient::failing_with(
            ProviderError::AuthenticationFailed("login".to_string()),
        ));
        let ctx = ActionContext::new(handles.as_set());

        let err = action.run(&ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::Provider(_)));
        assert!(!err.is_transient());
    }
}

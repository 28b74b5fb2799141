use serde::Serialize;

use capstan_common::{Deployment, ValidationErrors};
use capstan_providers::{
    ProviderError, StorageDomainKind, StorageDomainSpec, VirtCredentials,
};

use crate::action::{Action, Outcome};
use crate::context::ActionContext;
use crate::error::Result;

const DATA_CENTER: &str = "Default";

/// Attaches the configured storage domains to the RHEV data center: the
/// data domain always, the export domain when one is configured. Domains
/// that already exist by name are left alone.
#[derive(Debug, Clone, Serialize)]
pub struct AttachRhevStorage {
    pub engine_host: String,
    pub engine_admin_password: String,
    pub storage_name: String,
    pub storage_type: String,
    pub storage_address: String,
    pub share_path: String,
    pub export_domain_name: String,
    pub export_domain_address: String,
    pub export_domain_path: String,
}

impl AttachRhevStorage {
    pub fn plan(deployment: &Deployment) -> std::result::Result<Self, ValidationErrors> {
        let rhev = &deployment.rhev;
        let mut errors = ValidationErrors::new();
        for (field, value) in [
            ("rhev.engine_host", &rhev.engine_host),
            ("rhev.engine_admin_password", &rhev.engine_admin_password),
            ("rhev.storage_name", &rhev.storage_name),
            ("rhev.storage_address", &rhev.storage_address),
            ("rhev.share_path", &rhev.share_path),
        ] {
            if value.trim().is_empty() {
                errors.add(field, "can't be blank");
            }
        }
        if !matches!(rhev.storage_type.as_str(), "nfs" | "glusterfs") {
            errors.add("rhev.storage_type", "must be nfs or glusterfs");
        }
        if !rhev.export_domain_name.trim().is_empty() {
            if rhev.export_domain_address.trim().is_empty() {
                errors.add("rhev.export_domain_address", "can't be blank");
            }
            if rhev.export_domain_path.trim().is_empty() {
                errors.add("rhev.export_domain_path", "can't be blank");
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            engine_host: rhev.engine_host.clone(),
            engine_admin_password: rhev.engine_admin_password.clone(),
            storage_name: rhev.storage_name.clone(),
            storage_type: rhev.storage_type.clone(),
            storage_address: rhev.storage_address.clone(),
            share_path: rhev.share_path.clone(),
            export_domain_name: rhev.export_domain_name.clone(),
            export_domain_address: rhev.export_domain_address.clone(),
            export_domain_path: rhev.export_domain_path.clone(),
        })
    }

    fn has_export_domain(&self) -> bool {
        !self.export_domain_name.trim().is_empty()
    }

    /// Returns whether the domain was newly attached.
    async fn ensure_domain(
        &self,
        ctx: &ActionContext,
        creds: &VirtCredentials,
        spec: StorageDomainSpec,
    ) -> Result<bool> {
        let virt = &ctx.providers.virt;
        let existing = virt.list_storage_domains(creds).await?;
        if existing.iter().any(|d| d.name == spec.name) {
            ctx.progress(format!("storage domain {} is already attached", spec.name))
                .await;
            return Ok(false);
        }

        match virt.create_storage_domain(creds, &spec).await {
            Ok(domain) => {
                ctx.progress(format!("attached {} storage domain {}", domain.kind, domain.name))
                    .await;
                Ok(true)
            }
            Err(ProviderError::Conflict(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl Action for AttachRhevStorage {
    fn name(&self) -> &'static str {
        "attach_rhev_storage"
    }

    fn description(&self) -> &'static str {
        "Attach storage domains to the RHEV data center"
    }

    async fn run(&self, ctx: &ActionContext) -> Result<Outcome> {
        let creds = VirtCredentials::engine_admin(&self.engine_host, self.engine_admin_password.clone());

        let mut attached = 0;
        if self
            .ensure_domain(
                ctx,
                &creds,
                StorageDomainSpec {
                    name: self.storage_name.clone(),
                    kind: StorageDomainKind::Data,
                    storage_type: self.storage_type.clone(),
                    address: self.storage_address.clone(),
                    path: self.share_path.clone(),
                    data_center: DATA_CENTER.to_string(),
                },
            )
            .await?
        {
            attached += 1;
        }

        if self.has_export_domain() {
            // Export domains are NFS regardless of what backs the data
            // domain.
            if self
                .ensure_domain(
                    ctx,
                    &creds,
                    StorageDomainSpec {
                        name: self.export_domain_name.clone(),
                        kind: StorageDomainKind::Export,
                        storage_type: "nfs".to_string(),
                        address: self.export_domain_address.clone(),
                        path: self.export_domain_path.clone(),
                        data_center: DATA_CENTER.to_string(),
                    },
                )
                .await?
            {
                attached += 1;
            }
        }

        let mut outcome = Outcome::new(format!("Storage attached ({} new)", attached))
            .with_detail(format!("data domain {}", self.storage_name));
        if self.has_export_domain() {
            outcome = outcome.with_detail(format!("export domain {}", self.export_domain_name));
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProviders;
    use capstan_common::fixtures::configured_deployment;
    use capstan_providers::MockVirtClient;

    fn rhev_deployment() -> Deployment {
        let mut deployment = configured_deployment();
        deployment.deploy_rhev = true;
        deployment
    }

    #[test]
    fn test_plan_requires_storage_fields() {
        let mut deployment = Deployment::new("bare");
        deployment.deploy_rhev = true;
        let errors = AttachRhevStorage::plan(&deployment).unwrap_err();

        assert!(errors.contains("rhev.storage_name"));
        assert!(errors.contains("rhev.storage_address"));
        assert!(errors.contains("rhev.storage_type"));
    }

    #[test]
    fn test_plan_export_domain_all_or_nothing() {
        let mut deployment = rhev_deployment();
        deployment.rhev.export_domain_name = "export".to_string();
        let errors = AttachRhevStorage::plan(&deployment).unwrap_err();

        assert!(errors.contains("rhev.export_domain_address"));
        assert!(errors.contains("rhev.export_domain_path"));
    }

    #[tokio::test]
    async fn test_attaches_data_domain() {
        let action = AttachRhevStorage::plan(&rhev_deployment()).unwrap();
        let handles = MockProviders::new();
        let ctx = ActionContext::new(handles.as_set());

        let outcome = action.run(&ctx).await.unwrap();
        assert_eq!(outcome.message, "Storage attached (1 new)");
        assert_eq!(handles.virt.storage_domain_names(), vec!["data".to_string()]);
    }

    #[tokio::test]
    async fn test_attaches_export_domain_when_configured() {
        let mut deployment = rhev_deployment();
        deployment.rhev.export_domain_name = "export".to_string();
        deployment.rhev.export_domain_address = "nfs.example.com".to_string();
        deployment.rhev.export_domain_path = "/exports/export".to_string();
        let action = AttachRhevStorage::plan(&deployment).unwrap();

        let handles = MockProviders::new();
        let ctx = ActionContext::new(handles.as_set());

        let outcome = action.run(&ctx).await.unwrap();
        assert_eq!(outcome.message, "Storage attached (2 new)");
        assert_eq!(handles.virt.storage_domain_names().len(), 2);
    }

    #[tokio::test]
    async fn test_existing_domain_left_alone() {
        let action = AttachRhevStorage::plan(&rhev_deployment()).unwrap();
        let handles = MockProviders::new()
            .with_virt(MockVirtClient::new().with_storage_domain("data", StorageDomainKind::Data));
        let ctx = ActionContext::new(handles.as_set());

        let outcome = action.run(&ctx).await.unwrap();
        assert_eq!(outcome.message, "Storage attached (0 new)");
        assert_eq!(handles.virt.create_calls(), 0);
    }
}

use serde::Serialize;

use capstan_common::{Deployment, ValidationErrors};
use capstan_providers::{ProviderError, SshAuth, SshTarget, VirtCredentials, VmSpec};

use crate::action::{Action, Outcome};
use crate::context::ActionContext;
use crate::error::{ActionError, Result};

const SPACE_CHECK_MOUNT: &str = "/tmp/capstan-space-check";

/// Launches the OpenShift master and worker VMs on the RHEV cluster with
/// the configured sizing. Before touching the engine it mounts the NFS
/// storage pool and verifies the deployment's disk ask actually fits.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchOpenshiftNodes {
    pub deployment_name: String,
    pub engine_host: String,
    pub engine_root_password: String,
    pub engine_admin_password: String,
    pub cluster_name: String,
    pub storage_address: String,
    pub share_path: String,
    pub storage_size: u32,
    pub number_master_nodes: u32,
    pub number_worker_nodes: u32,
    pub master_vcpu: u32,
    pub master_ram: u32,
    pub master_disk: u32,
    pub node_vcpu: u32,
    pub node_ram: u32,
    pub node_disk: u32,
}

impl LaunchOpenshiftNodes {
    pub fn plan(deployment: &Deployment) -> std::result::Result<Self, ValidationErrors> {
        let rhev = &deployment.rhev;
        let ose = &deployment.openshift;
        let mut errors = ValidationErrors::new();

        if deployment.name.trim().is_empty() {
            errors.add("name", "can't be blank");
        }
        for (field, value) in [
            ("rhev.engine_host", &rhev.engine_host),
            ("rhev.root_password", &rhev.root_password),
            ("rhev.engine_admin_password", &rhev.engine_admin_password),
            ("rhev.cluster_name", &rhev.cluster_name),
            ("rhev.storage_address", &rhev.storage_address),
            ("rhev.share_path", &rhev.share_path),
        ] {
            if value.trim().is_empty() {
                errors.add(field, "can't be blank");
            }
        }
        if ose.number_master_nodes == 0 {
            errors.add("openshift.number_master_nodes", "must be at least 1");
        }
        if ose.number_worker_nodes == 0 {
            errors.add("openshift.number_worker_nodes", "must be at least 1");
        }
        if ose.storage_size == 0 {
            errors.add("openshift.storage_size", "must be greater than 0");
        }
        for (field, value) in [
            ("openshift.master_vcpu", ose.master_vcpu),
            ("openshift.master_ram", ose.master_ram),
            ("openshift.master_disk", ose.master_disk),
            ("openshift.node_vcpu", ose.node_vcpu),
            ("openshift.node_ram", ose.node_ram),
            ("openshift.node_disk", ose.node_disk),
        ] {
            if value == 0 {
                errors.add(field, "must be greater than 0");
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            deployment_name: deployment.name.clone(),
            engine_host: rhev.engine_host.clone(),
            engine_root_password: rhev.root_password.clone(),
            engine_admin_password: rhev.engine_admin_password.clone(),
            cluster_name: rhev.cluster_name.clone(),
            storage_address: rhev.storage_address.clone(),
            share_path: rhev.share_path.clone(),
            storage_size: ose.storage_size,
            number_master_nodes: ose.number_master_nodes,
            number_worker_nodes: ose.number_worker_nodes,
            master_vcpu: ose.master_vcpu,
            master_ram: ose.master_ram,
            master_disk: ose.master_disk,
            node_vcpu: ose.node_vcpu,
            node_ram: ose.node_ram,
            node_disk: ose.node_disk,
        })
    }

    fn vm_label(&self) -> String {
        self.deployment_name.to_lowercase().replace(' ', "-")
    }

    fn vm_specs(&self) -> Vec<VmSpec> {
        let label = self.vm_label();
        let mut specs = Vec::new();
        for i in 1..=self.number_master_nodes {
            specs.push(VmSpec {
                name: format!("{}-ose-master-{}", label, i),
                cluster: self.cluster_name.clone(),
                vcpu: self.master_vcpu,
                memory_mb: u64::from(self.master_ram),
                disk_gb: u64::from(self.master_disk),
            });
        }
        for i in 1..=self.number_worker_nodes {
            specs.push(VmSpec {
                name: format!("{}-ose-node-{}", label, i),
                cluster: self.cluster_name.clone(),
                vcpu: self.node_vcpu,
                memory_mb: u64::from(self.node_ram),
                disk_gb: u64::from(self.node_disk),
            });
        }
        specs
    }

    fn space_check_command(&self) -> String {
        format!(
            "mkdir -p {mp} && mount -t nfs {addr}:{path} {mp} && df -m --output=avail {mp} | tail -n 1 && umount {mp}",
            mp = SPACE_CHECK_MOUNT,
            addr = self.storage_address,
            path = self.share_path,
        )
    }

    /// Shared storage plus every node's disk, in megabytes.
    fn required_mb(&self) -> u64 {
        let node_disks = u64::from(self.number_master_nodes) * u64::from(self.master_disk)
            + u64::from(self.number_worker_nodes) * u64::from(self.node_disk);
        (u64::from(self.storage_size) + node_disks) * 1024
    }

    async fn check_storage_space(&self, ctx: &ActionContext) -> Result<u64> {
        let target = SshTarget::new(
            &self.engine_host,
            "root",
            SshAuth::Password(self.engine_root_password.clone()),
        );
        let result = ctx.providers.ssh.execute(&target, &self.space_check_command()).await?;
        if !result.success() {
            return Err(ActionError::ExecutionFailed(format!(
                "could not mount the storage share {}:{}: {}",
                self.storage_address,
                self.share_path,
                result.stderr.trim()
            )));
        }

        let available_mb: u64 = result
            .stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .and_then(|l| l.trim().parse().ok())
            .ok_or_else(|| {
                ActionError::ExecutionFailed(format!(
                    "could not read available space from: {:?}",
                    result.stdout
                ))
            })?;

        let required_mb = self.required_mb();
        if available_mb < required_mb {
            return Err(ActionError::ExecutionFailed(format!(
                "not enough space on {}:{}: {} MB available, {} MB required",
                self.storage_address, self.share_path, available_mb, required_mb
            )));
        }

        ctx.progress(format!(
            "storage pool has {} MB available ({} MB required)",
            available_mb, required_mb
        ))
        .await;
        Ok(available_mb)
    }
}

#[async_trait::async_trait]
impl Action for LaunchOpenshiftNodes {
    fn name(&self) -> &'static str {
        "launch_openshift_nodes"
    }

    fn description(&self) -> &'static str {
        "Launch the OpenShift master and worker nodes"
    }

    async fn run(&self, ctx: &ActionContext) -> Result<Outcome> {
        self.check_storage_space(ctx).await?;

        let creds = VirtCredentials::engine_admin(&self.engine_host, self.engine_admin_password.clone());
        let virt = &ctx.providers.virt;
        let existing = virt.list_vms(&creds).await?;

        let mut created = 0;
        let mut to_start = Vec::new();
        for spec in self.vm_specs() {
            if let Some(vm) = existing.iter().find(|v| v.name == spec.name) {
                if !vm.is_up() {
                    to_start.push((vm.id.clone(), vm.name.clone()));
                }
                continue;
            }

            match virt.create_vm(&creds, &spec).await {
                Ok(vm) => {
                    ctx.progress(format!("created vm {}", vm.name)).await;
                    created += 1;
                    to_start.push((vm.id, vm.name));
                }
                // Racing another creator still means the vm exists.
                Err(ProviderError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        for (id, name) in to_start {
            virt.start_vm(&creds, &id).await?;
            ctx.progress(format!("started vm {}", name)).await;
        }

        Ok(Outcome::new(format!("OpenShift nodes ready ({} created)", created))
            .with_detail(format!(
                "{} master(s), {} worker(s) on cluster {}",
                self.number_master_nodes, self.number_worker_nodes, self.cluster_name
            )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProviders;
    use capstan_common::fixtures::configured_deployment;
    use capstan_providers::{MockSshClient, MockVirtClient, SshCommandResult};

    fn ose_deployment() -> Deployment {
        let mut deployment = configured_deployment();
        deployment.deploy_rhev = true;
        deployment.deploy_openshift = true;
        deployment
    }

    fn with_space(action: &LaunchOpenshiftNodes, megabytes: &str) -> MockSshClient {
        MockSshClient::new()
            .with_response(&action.space_check_command(), SshCommandResult::ok(megabytes))
    }

    #[test]
    fn test_plan_requires_counts_and_sizing() {
        let mut deployment = ose_deployment();
        deployment.openshift.number_master_nodes = 0;
        deployment.openshift.master_ram = 0;
        let errors = LaunchOpenshiftNodes::plan(&deployment).unwrap_err();

        assert!(errors.contains("openshift.number_master_nodes"));
        assert!(errors.contains("openshift.master_ram"));
    }

    #[test]
    fn test_required_space_accounts_for_all_nodes() {
        let action = LaunchOpenshiftNodes::plan(&ose_deployment()).unwrap();
        // 30 GB shared + 1x30 GB master + 1x15 GB worker
        assert_eq!(action.required_mb(), 75 * 1024);
    }

    #[tokio::test]
    async fn test_launches_masters_and_workers() {
        let action = LaunchOpenshiftNodes::plan(&ose_deployment()).unwrap();
        let handles = MockProviders::new().with_ssh(with_space(&action, "102400\n"));
        let ctx = ActionContext::new(handles.as_set());

        let outcome = action.run(&ctx).await.unwrap();
        assert_eq!(outcome.message, "OpenShift nodes ready (2 created)");

        let names = handles.virt.vm_names();
        assert!(names.iter().any(|n| n.ends_with("-ose-master-1")));
        assert!(names.iter().any(|n| n.ends_with("-ose-node-1")));
        assert_eq!(handles.virt.started_vms().len(), 2);
    }

    #[tokio::test]
    async fn test_rerun_starts_down_vms_without_creating() {
        let action = LaunchOpenshiftNodes::plan(&ose_deployment()).unwrap();
        let handles = MockProviders::new().with_ssh(with_space(&action, "102400\n"));
        let ctx = ActionContext::new(handles.as_set());

        action.run(&ctx).await.unwrap();
        let created_first = handles.virt.vm_names().len();

        let outcome = action.run(&ctx).await.unwrap();
        assert_eq!(outcome.message, "OpenShift nodes ready (0 created)");
        assert_eq!(handles.virt.vm_names().len(), created_first);
        // Already up, so no extra starts either.
        assert_eq!(handles.virt.started_vms().len(), created_first);
    }

    #[tokio::test]
    async fn test_fails_when_pool_too_small() {
        let action = LaunchOpenshiftNodes::plan(&ose_deployment()).unwrap();
        let handles = MockProviders::new().with_ssh(with_space(&action, "1024\n"));
        let ctx = ActionContext::new(handles.as_set());

        let err = action.run(&ctx).await.unwrap_err();
        match err {
            ActionError::ExecutionFailed(msg) => assert!(msg.contains("not enough space")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(handles.virt.vm_names().is_empty());
    }

    #[tokio::test]
    async fn test_fails_when_share_unmountable() {
        let action = LaunchOpenshiftNodes::plan(&ose_deployment()).unwrap();
        let handles = MockProviders::new().with_ssh(MockSshClient::new().with_response(
            &action.space_check_command(),
            SshCommandResult {
                stdout: String::new(),
                stderr: "mount.nfs: Connection timed out".to_string(),
                exit_code: 32,
            },
        ));
        let ctx = ActionContext::new(handles.as_set());

        let err = action.run(&ctx).await.unwrap_err();
        match err {
            ActionError::ExecutionFailed(msg) => assert!(msg.contains("could not mount")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_vm_names_use_sanitized_label() {
        let mut deployment = ose_deployment();
        deployment.name = "My Deployment".to_string();
        let action = LaunchOpenshiftNodes::plan(&deployment).unwrap();

        let specs = action.vm_specs();
        assert_eq!(specs[0].name, "my-deployment-ose-master-1");
    }
}

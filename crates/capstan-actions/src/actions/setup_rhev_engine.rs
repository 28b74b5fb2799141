use serde::Serialize;

use capstan_common::{Deployment, ValidationErrors};
use capstan_providers::{ClusterSpec, ProviderError, SshAuth, SshTarget, VirtCredentials};

use crate::action::{Action, Outcome};
use crate::context::ActionContext;
use crate::error::{ActionError, Result};

const ANSWERS_PATH: &str = "/root/capstan-engine.answers";

/// Runs the engine setup on the RHEV host with an answers snapshot, then
/// makes sure the target cluster exists with the configured CPU type.
/// Skips the setup itself when the engine service is already active.
#[derive(Debug, Clone, Serialize)]
pub struct SetupRhevEngine {
    pub engine_host: String,
    pub root_password: String,
    pub engine_admin_password: String,
    pub database_name: String,
    pub cluster_name: String,
    pub cpu_type: String,
    pub is_self_hosted: bool,
}

impl SetupRhevEngine {
    pub fn plan(deployment: &Deployment) -> std::result::Result<Self, ValidationErrors> {
        let rhev = &deployment.rhev;
        let mut errors = ValidationErrors::new();
        for (field, value) in [
            ("rhev.engine_host", &rhev.engine_host),
            ("rhev.root_password", &rhev.root_password),
            ("rhev.engine_admin_password", &rhev.engine_admin_password),
            ("rhev.cluster_name", &rhev.cluster_name),
        ] {
            if value.trim().is_empty() {
                errors.add(field, "can't be blank");
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let database_name = if rhev.database_name.trim().is_empty() {
            "engine".to_string()
        } else {
            rhev.database_name.clone()
        };
        let cpu_type = if rhev.cpu_type.trim().is_empty() {
            "Intel Conroe Family".to_string()
        } else {
            rhev.cpu_type.clone()
        };

        Ok(Self {
            engine_host: rhev.engine_host.clone(),
            root_password: rhev.root_password.clone(),
            engine_admin_password: rhev.engine_admin_password.clone(),
            database_name,
            cluster_name: rhev.cluster_name.clone(),
            cpu_type,
            is_self_hosted: rhev.is_self_hosted,
        })
    }

    fn write_answers_command(&self) -> String {
        format!(
            "cat > {path} << 'CAPSTAN_ANSWERS'\n\
             [environment:default]\n\
             OVESETUP_CONFIG/adminPassword=str:{admin}\n\
             OVESETUP_DB/database=str:{db}\n\
             OVESETUP_CONFIG/fqdn=str:{host}\n\
             OVESETUP_DIALOG/confirmSettings=bool:True\n\
             CAPSTAN_ANSWERS",
            path = ANSWERS_PATH,
            admin = self.engine_admin_password,
            db = self.database_name,
            host = self.engine_host,
        )
    }

    fn setup_command(&self) -> String {
        if self.is_self_hosted {
            format!("hosted-engine --deploy --config-append={}", ANSWERS_PATH)
        } else {
            format!("engine-setup --offline --config-append={}", ANSWERS_PATH)
        }
    }

    async fn engine_is_active(&self, ctx: &ActionContext, target: &SshTarget) -> Result<bool> {
        let state = ctx
            .providers
            .ssh
            .execute(target, "systemctl is-active ovirt-engine")
            .await?;
        Ok(state.success() && state.stdout.trim() == "active")
    }

    async fn ensure_cluster(&self, ctx: &ActionContext) -> Result<()> {
        let creds = VirtCredentials::engine_admin(&self.engine_host, self.engine_admin_password.clone());
        let virt = &ctx.providers.virt;

        let clusters = virt.list_clusters(&creds).await?;
        if clusters.iter().any(|c| c.name == self.cluster_name) {
            return Ok(());
        }

        let spec = ClusterSpec {
            name: self.cluster_name.clone(),
            cpu_type: self.cpu_type.clone(),
        };
        match virt.create_cluster(&creds, &spec).await {
            Ok(cluster) => {
                ctx.progress(format!("created cluster {}", cluster.name)).await;
                Ok(())
            }
            Err(ProviderError::Conflict(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl Action for SetupRhevEngine {
    fn name(&self) -> &'static str {
        "setup_rhev_engine"
    }

    fn description(&self) -> &'static str {
        "Set up the RHEV engine"
    }

    async fn run(&self, ctx: &ActionContext) -> Result<Outcome> {
        let target = SshTarget::new(
            &self.engine_host,
            "root",
            SshAuth::Password(self.root_password.clone()),
        );

        let message = if self.engine_is_active(ctx, &target).await? {
            ctx.progress(format!("engine on {} is already running", self.engine_host))
                .await;
            "Engine already set up"
        } else {
            ctx.progress(format!("running engine setup on {}", self.engine_host)).await;

            let ssh = &ctx.providers.ssh;
            let staged = ssh.execute(&target, &self.write_answers_command()).await?;
            if !staged.success() {
                return Err(ActionError::ExecutionFailed(format!(
                    "could not stage the engine answer file: {}",
                    staged.stderr.trim()
                )));
            }

            let setup = ssh.execute(&target, &self.setup_command()).await?;
            if !setup.success() {
                return Err(ActionError::ExecutionFailed(format!(
                    "engine setup failed on {}: {}",
                    self.engine_host,
                    setup.stderr.trim()
                )));
            }
            "Engine setup completed"
        };

        self.ensure_cluster(ctx).await?;

        Ok(Outcome::new(message).with_detail(format!(
            "cluster {} ({}) on {}",
            self.cluster_name, self.cpu_type, self.engine_host
        )))
    }
}

use serde::Serialize;

use capstan_common::{Deployment, ValidationErrors};
use capstan_providers::{
    CloudCredentials, Network, NetworkSpec, ProviderError, Router, RouterSpec, Subnet, SubnetSpec,
    Tenant,
};

use crate::action::{Action, Outcome};
use crate::context::ActionContext;
use crate::error::{ActionError, Result};

/// The physical network the overcloud installer wires external traffic to.
const EXTERNAL_PHYSICAL_NET: &str = "datacentre";

/// Configures a new tenant and networks on a freshly installed overcloud:
/// a tenant named after the deployment with the admin user granted on it, a
/// private network with DHCP, an external floating network, and a router
/// joining the two.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigureOvercloud {
    pub deployment_name: String,
    pub overcloud_address: String,
    pub overcloud_password: String,
    pub private_cidr: String,
    pub float_cidr: String,
    pub float_gateway: String,
}

impl ConfigureOvercloud {
    pub fn plan(deployment: &Deployment) -> std::result::Result<Self, ValidationErrors> {
        let os = &deployment.openstack;
        let mut errors = ValidationErrors::new();
        if deployment.name.trim().is_empty() {
            errors.add("name", "can't be blank");
        }
        for (field, value) in [
            ("openstack.overcloud_address", &os.overcloud_address),
            ("openstack.overcloud_password", &os.overcloud_password),
            ("openstack.overcloud_private_net", &os.overcloud_private_net),
            ("openstack.overcloud_float_net", &os.overcloud_float_net),
            ("openstack.overcloud_float_gateway", &os.overcloud_float_gateway),
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
            overcloud_address: os.overcloud_address.clone(),
            overcloud_password: os.overcloud_password.clone(),
            private_cidr: os.overcloud_private_net.clone(),
            float_cidr: os.overcloud_float_net.clone(),
            float_gateway: os.overcloud_float_gateway.clone(),
        })
    }

    fn credentials(&self) -> CloudCredentials {
        CloudCredentials::admin(&self.overcloud_address, self.overcloud_password.clone())
    }

    async fn ensure_tenant(&self, ctx: &ActionContext, creds: &CloudCredentials) -> Result<Tenant> {
        let cloud = &ctx.providers.cloud;
        let existing = cloud.list_tenants(creds).await?;
        if let Some(tenant) = existing.into_iter().find(|t| t.name == self.deployment_name) {
            ctx.progress(format!("tenant {} already exists", tenant.name)).await;
            return Ok(tenant);
        }

        match cloud.create_tenant(creds, &self.deployment_name).await {
            Ok(tenant) => {
                ctx.progress(format!("created tenant {}", tenant.name)).await;
                Ok(tenant)
            }
            Err(ProviderError::Conflict(_)) => self.refetch_tenant(ctx, creds).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn refetch_tenant(&self, ctx: &ActionContext, creds: &CloudCredentials) -> Result<Tenant> {
        ctx.providers
            .cloud
            .list_tenants(creds)
            .await?
            .into_iter()
            .find(|t| t.name == self.deployment_name)
            .ok_or_else(|| {
                ActionError::ExecutionFailed(format!(
                    "tenant {} reported existing but not found",
                    self.deployment_name
                ))
            })
    }

    /// The new tenant gets the stock admin user as its admin, the same
    /// grant the installer has always made instead of minting a new user.
    async fn grant_admin(
        &self,
        ctx: &ActionContext,
        creds: &CloudCredentials,
        tenant_id: &str,
    ) -> Result<()> {
        let cloud = &ctx.providers.cloud;
        let user = cloud
            .list_users(creds)
            .await?
            .into_iter()
            .find(|u| u.name == "admin")
            .ok_or_else(|| ActionError::ExecutionFailed("no admin user on the overcloud".to_string()))?;
        let role = cloud
            .list_roles(creds)
            .await?
            .into_iter()
            .find(|r| r.name == "admin")
            .ok_or_else(|| ActionError::ExecutionFailed("no admin role on the overcloud".to_string()))?;

        match cloud.grant_tenant_role(creds, tenant_id, &user.id, &role.id).await {
            Ok(()) => {
                ctx.progress("granted the admin role on the new tenant").await;
                Ok(())
            }
            Err(ProviderError::Conflict(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_network(
        &self,
        ctx: &ActionContext,
        creds: &CloudCredentials,
        spec: NetworkSpec,
    ) -> Result<Network> {
        let cloud = &ctx.providers.cloud;
        let existing = cloud.list_networks(creds).await?;
        if let Some(network) = existing.into_iter().find(|n| n.name == spec.name) {
            return Ok(network);
        }

        match cloud.create_network(creds, &spec).await {
            Ok(network) => {
                ctx.progress(format!("created network {}", network.name)).await;
                Ok(network)
            }
            Err(ProviderError::Conflict(_)) => cloud
                .list_networks(creds)
                .await?
                .into_iter()
                .find(|n| n.name == spec.name)
                .ok_or_else(|| {
                    ActionError::ExecutionFailed(format!(
                        "network {} reported existing but not found",
                        spec.name
                    ))
                }),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_subnet(
        &self,
        ctx: &ActionContext,
        creds: &CloudCredentials,
        spec: SubnetSpec,
    ) -> Result<Subnet> {
        let cloud = &ctx.providers.cloud;
        let existing = cloud.list_subnets(creds).await?;
        if let Some(subnet) = existing.into_iter().find(|s| s.name == spec.name) {
            return Ok(subnet);
        }

        match cloud.create_subnet(creds, &spec).await {
            Ok(subnet) => {
                ctx.progress(format!("created subnet {}", subnet.name)).await;
                Ok(subnet)
            }
            Err(ProviderError::Conflict(_)) => cloud
                .list_subnets(creds)
                .await?
                .into_iter()
                .find(|s| s.name == spec.name)
                .ok_or_else(|| {
                    ActionError::ExecutionFailed(format!(
                        "subnet {} reported existing but not found",
                        spec.name
                    ))
                }),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_router(
        &self,
        ctx: &ActionContext,
        creds: &CloudCredentials,
        spec: RouterSpec,
    ) -> Result<Router> {
        let cloud = &ctx.providers.cloud;
        let existing = cloud.list_routers(creds).await?;
        if let Some(router) = existing.into_iter().find(|r| r.name == spec.name) {
            return Ok(router);
        }

        match cloud.create_router(creds, &spec).await {
            Ok(router) => {
                ctx.progress(format!("created router {}", router.name)).await;
                Ok(router)
            }
            Err(ProviderError::Conflict(_)) => cloud
                .list_routers(creds)
                .await?
                .into_iter()
                .find(|r| r.name == spec.name)
                .ok_or_else(|| {
                    ActionError::ExecutionFailed(format!(
                        "router {} reported existing but not found",
                        spec.name
                    ))
                }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl Action for ConfigureOvercloud {
    fn name(&self) -> &'static str {
        "configure_overcloud"
    }

    fn description(&self) -> &'static str {
        "Configure a new tenant and networks on the Overcloud"
    }

    async fn run(&self, ctx: &ActionContext) -> Result<Outcome> {
        let creds = self.credentials();
        let cloud = &ctx.providers.cloud;
        let name = &self.deployment_name;

        ctx.progress(format!(
            "configuring the overcloud at {} for deployment {}",
            self.overcloud_address, name
        ))
        .await;

        let tenant = self.ensure_tenant(ctx, &creds).await?;
        self.grant_admin(ctx, &creds, &tenant.id).await?;

        // Nameservers come from whatever subnet the installer already laid
        // down, read before any of ours exist.
        let dns_nameservers: Vec<String> = cloud
            .list_subnets(&creds)
            .await?
            .first()
            .and_then(|s| s.dns_nameservers.first().cloned())
            .into_iter()
            .collect();

        let net = self
            .ensure_network(ctx, &creds, NetworkSpec::tenant_network(format!("{}-net", name), &tenant.id))
            .await?;
        let subnet = self
            .ensure_subnet(
                ctx,
                &creds,
                SubnetSpec {
                    name: format!("{}-subnet", name),
                    network_id: net.id.clone(),
                    tenant_id: Some(tenant.id.clone()),
                    ip_version: 4,
                    cidr: self.private_cidr.clone(),
                    enable_dhcp: true,
                    dns_nameservers,
                    gateway_ip: None,
                },
            )
            .await?;

        let float_net = self
            .ensure_network(
                ctx,
                &creds,
                NetworkSpec::external(format!("{}-float-net", name), EXTERNAL_PHYSICAL_NET),
            )
            .await?;
        self.ensure_subnet(
            ctx,
            &creds,
            SubnetSpec {
                name: format!("{}-float-subnet", name),
                network_id: float_net.id.clone(),
                tenant_id: None,
                ip_version: 4,
                cidr: self.float_cidr.clone(),
                enable_dhcp: false,
                dns_nameservers: Vec::new(),
                gateway_ip: Some(self.float_gateway.clone()),
            },
        )
        .await?;

        let router = self
            .ensure_router(
                ctx,
                &creds,
                RouterSpec {
                    name: format!("{}-router", name),
                    tenant_id: Some(tenant.id.clone()),
                },
            )
            .await?;
        match cloud.add_router_interface(&creds, &router.id, &subnet.id).await {
            Ok(()) | Err(ProviderError::Conflict(_)) => {}
            Err(e) => return Err(e.into()),
        }
        cloud.set_router_gateway(&creds, &router.id, &float_net.id).await?;

        Ok(Outcome::new("Overcloud configuration completed")
            .with_detail(format!("tenant {} ({})", tenant.name, tenant.id))
            .with_detail(format!("networks {}-net, {}-float-net", name, name))
            .with_detail(format!("router {}-router", name)))
    }
}

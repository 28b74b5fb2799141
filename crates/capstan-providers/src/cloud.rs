//! Cloud control-plane adapter.
//!
//! Talks to an OpenStack-style control plane: identity (tenants, users,
//! roles), networking (networks, subnets, routers) and compute (servers).
//! The adapter is a pure I/O boundary; create-if-absent semantics belong to
//! the action layer, so both `list_*` and `create_*` are exposed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ProviderError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection details for one control plane. Constructed per action
/// execution from deployment fields and discarded after.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudCredentials {
    /// Identity endpoint, e.g. `http://192.0.2.20:5000`.
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub tenant: String,
}

impl CloudCredentials {
    /// Admin credentials in the form the installer uses everywhere: the
    /// `admin` user in the `admin` tenant on port 5000.
    pub fn admin(address: &str, password: impl Into<String>) -> Self {
        Self {
            endpoint: format!("http://{}:5000", address),
            username: "admin".to_string(),
            password: password.into(),
            tenant: "admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Network {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "router:external")]
    pub router_external: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NetworkSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(rename = "router:external")]
    pub router_external: bool,
    #[serde(skip_serializing_if = "Option::is_none", rename = "provider:network_type")]
    pub provider_network_type: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        rename = "provider:physical_network"
    )]
    pub provider_physical_network: Option<String>,
}

impl NetworkSpec {
    pub fn tenant_network(name: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tenant_id: Some(tenant_id.into()),
            router_external: false,
            provider_network_type: None,
            provider_physical_network: None,
        }
    }

    /// A flat external network on the named physical network.
    pub fn external(name: impl Into<String>, physical_network: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tenant_id: None,
            router_external: true,
            provider_network_type: Some("flat".to_string()),
            provider_physical_network: Some(physical_network.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subnet {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub cidr: String,
    #[serde(default)]
    pub dns_nameservers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubnetSpec {
    pub name: String,
    pub network_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub ip_version: u8,
    pub cidr: String,
    pub enable_dhcp: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns_nameservers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Router {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouterSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerAddress {
    pub addr: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Server {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub addresses: HashMap<String, Vec<ServerAddress>>,
}

impl Server {
    /// First address on the named network, e.g. `ctlplane`.
    pub fn address_on(&self, network: &str) -> Option<&str> {
        self.addresses
            .get(network)
            .and_then(|addrs| addrs.first())
            .map(|a| a.addr.as_str())
    }
}

/// Trait for cloud control-plane operations.
///
/// Implementations handle protocol details; callers decide idempotency by
/// listing before creating.
#[async_trait]
pub trait CloudClient: Send + Sync {
    async fn list_tenants(&self, creds: &CloudCredentials) -> Result<Vec<Tenant>>;
    async fn create_tenant(&self, creds: &CloudCredentials, name: &str) -> Result<Tenant>;

    async fn list_users(&self, creds: &CloudCredentials) -> Result<Vec<User>>;
    async fn list_roles(&self, creds: &CloudCredentials) -> Result<Vec<Role>>;

    /// Grant `role_id` to `user_id` within `tenant_id`.
    async fn grant_tenant_role(
        &self,
        creds: &CloudCredentials,
        tenant_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<()>;

    async fn list_networks(&self, creds: &CloudCredentials) -> Result<Vec<Network>>;
    async fn create_network(&self, creds: &CloudCredentials, spec: &NetworkSpec) -> Result<Network>;

    async fn list_subnets(&self, creds: &CloudCredentials) -> Result<Vec<Subnet>>;
    async fn create_subnet(&self, creds: &CloudCredentials, spec: &SubnetSpec) -> Result<Subnet>;

    async fn list_routers(&self, creds: &CloudCredentials) -> Result<Vec<Router>>;
    async fn create_router(&self, creds: &CloudCredentials, spec: &RouterSpec) -> Result<Router>;
    async fn add_router_interface(
        &self,
        creds: &CloudCredentials,
        router_id: &str,
        subnet_id: &str,
    ) -> Result<()>;
    async fn set_router_gateway(
        &self,
        creds: &CloudCredentials,
        router_id: &str,
        network_id: &str,
    ) -> Result<()>;

    async fn list_servers(&self, creds: &CloudCredentials) -> Result<Vec<Server>>;
}

/// HTTP implementation against keystone v2 / neutron v2 / nova v2.1.
///
/// Sibling service endpoints are derived from the identity address by port
/// convention (identity 5000, network 9696, compute 8774), the same layout
/// the installer's control planes expose.
pub struct HttpCloudClient {
    http: reqwest::Client,
    tokens: Mutex<HashMap<String, String>>,
}

impl HttpCloudClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Connection(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            http,
            tokens: Mutex::new(HashMap::new()),
        })
    }

    fn identity_url(&self, creds: &CloudCredentials, path: &str) -> String {
        format!("{}/v2.0{}", creds.endpoint.trim_end_matches('/'), path)
    }

    fn service_url(&self, creds: &CloudCredentials, port: u16, path: &str) -> Result<String> {
        let mut url = reqwest::Url::parse(&creds.endpoint)
            .map_err(|e| ProviderError::Rejected(format!("invalid endpoint {}: {}", creds.endpoint, e)))?;
        url.set_port(Some(port))
            .map_err(|_| ProviderError::Rejected(format!("cannot derive port for {}", creds.endpoint)))?;
        Ok(format!("{}{}", url.as_str().trim_end_matches('/'), path))
    }

    fn network_url(&self, creds: &CloudCredentials, path: &str) -> Result<String> {
        self.service_url(creds, 9696, &format!("/v2.0{}", path))
    }

    fn compute_url(&self, creds: &CloudCredentials, path: &str) -> Result<String> {
        self.service_url(creds, 8774, &format!("/v2.1{}", path))
    }

    /// Authenticate against the identity service and cache the token per
    /// endpoint/user pair.
    async fn token(&self, creds: &CloudCredentials) -> Result<String> {
        let cache_key = format!("{}|{}", creds.endpoint, creds.username);
        if let Some(token) = self.tokens.lock().unwrap_or_else(|e| e.into_inner()).get(&cache_key) {
            return Ok(token.clone());
        }

        let url = self.identity_url(creds, "/tokens");
        let body = serde_json::json!({
            "auth": {
                "passwordCredentials": {
                    "username": creds.username,
                    "password": creds.password,
                },
                "tenantName": creds.tenant,
            }
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_request(e, format!("POST {}", url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, format!("POST {}", url)));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access: Access,
        }
        #[derive(Deserialize)]
        struct Access {
            token: TokenBody,
        }
        #[derive(Deserialize)]
        struct TokenBody {
            id: String,
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse(format!("token response: {}", e)))?;

        tracing::debug!(endpoint = %creds.endpoint, "authenticated against identity service");
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(cache_key, parsed.access.token.id.clone());
        Ok(parsed.access.token.id)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        creds: &CloudCredentials,
        url: &str,
    ) -> Result<T> {
        let token = self.token(creds).await?;
        let response = self
            .http
            .get(url)
            .header("X-Auth-Token", token)
            .send()
            .await
            .map_err(|e| ProviderError::from_request(e, format!("GET {}", url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, format!("GET {}", url)));
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse(format!("GET {}: {}", url, e)))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        creds: &CloudCredentials,
        method: reqwest::Method,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let token = self.token(creds).await?;
        let label = format!("{} {}", method, url);
        let response = self
            .http
            .request(method, url)
            .header("X-Auth-Token", token)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_request(e, label.clone()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, label));
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse(format!("{}: {}", label, e)))
    }

    async fn send_no_body(
        &self,
        creds: &CloudCredentials,
        method: reqwest::Method,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<()> {
        let token = self.token(creds).await?;
        let label = format!("{} {}", method, url);
        let response = self
            .http
            .request(method, url)
            .header("X-Auth-Token", token)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_request(e, label.clone()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, label));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudClient for HttpCloudClient {
    async fn list_tenants(&self, creds: &CloudCredentials) -> Result<Vec<Tenant>> {
        #[derive(Deserialize)]
        struct Response {
            tenants: Vec<Tenant>,
        }
        let url = self.identity_url(creds, "/tenants");
        let response: Response = self.get_json(creds, &url).await?;
        Ok(response.tenants)
    }

    async fn create_tenant(&self, creds: &CloudCredentials, name: &str) -> Result<Tenant> {
        #[derive(Deserialize)]
        struct Response {
            tenant: Tenant,
        }
        let url = self.identity_url(creds, "/tenants");
        let body = serde_json::json!({"tenant": {"name": name, "enabled": true}});
        let response: Response = self
            .send_json(creds, reqwest::Method::POST, &url, &body)
            .await?;
        Ok(response.tenant)
    }

    async fn list_users(&self, creds: &CloudCredentials) -> Result<Vec<User>> {
        #[derive(Deserialize)]
        struct Response {
            users: Vec<User>,
        }
        let url = self.identity_url(creds, "/users");
        let response: Response = self.get_json(creds, &url).await?;
        Ok(response.users)
    }

    async fn list_roles(&self, creds: &CloudCredentials) -> Result<Vec<Role>> {
        #[derive(Deserialize)]
        struct Response {
            roles: Vec<Role>,
        }
        let url = self.identity_url(creds, "/OS-KSADM/roles");
        let response: Response = self.get_json(creds, &url).await?;
        Ok(response.roles)
    }

    async fn grant_tenant_role(
        &self,
        creds: &CloudCredentials,
        tenant_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<()> {
        let url = self.identity_url(
            creds,
            &format!("/tenants/{}/users/{}/roles/OS-KSADM/{}", tenant_id, user_id, role_id),
        );
        self.send_no_body(creds, reqwest::Method::PUT, &url, &serde_json::json!({}))
            .await
    }

    async fn list_networks(&self, creds: &CloudCredentials) -> Result<Vec<Network>> {
        #[derive(Deserialize)]
        struct Response {
            networks: Vec<Network>,
        }
        let url = self.network_url(creds, "/networks")?;
        let response: Response = self.get_json(creds, &url).await?;
        Ok(response.networks)
    }

    async fn create_network(&self, creds: &CloudCredentials, spec: &NetworkSpec) -> Result<Network> {
        #[derive(Deserialize)]
        struct Response {
            network: Network,
        }
        let url = self.network_url(creds, "/networks")?;
        let body = serde_json::json!({"network": spec});
        let response: Response = self
            .send_json(creds, reqwest::Method::POST, &url, &body)
            .await?;
        Ok(response.network)
    }

    async fn list_subnets(&self, creds: &CloudCredentials) -> Result<Vec<Subnet>> {
        #[derive(Deserialize)]
        struct Response {
            subnets: Vec<Subnet>,
        }
        let url = self.network_url(creds, "/subnets")?;
        let response: Response = self.get_json(creds, &url).await?;
        Ok(response.subnets)
    }

    async fn create_subnet(&self, creds: &CloudCredentials, spec: &SubnetSpec) -> Result<Subnet> {
        #[derive(Deserialize)]
        struct Response {
            subnet: Subnet,
        }
        let url = self.network_url(creds, "/subnets")?;
        let body = serde_json::json!({"subnet": spec});
        let response: Response = self
            .send_json(creds, reqwest::Method::POST, &url, &body)
            .await?;
        Ok(response.subnet)
    }

    async fn list_routers(&self, creds: &CloudCredentials) -> Result<Vec<Router>> {
        #[derive(Deserialize)]
        struct Response {
            routers: Vec<Router>,
        }
        let url = self.network_url(creds, "/routers")?;
        let response: Response = self.get_json(creds, &url).await?;
        Ok(response.routers)
    }

    async fn create_router(&self, creds: &CloudCredentials, spec: &RouterSpec) -> Result<Router> {
        #[derive(Deserialize)]
        struct Response {
            router: Router,
        }
        let url = self.network_url(creds, "/routers")?;
        let body = serde_json::json!({"router": spec});
        let response: Response = self
            .send_json(creds, reqwest::Method::POST, &url, &body)
            .await?;
        Ok(response.router)
    }

    async fn add_router_interface(
        &self,
        creds: &CloudCredentials,
        router_id: &str,
        subnet_id: &str,
    ) -> Result<()> {
        let url = self.network_url(creds, &format!("/routers/{}/add_router_interface", router_id))?;
        let body = serde_json::json!({"subnet_id": subnet_id});
        self.send_no_body(creds, reqwest::Method::PUT, &url, &body).await
    }

    async fn set_router_gateway(
        &self,
        creds: &CloudCredentials,
        router_id: &str,
        network_id: &str,
    ) -> Result<()> {
        let url = self.network_url(creds, &format!("/routers/{}", router_id))?;
        let body = serde_json::json!({
            "router": {"external_gateway_info": {"network_id": network_id}}
        });
        self.send_no_body(creds, reqwest::Method::PUT, &url, &body).await
    }

    async fn list_servers(&self, creds: &CloudCredentials) -> Result<Vec<Server>> {
        #[derive(Deserialize)]
        struct Response {
            servers: Vec<Server>,
        }
        let url = self.compute_url(creds, "/servers/detail")?;
        let response: Response = self.get_json(creds, &url).await?;
        Ok(response.servers)
    }
}

impl std::fmt::Debug for HttpCloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCloudClient").finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct MockCloudState {
    tenants: Vec<Tenant>,
    users: Vec<User>,
    roles: Vec<Role>,
    grants: Vec<(String, String, String)>,
    networks: Vec<Network>,
    subnets: Vec<Subnet>,
    routers: Vec<Router>,
    router_interfaces: Vec<(String, String)>,
    router_gateways: Vec<(String, String)>,
    servers: Vec<Server>,
    create_calls: HashMap<String, u32>,
    next_id: u32,
}

/// In-memory control plane for tests. Comes with the stock `admin` user and
/// role so the keystone flow works out of the box.
#[derive(Debug)]
pub struct MockCloudClient {
    state: Mutex<MockCloudState>,
}

impl Default for MockCloudClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCloudClient {
    pub fn new() -> Self {
        let state = MockCloudState {
            users: vec![User {
                id: "user-admin".to_string(),
                name: "admin".to_string(),
            }],
            roles: vec![Role {
                id: "role-admin".to_string(),
                name: "admin".to_string(),
            }],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Preload a server visible to `list_servers`.
    pub fn with_server(self, name: &str, network: &str, addr: &str) -> Self {
        {
            let mut state = self.lock();
            let id = format!("server-{}", state.servers.len() + 1);
            let mut addresses = HashMap::new();
            addresses.insert(
                network.to_string(),
                vec![ServerAddress {
                    addr: addr.to_string(),
                }],
            );
            state.servers.push(Server {
                id,
                name: name.to_string(),
                addresses,
            });
        }
        self
    }

    /// Preload an existing subnet, as a control plane with prior tenants
    /// would have.
    pub fn with_subnet(self, name: &str, network_id: &str, cidr: &str, dns: &[&str]) -> Self {
        {
            let mut state = self.lock();
            let id = format!("subnet-{}", state.subnets.len() + 1);
            state.subnets.push(Subnet {
                id,
                name: name.to_string(),
                network_id: network_id.to_string(),
                cidr: cidr.to_string(),
                dns_nameservers: dns.iter().map(|s| s.to_string()).collect(),
            });
        }
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockCloudState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn note_create(state: &mut MockCloudState, kind: &str) {
        *state.create_calls.entry(kind.to_string()).or_insert(0) += 1;
    }

    /// How many times `create_<kind>` was invoked, for idempotency checks.
    pub fn create_calls(&self, kind: &str) -> u32 {
        self.lock().create_calls.get(kind).copied().unwrap_or(0)
    }

    pub fn tenant_names(&self) -> Vec<String> {
        self.lock().tenants.iter().map(|t| t.name.clone()).collect()
    }

    pub fn network_names(&self) -> Vec<String> {
        self.lock().networks.iter().map(|n| n.name.clone()).collect()
    }

    pub fn router_gateways(&self) -> Vec<(String, String)> {
        self.lock().router_gateways.clone()
    }

    pub fn grants(&self) -> Vec<(String, String, String)> {
        self.lock().grants.clone()
    }
}

#[async_trait]
impl CloudClient for MockCloudClient {
    async fn list_tenants(&self, _creds: &CloudCredentials) -> Result<Vec<Tenant>> {
        Ok(self.lock().tenants.clone())
    }

    async fn create_tenant(&self, _creds: &CloudCredentials, name: &str) -> Result<Tenant> {
        let mut state = self.lock();
        if state.tenants.iter().any(|t| t.name == name) {
            return Err(ProviderError::Conflict(format!("tenant {} exists", name)));
        }
        state.next_id += 1;
        let tenant = Tenant {
            id: format!("tenant-{}", state.next_id),
            name: name.to_string(),
        };
        state.tenants.push(tenant.clone());
        Self::note_create(&mut state, "tenant");
        Ok(tenant)
    }

    async fn list_users(&self, _creds: &CloudCredentials) -> Result<Vec<User>> {
        Ok(self.lock().users.clone())
    }

    async fn list_roles(&self, _creds: &CloudCredentials) -> Result<Vec<Role>> {
        Ok(self.lock().roles.clone())
    }

    async fn grant_tenant_role(
        &self,
        _creds: &CloudCredentials,
        tenant_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<()> {
        let grant = (
            tenant_id.to_string(),
            user_id.to_string(),
            role_id.to_string(),
        );
        let mut state = self.lock();
        if state.grants.contains(&grant) {
            return Err(ProviderError::Conflict("role already granted".to_string()));
        }
        state.grants.push(grant);
        Ok(())
    }

    async fn list_networks(&self, _creds: &CloudCredentials) -> Result<Vec<Network>> {
        Ok(self.lock().networks.clone())
    }

    async fn create_network(&self, _creds: &CloudCredentials, spec: &NetworkSpec) -> Result<Network> {
        let mut state = self.lock();
        if state.networks.iter().any(|n| n.name == spec.name) {
            return Err(ProviderError::Conflict(format!("network {} exists", spec.name)));
        }
        state.next_id += 1;
        let network = Network {
            id: format!("net-{}", state.next_id),
            name: spec.name.clone(),
            router_external: spec.router_external,
        };
        state.networks.push(network.clone());
        Self::note_create(&mut state, "network");
        Ok(network)
    }

    async fn list_subnets(&self, _creds: &CloudCredentials) -> Result<Vec<Subnet>> {
        Ok(self.lock().subnets.clone())
    }

    async fn create_subnet(&self, _creds: &CloudCredentials, spec: &SubnetSpec) -> Result<Subnet> {
        let mut state = self.lock();
        if state.subnets.iter().any(|s| s.name == spec.name) {
            return Err(ProviderError::Conflict(format!("subnet {} exists", spec.name)));
        }
        state.next_id += 1;
        let subnet = Subnet {
            id: format!("subnet-{}", state.next_id),
            name: spec.name.clone(),
            network_id: spec.network_id.clone(),
            cidr: spec.cidr.clone(),
            dns_nameservers: spec.dns_nameservers.clone(),
        };
        state.subnets.push(subnet.clone());
        Self::note_create(&mut state, "subnet");
        Ok(subnet)
    }

    async fn list_routers(&self, _creds: &CloudCredentials) -> Result<Vec<Router>> {
        Ok(self.lock().routers.clone())
    }

    async fn create_router(&self, _creds: &CloudCredentials, spec: &RouterSpec) -> Result<Router> {
        let mut state = self.lock();
        if state.routers.iter().any(|r| r.name == spec.name) {
            return Err(ProviderError::Conflict(format!("router {} exists", spec.name)));
        }
        state.next_id += 1;
        let router = Router {
            id: format!("router-{}", state.next_id),
            name: spec.name.clone(),
        };
        state.routers.push(router.clone());
        Self::note_create(&mut state, "router");
        Ok(router)
    }

    async fn add_router_interface(
        &self,
        _creds: &CloudCredentials,
        router_id: &str,
        subnet_id: &str,
    ) -> Result<()> {
        let pair = (router_id.to_string(), subnet_id.to_string());
        let mut state = self.lock();
        if state.router_interfaces.contains(&pair) {
            return Err(ProviderError::Conflict("interface already attached".to_string()));
        }
        state.router_interfaces.push(pair);
        Ok(())
    }

    async fn set_router_gateway(
        &self,
        _creds: &CloudCredentials,
        router_id: &str,
        network_id: &str,
    ) -> Result<()> {
        self.lock()
            .router_gateways
            .push((router_id.to_string(), network_id.to_string()));
        Ok(())
    }

    async fn list_servers(&self, _creds: &CloudCredentials) -> Result<Vec<Server>> {
        Ok(self.lock().servers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> CloudCredentials {
        CloudCredentials::admin("192.0.2.20", "secret")
    }

    #[test]
    fn test_admin_credentials_endpoint() {
        let creds = creds();
        assert_eq!(creds.endpoint, "http://192.0.2.20:5000");
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.tenant, "admin");
    }

    #[test]
    fn test_service_url_derivation() {
        let client = HttpCloudClient::new().unwrap();
        let creds = creds();

        assert_eq!(
            client.identity_url(&creds, "/tenants"),
            "http://192.0.2.20:5000/v2.0/tenants"
        );
        assert_eq!(
            client.network_url(&creds, "/networks").unwrap(),
            "http://192.0.2.20:9696/v2.0/networks"
        );
        assert_eq!(
            client.compute_url(&creds, "/servers/detail").unwrap(),
            "http://192.0.2.20:8774/v2.1/servers/detail"
        );
    }

    #[test]
    fn test_network_spec_serializes_provider_fields() {
        let spec = NetworkSpec::external("qci-float-net", "datacentre");
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["router:external"], true);
        assert_eq!(json["provider:network_type"], "flat");
        assert_eq!(json["provider:physical_network"], "datacentre");

        let spec = NetworkSpec::tenant_network("qci-net", "tenant-1");
        let json = serde_json::to_value(&spec).unwrap();
        assert!(json.get("provider:network_type").is_none());
    }

    #[test]
    fn test_server_address_lookup() {
        let json = serde_json::json!({
            "id": "abc",
            "name": "overcloud-controller-0",
            "addresses": {"ctlplane": [{"addr": "192.0.2.51", "version": 4}]}
        });
        let server: Server = serde_json::from_value(json).unwrap();
        assert_eq!(server.address_on("ctlplane"), Some("192.0.2.51"));
        assert_eq!(server.address_on("external"), None);
    }

    #[tokio::test]
    async fn test_mock_tenant_create_and_conflict() {
        let mock = MockCloudClient::new();
        let creds = creds();

        let tenant = mock.create_tenant(&creds, "qci").await.unwrap();
        assert_eq!(tenant.name, "qci");
        assert_eq!(mock.tenant_names(), vec!["qci".to_string()]);

        let err = mock.create_tenant(&creds, "qci").await.unwrap_err();
        assert!(matches!(err, ProviderError::Conflict(_)));
        assert_eq!(mock.create_calls("tenant"), 1);
    }

    #[tokio::test]
    async fn test_mock_has_admin_user_and_role() {
        let mock = MockCloudClient::new();
        let creds = creds();

        let users = mock.list_users(&creds).await.unwrap();
        assert!(users.iter().any(|u| u.name == "admin"));
        let roles = mock.list_roles(&creds).await.unwrap();
        assert!(roles.iter().any(|r| r.name == "admin"));
    }

    #[tokio::test]
    async fn test_mock_servers() {
        let mock = MockCloudClient::new().with_server("overcloud-controller-0", "ctlplane", "192.0.2.51");
        let servers = mock.list_servers(&creds()).await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].address_on("ctlplane"), Some("192.0.2.51"));
    }
}

//! Virtualization manager adapter.
//!
//! Talks to an oVirt/RHEV-style engine REST API: storage domains and
//! virtual machines. The engine terminates TLS with a self-signed
//! certificate out of the box, so verification is disabled here the same
//! way the console adapter does it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ProviderError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection details for one engine. Built per action execution.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtCredentials {
    /// API root, e.g. `https://rhev-engine.example.com/ovirt-engine/api`.
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

impl VirtCredentials {
    /// Engine admin as the installer configures it: `admin@internal` on the
    /// standard API path.
    pub fn engine_admin(host: &str, password: impl Into<String>) -> Self {
        Self {
            endpoint: format!("https://{}/ovirt-engine/api", host),
            username: "admin@internal".to_string(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageDomainKind {
    Data,
    Export,
}

impl std::fmt::Display for StorageDomainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageDomainKind::Data => write!(f, "data"),
            StorageDomainKind::Export => write!(f, "export"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageDomain {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StorageDomainKind,
}

/// Parameters for attaching a storage domain to a data center.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StorageDomainSpec {
    pub name: String,
    pub kind: StorageDomainKind,
    /// `nfs` or `glusterfs`.
    pub storage_type: String,
    pub address: String,
    pub path: String,
    pub data_center: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cpu_type: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClusterSpec {
    pub name: String,
    pub cpu_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vm {
    pub id: String,
    pub name: String,
    pub status: String,
}

impl Vm {
    pub fn is_up(&self) -> bool {
        self.status == "up"
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VmSpec {
    pub name: String,
    pub cluster: String,
    pub vcpu: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
}

/// Trait for virtualization manager operations.
#[async_trait]
pub trait VirtClient: Send + Sync {
    async fn list_clusters(&self, creds: &VirtCredentials) -> Result<Vec<Cluster>>;
    async fn create_cluster(&self, creds: &VirtCredentials, spec: &ClusterSpec) -> Result<Cluster>;

    async fn list_storage_domains(&self, creds: &VirtCredentials) -> Result<Vec<StorageDomain>>;
    async fn create_storage_domain(
        &self,
        creds: &VirtCredentials,
        spec: &StorageDomainSpec,
    ) -> Result<StorageDomain>;

    async fn list_vms(&self, creds: &VirtCredentials) -> Result<Vec<Vm>>;
    async fn create_vm(&self, creds: &VirtCredentials, spec: &VmSpec) -> Result<Vm>;
    async fn start_vm(&self, creds: &VirtCredentials, vm_id: &str) -> Result<()>;
}

/// HTTP implementation against the engine REST API with basic auth.
pub struct HttpVirtClient {
    http: reqwest::Client,
}

impl HttpVirtClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ProviderError::Connection(format!("failed to build http client: {}", e)))?;
        Ok(Self { http })
    }

    fn url(&self, creds: &VirtCredentials, path: &str) -> String {
        format!("{}{}", creds.endpoint.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        creds: &VirtCredentials,
        path: &str,
    ) -> Result<T> {
        let url = self.url(creds, path);
        let response = self
            .http
            .get(&url)
            .basic_auth(&creds.username, Some(&creds.password))
            .header("Accept", "application/json")
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

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        creds: &VirtCredentials,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = self.url(creds, path);
        let response = self
            .http
            .post(&url)
            .basic_auth(&creds.username, Some(&creds.password))
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_request(e, format!("POST {}", url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, format!("POST {}", url)));
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse(format!("POST {}: {}", url, e)))
    }

    async fn post_no_body(
        &self,
        creds: &VirtCredentials,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<()> {
        let url = self.url(creds, path);
        let response = self
            .http
            .post(&url)
            .basic_auth(&creds.username, Some(&creds.password))
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_request(e, format!("POST {}", url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, format!("POST {}", url)));
        }
        Ok(())
    }
}

#[async_trait]
impl VirtClient for HttpVirtClient {
    async fn list_clusters(&self, creds: &VirtCredentials) -> Result<Vec<Cluster>> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            cluster: Vec<Cluster>,
        }
        let response: Response = self.get_json(creds, "/clusters").await?;
        Ok(response.cluster)
    }

    async fn create_cluster(&self, creds: &VirtCredentials, spec: &ClusterSpec) -> Result<Cluster> {
        let body = serde_json::json!({
            "name": spec.name,
            "cpu": {"id": spec.cpu_type},
            "data_center": {"name": "Default"},
        });
        self.post_json(creds, "/clusters", &body).await
    }

    async fn list_storage_domains(&self, creds: &VirtCredentials) -> Result<Vec<StorageDomain>> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            storage_domain: Vec<StorageDomain>,
        }
        let response: Response = self.get_json(creds, "/storagedomains").await?;
        Ok(response.storage_domain)
    }

    async fn create_storage_domain(
        &self,
        creds: &VirtCredentials,
        spec: &StorageDomainSpec,
    ) -> Result<StorageDomain> {
        let body = serde_json::json!({
            "name": spec.name,
            "type": spec.kind.to_string(),
            "storage": {
                "type": spec.storage_type,
                "address": spec.address,
                "path": spec.path,
            },
            "data_center": {"name": spec.data_center},
        });
        self.post_json(creds, "/storagedomains", &body).await
    }

    async fn list_vms(&self, creds: &VirtCredentials) -> Result<Vec<Vm>> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            vm: Vec<Vm>,
        }
        let response: Response = self.get_json(creds, "/vms").await?;
        Ok(response.vm)
    }

    async fn create_vm(&self, creds: &VirtCredentials, spec: &VmSpec) -> Result<Vm> {
        let body = serde_json::json!({
            "name": spec.name,
            "cluster": {"name": spec.cluster},
            "cpu": {"topology": {"cores": spec.vcpu, "sockets": 1}},
            "memory": spec.memory_mb * 1024 * 1024,
            "disks": [{"provisioned_size": spec.disk_gb * 1024 * 1024 * 1024, "format": "cow"}],
        });
        self.post_json(creds, "/vms", &body).await
    }

    async fn start_vm(&self, creds: &VirtCredentials, vm_id: &str) -> Result<()> {
        let path = format!("/vms/{}/start", vm_id);
        self.post_no_body(creds, &path, &serde_json::json!({})).await
    }
}

impl std::fmt::Debug for HttpVirtClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVirtClient").finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct MockVirtState {
    clusters: Vec<Cluster>,
    storage_domains: Vec<StorageDomain>,
    vms: Vec<Vm>,
    started: Vec<String>,
    create_calls: u32,
    next_id: u32,
}

/// In-memory engine for tests.
#[derive(Debug, Default)]
pub struct MockVirtClient {
    state: Mutex<MockVirtState>,
}

impl MockVirtClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload an existing cluster.
    pub fn with_cluster(self, name: &str, cpu_type: &str) -> Self {
        {
            let mut state = self.lock();
            let id = format!("cluster-{}", state.clusters.len() + 1);
            state.clusters.push(Cluster {
                id,
                name: name.to_string(),
                cpu_type: cpu_type.to_string(),
            });
        }
        self
    }

    /// Preload an attached storage domain.
    pub fn with_storage_domain(self, name: &str, kind: StorageDomainKind) -> Self {
        {
            let mut state = self.lock();
            let id = format!("sd-{}", state.storage_domains.len() + 1);
            state.storage_domains.push(StorageDomain {
                id,
                name: name.to_string(),
                kind,
            });
        }
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockVirtState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cluster_names(&self) -> Vec<String> {
        self.lock().clusters.iter().map(|c| c.name.clone()).collect()
    }

    pub fn storage_domain_names(&self) -> Vec<String> {
        self.lock()
            .storage_domains
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    pub fn vm_names(&self) -> Vec<String> {
        self.lock().vms.iter().map(|v| v.name.clone()).collect()
    }

    pub fn started_vms(&self) -> Vec<String> {
        self.lock().started.clone()
    }

    pub fn create_calls(&self) -> u32 {
        self.lock().create_calls
    }
}

#[async_trait]
impl VirtClient for MockVirtClient {
    async fn list_clusters(&self, _creds: &VirtCredentials) -> Result<Vec<Cluster>> {
        Ok(self.lock().clusters.clone())
    }

    async fn create_cluster(&self, _creds: &VirtCredentials, spec: &ClusterSpec) -> Result<Cluster> {
        let mut state = self.lock();
        if state.clusters.iter().any(|c| c.name == spec.name) {
            return Err(ProviderError::Conflict(format!("cluster {} exists", spec.name)));
        }
        state.next_id += 1;
        state.create_calls += 1;
        let cluster = Cluster {
            id: format!("cluster-{}", state.next_id),
            name: spec.name.clone(),
            cpu_type: spec.cpu_type.clone(),
        };
        state.clusters.push(cluster.clone());
        Ok(cluster)
    }

    async fn list_storage_domains(&self, _creds: &VirtCredentials) -> Result<Vec<StorageDomain>> {
        Ok(self.lock().storage_domains.clone())
    }

    async fn create_storage_domain(
        &self,
        _creds: &VirtCredentials,
        spec: &StorageDomainSpec,
    ) -> Result<StorageDomain> {
        let mut state = self.lock();
        if state.storage_domains.iter().any(|d| d.name == spec.name) {
            return Err(ProviderError::Conflict(format!(
                "storage domain {} exists",
                spec.name
            )));
        }
        state.next_id += 1;
        state.create_calls += 1;
        let domain = StorageDomain {
            id: format!("sd-{}", state.next_id),
            name: spec.name.clone(),
            kind: spec.kind,
        };
        state.storage_domains.push(domain.clone());
        Ok(domain)
    }

    async fn list_vms(&self, _creds: &VirtCredentials) -> Result<Vec<Vm>> {
        Ok(self.lock().vms.clone())
    }

    async fn create_vm(&self, _creds: &VirtCredentials, spec: &VmSpec) -> Result<Vm> {
        let mut state = self.lock();
        if state.vms.iter().any(|v| v.name == spec.name) {
            return Err(ProviderError::Conflict(format!("vm {} exists", spec.name)));
        }
        state.next_id += 1;
        state.create_calls += 1;
        let vm = Vm {
            id: format!("vm-{}", state.next_id),
            name: spec.name.clone(),
            status: "down".to_string(),
        };
        state.vms.push(vm.clone());
        Ok(vm)
    }

    async fn start_vm(&self, _creds: &VirtCredentials, vm_id: &str) -> Result<()> {
        let mut state = self.lock();
        match state.vms.iter_mut().find(|v| v.id == vm_id) {
            Some(vm) => {
                vm.status = "up".to_string();
                state.started.push(vm_id.to_string());
                Ok(())
            }
            None => Err(ProviderError::Rejected(format!("no vm with id {}", vm_id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> VirtCredentials {
        VirtCredentials::engine_admin("rhev-engine.example.com", "secret")
    }

    #[test]
    fn test_engine_admin_endpoint() {
        let creds = creds();
        assert_eq!(
            creds.endpoint,
            "https://rhev-engine.example.com/ovirt-engine/api"
        );
        assert_eq!(creds.username, "admin@internal");
    }

    #[test]
    fn test_storage_domain_kind_serde() {
        let domain: StorageDomain = serde_json::from_value(serde_json::json!({
            "id": "sd-1",
            "name": "my_storage",
            "type": "export"
        }))
        .unwrap();
        assert_eq!(domain.kind, StorageDomainKind::Export);
        assert_eq!(domain.kind.to_string(), "export");
    }

    #[tokio::test]
    async fn test_mock_storage_domain_conflict() {
        let mock = MockVirtClient::new().with_storage_domain("my_storage", StorageDomainKind::Data);
        let spec = StorageDomainSpec {
            name: "my_storage".to_string(),
            kind: StorageDomainKind::Data,
            storage_type: "nfs".to_string(),
            address: "192.0.2.40".to_string(),
            path: "/exports/data".to_string(),
            data_center: "Default".to_string(),
        };
        let err = mock.create_storage_domain(&creds(), &spec).await.unwrap_err();
        assert!(matches!(err, ProviderError::Conflict(_)));
        assert_eq!(mock.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_mock_vm_lifecycle() {
        let mock = MockVirtClient::new();
        let spec = VmSpec {
            name: "ose-master-1".to_string(),
            cluster: "Default".to_string(),
            vcpu: 2,
            memory_mb: 8192,
            disk_gb: 30,
        };
        let vm = mock.create_vm(&creds(), &spec).await.unwrap();
        assert_eq!(vm.status, "down");

        mock.start_vm(&creds(), &vm.id).await.unwrap();
        let vms = mock.list_vms(&creds()).await.unwrap();
        assert!(vms[0].is_up());
        assert_eq!(mock.started_vms(), vec![vm.id]);
    }

    #[tokio::test]
    async fn test_mock_start_unknown_vm() {
        let mock = MockVirtClient::new();
        let err = mock.start_vm(&creds(), "vm-404").await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));
    }
}

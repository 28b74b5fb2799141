//! Capstan Provider Adapters
//!
//! This crate provides the clients capstan uses to talk to the
//! infrastructure it orchestrates. Each adapter is a trait plus an HTTP (or
//! process) implementation and an in-memory mock, so the action and
//! orchestration layers can be exercised without live infrastructure.
//!
//! # Adapters
//!
//! - **Cloud**: an OpenStack-style control plane (identity, networking,
//!   compute)
//! - **Virt**: an oVirt/RHEV-style virtualization engine
//! - **Ssh**: command execution on remote hosts through the system `ssh`
//! - **Console**: a CloudForms appliance web console
//!
//! # Example
//!
//! ```
//! use capstan_providers::{CloudClient, CloudCredentials, MockCloudClient};
//!
//! # async fn example() -> capstan_providers::error::Result<()> {
//! let client = MockCloudClient::new();
//! let creds = CloudCredentials::admin("192.0.2.20", "password");
//!
//! let tenant = client.create_tenant(&creds, "my-deployment").await?;
//! assert_eq!(tenant.name, "my-deployment");
//! # Ok(())
//! # }
//! ```

pub mod cloud;
pub mod console;
pub mod error;
pub mod ssh;
pub mod virt;

pub use cloud::{
    CloudClient, CloudCredentials, HttpCloudClient, MockCloudClient, Network, NetworkSpec, Role,
    Router, RouterSpec, Server, ServerAddress, Subnet, SubnetSpec, Tenant, User,
};
pub use console::{
    CloudProviderForm, ConsoleClient, ConsoleCredentials, HttpConsoleClient, MockConsoleClient,
};
pub use error::{ProviderError, Result};
pub use ssh::{
    MockSshClient, ProcessSshClient, SshAuth, SshClient, SshCommandResult, SshTarget,
};
pub use virt::{
    Cluster, ClusterSpec, HttpVirtClient, MockVirtClient, StorageDomain, StorageDomainKind,
    StorageDomainSpec, Vm, VirtClient, VirtCredentials, VmSpec,
};

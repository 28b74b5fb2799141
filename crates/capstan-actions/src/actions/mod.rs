//! The concrete provisioning actions, one module per action kind.

mod attach_rhev_storage;
mod configure_overcloud;
mod controller_cleanup;
mod launch_openshift_nodes;
mod register_cloud_provider;
mod setup_rhev_engine;

pub use attach_rhev_storage::AttachRhevStorage;
pub use configure_overcloud::ConfigureOvercloud;
pub use controller_cleanup::ControllerCleanup;
pub use launch_openshift_nodes::LaunchOpenshiftNodes;
pub use register_cloud_provider::RegisterCloudProvider;
pub use setup_rhev_engine::SetupRhevEngine;

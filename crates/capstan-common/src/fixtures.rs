//! Fully-configured deployment fixtures for tests across the workspace.

use crate::models::Deployment;

/// A deployment with every platform block filled in with plausible values and
/// all deploy toggles off. Tests flip on the toggles they need.
pub fn configured_deployment() -> Deployment {
    let mut deployment = Deployment::new("qci");

    deployment.openstack.undercloud_address = "192.0.2.10".to_string();
    deployment.openstack.undercloud_user = "stack".to_string();
    deployment.openstack.undercloud_user_password = "undercloud-user-pw".to_string();
    deployment.openstack.undercloud_password = "undercloud-admin-pw".to_string();
    deployment.openstack.overcloud_address = "192.0.2.20".to_string();
    deployment.openstack.overcloud_password = "overcloud-admin-pw".to_string();
    deployment.openstack.overcloud_private_net = "10.0.0.0/24".to_string();
    deployment.openstack.overcloud_float_net = "192.168.253.0/24".to_string();
    deployment.openstack.overcloud_float_gateway = "192.168.253.254".to_string();
    deployment.openstack.overcloud_libvirt_type = "kvm".to_string();
    deployment.openstack.controller_flavor = "control".to_string();
    deployment.openstack.controller_count = 1;
    deployment.openstack.compute_flavor = "compute".to_string();
    deployment.openstack.compute_count = 1;

    deployment.cfme.install_loc = "openstack".to_string();
    deployment.cfme.address = "192.0.2.30".to_string();
    deployment.cfme.hostname = "cfme.example.com".to_string();
    deployment.cfme.root_password = "cfme-root-pw".to_string();
    deployment.cfme.admin_password = "cfme-admin-pw".to_string();

    deployment.rhev.engine_host = "rhev-engine.example.com".to_string();
    deployment.rhev.engine_admin_password = "rhev-admin-pw".to_string();
    deployment.rhev.root_password = "rhev-root-pw".to_string();
    deployment.rhev.database_name = "engine".to_string();
    deployment.rhev.cluster_name = "Default".to_string();
    deployment.rhev.cpu_type = "Intel Haswell Family".to_string();
    deployment.rhev.storage_name = "data".to_string();
    deployment.rhev.storage_type = "nfs".to_string();
    deployment.rhev.storage_address = "nfs.example.com".to_string();
    deployment.rhev.share_path = "/exports/data".to_string();

    deployment.openshift.install_loc = "rhev".to_string();
    deployment.openshift.number_master_nodes = 1;
    deployment.openshift.number_worker_nodes = 1;
    deployment.openshift.storage_size = 30;
    deployment.openshift.master_vcpu = 2;
    deployment.openshift.master_ram = 8192;
    deployment.openshift.master_disk = 30;
    deployment.openshift.node_vcpu = 1;
    deployment.openshift.node_ram = 8192;
    deployment.openshift.node_disk = 15;
    deployment.openshift.username = "admin".to_string();
    deployment.openshift.user_password = "ose-admin-pw".to_string();
    deployment.openshift.subdomain_name = "apps".to_string();
    deployment.openshift.storage_name = "ose-storage".to_string();
    deployment.openshift.storage_type = "nfs".to_string();

    deployment
}

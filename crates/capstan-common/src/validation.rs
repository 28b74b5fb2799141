//! Deployment validation.
//!
//! Validation collects the full set of field errors rather than stopping at
//! the first, so the client can render everything at once. Warnings are
//! advisory and never block a deploy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::Deployment;

/// Field-level validation errors, keyed by field path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of messages across all fields.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// "field message" strings for every error, e.g. `name can't be blank`.
    pub fn full_messages(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |m| format!("{} {}", field, m))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Fold another set of errors into this one, skipping messages a field
    /// already carries.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.0 {
            let entry = self.0.entry(field).or_default();
            for message in messages {
                if !entry.contains(&message) {
                    entry.push(message);
                }
            }
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_messages().join("; "))
    }
}

/// Result of validating a deployment: blocking errors plus advisory warnings.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub errors: ValidationErrors,
    pub warnings: Vec<String>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn require(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "can't be blank");
    }
}

fn warn_short_password(warnings: &mut Vec<String>, field: &str, value: &str) {
    if !value.is_empty() && value.len() < 8 {
        warnings.push(format!("{} is shorter than 8 characters", field));
    }
}

/// Validate just the deployment name. Create applies this before any
/// platform configuration exists.
pub fn validate_name(name: &str) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    if name.trim().is_empty() {
        errors.add("name", "can't be blank");
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '_')
    {
        errors.add(
            "name",
            "must contain only letters, numbers, spaces, dashes and underscores",
        );
    }
    errors
}

/// Validate a deployment against the rules for its selected platforms.
pub fn validate_deployment(deployment: &Deployment) -> Validation {
    let mut errors = ValidationErrors::new();
    let mut warnings = Vec::new();

    errors.merge(validate_name(&deployment.name));

    if !deployment.has_platform_selected() {
        errors.add("deployment", "has no platforms selected");
    }

    if deployment.deploy_openstack {
        let os = &deployment.openstack;
        require(&mut errors, "openstack.undercloud_address", &os.undercloud_address);
        require(&mut errors, "openstack.undercloud_user", &os.undercloud_user);
        require(
            &mut errors,
            "openstack.undercloud_user_password",
            &os.undercloud_user_password,
        );
        require(&mut errors, "openstack.undercloud_password", &os.undercloud_password);
        require(&mut errors, "openstack.overcloud_address", &os.overcloud_address);
        require(&mut errors, "openstack.overcloud_password", &os.overcloud_password);
        require(&mut errors, "openstack.overcloud_private_net", &os.overcloud_private_net);
        require(&mut errors, "openstack.overcloud_float_net", &os.overcloud_float_net);
        require(
            &mut errors,
            "openstack.overcloud_float_gateway",
            &os.overcloud_float_gateway,
        );
        if os.controller_count == 0 {
            errors.add("openstack.controller_count", "must be at least 1");
        }
        if os.compute_count == 0 {
            errors.add("openstack.compute_count", "must be at least 1");
        }
        warn_short_password(&mut warnings, "openstack.overcloud_password", &os.overcloud_password);
    }

    if deployment.deploy_cfme {
        let cfme = &deployment.cfme;
        match cfme.install_loc.as_str() {
            "rhev" => {
                if !deployment.deploy_rhev {
                    errors.add("cfme.install_loc", "requires rhev to be deployed");
                }
            }
            "openstack" => {
                if !deployment.deploy_openstack {
                    errors.add("cfme.install_loc", "requires openstack to be deployed");
                }
            }
            _ => errors.add("cfme.install_loc", "must be rhev or openstack"),
        }
        require(&mut errors, "cfme.address", &cfme.address);
        require(&mut errors, "cfme.root_password", &cfme.root_password);
        require(&mut errors, "cfme.admin_password", &cfme.admin_password);
        warn_short_password(&mut warnings, "cfme.admin_password", &cfme.admin_password);
        warn_short_password(&mut warnings, "cfme.root_password", &cfme.root_password);
        if !deployment.deploy_openstack {
            warnings.push(
                "CloudForms is selected without OpenStack; no cloud provider will be registered"
                    .to_string(),
            );
        }
    }

    if deployment.deploy_rhev {
        let rhev = &deployment.rhev;
        require(&mut errors, "rhev.engine_host", &rhev.engine_host);
        require(&mut errors, "rhev.engine_admin_password", &rhev.engine_admin_password);
        require(&mut errors, "rhev.root_password", &rhev.root_password);
        require(&mut errors, "rhev.cluster_name", &rhev.cluster_name);
        require(&mut errors, "rhev.storage_name", &rhev.storage_name);
        require(&mut errors, "rhev.storage_address", &rhev.storage_address);
        require(&mut errors, "rhev.share_path", &rhev.share_path);
        if !matches!(rhev.storage_type.as_str(), "nfs" | "glusterfs") {
            errors.add("rhev.storage_type", "must be nfs or glusterfs");
        }
        let export_fields = [
            &rhev.export_domain_name,
            &rhev.export_domain_address,
            &rhev.export_domain_path,
        ];
        let export_set = export_fields.iter().filter(|f| !f.trim().is_empty()).count();
        if export_set > 0 && export_set < export_fields.len() {
            errors.add(
                "rhev.export_domain_name",
                "export domain name, address and path must be set together",
            );
        }
        warn_short_password(&mut warnings, "rhev.engine_admin_password", &rhev.engine_admin_password);
        warn_short_password(&mut warnings, "rhev.root_password", &rhev.root_password);
    }

    if deployment.deploy_openshift {
        let ose = &deployment.openshift;
        if !deployment.deploy_rhev {
            errors.add("openshift", "requires rhev to be deployed");
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
        require(&mut errors, "openshift.username", &ose.username);
        require(&mut errors, "openshift.user_password", &ose.user_password);
        require(&mut errors, "openshift.subdomain_name", &ose.subdomain_name);
        warn_short_password(&mut warnings, "openshift.user_password", &ose.user_password);
    }

    Validation { errors, warnings }
}

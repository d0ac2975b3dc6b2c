use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::meta::{is_quantity, require_name, Resource, ValidationError, API_VERSION};

pub const DEFAULT_MONEROD_IMAGE: &str = "index.docker.io/utxobr/monerod@sha256:19ba5793c00375e7115469de9c14fcad928df5867c76ab5de099e83f646e175d";
pub const DEFAULT_DISK_SIZE: &str = "50Gi";
pub const DEFAULT_REPLICAS: u32 = 1;

/// Suffix of the secret holding a node set's hidden-service identity.
pub const TOR_SECRET_SUFFIX: &str = "-tor";

fn default_api_version() -> String {
    API_VERSION.to_owned()
}

fn default_kind() -> String {
    MoneroNodeSet::KIND.to_owned()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoneroNodeSet {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: MoneroNodeSetSpec,
    #[serde(default, skip_serializing_if = "MoneroNodeSetStatus::is_empty")]
    pub status: MoneroNodeSetStatus,
}

impl MoneroNodeSet {
    pub fn new(name: &str, namespace: &str, spec: MoneroNodeSetSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some(namespace.to_owned()),
                ..ObjectMeta::default()
            },
            spec,
            status: MoneroNodeSetStatus::default(),
        }
    }

    /// Name of the secret that carries this node set's tor identity.
    pub fn tor_secret_name(&self) -> String {
        match self.spec.anonymized.secret_ref.as_deref() {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => format!("{}{}", self.name(), TOR_SECRET_SUFFIX),
        }
    }
}

impl Resource for MoneroNodeSet {
    const KIND: &'static str = "MoneroNodeSet";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn apply_defaults(&mut self) {
        self.spec.apply_defaults();
        if self.spec.anonymized.enabled {
            let secret = self.tor_secret_name();
            self.spec.anonymized.secret_ref = Some(secret);
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_name(Self::KIND, &self.metadata)?;
        self.spec.validate()
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnonymizedConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Secret holding the hidden-service identity; `<name>-tor` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoneroNodeSetSpec {
    #[serde(default)]
    pub replicas: u32,
    #[serde(default)]
    pub hard_anti_affinity: bool,
    #[serde(default)]
    pub disk_size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default)]
    pub service_type: ServiceType,
    #[serde(default, alias = "tor")]
    pub anonymized: AnonymizedConfig,
    #[serde(default)]
    pub daemon_image: String,
    #[serde(default)]
    pub daemon_args: Vec<String>,
}

impl MoneroNodeSetSpec {
    pub fn apply_defaults(&mut self) {
        if self.replicas == 0 {
            self.replicas = DEFAULT_REPLICAS;
        }
        if self.disk_size.is_empty() {
            self.disk_size = DEFAULT_DISK_SIZE.to_owned();
        }
        if self.daemon_image.is_empty() {
            self.daemon_image = DEFAULT_MONEROD_IMAGE.to_owned();
        }
        if matches!(self.storage_class.as_deref(), Some("")) {
            self.storage_class = None;
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.replicas < 1 {
            return Err(ValidationError::TooSmall {
                field: "spec.replicas",
                min: 1,
                value: self.replicas,
            });
        }
        if !is_quantity(&self.disk_size) {
            return Err(ValidationError::InvalidQuantity {
                field: "spec.diskSize",
                value: self.disk_size.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoneroNodeSetStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymized_address: Option<String>,
}

impl MoneroNodeSetStatus {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.anonymized_address.is_none()
    }
}

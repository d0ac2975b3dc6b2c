use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::meta::{require_name, Resource, ValidationError, API_VERSION};
use crate::nodeset::MoneroNodeSetSpec;

pub const DEFAULT_NETWORK_REPLICAS: u32 = 3;

fn default_api_version() -> String {
    API_VERSION.to_owned()
}

fn default_kind() -> String {
    MoneroNetwork::KIND.to_owned()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoneroNetwork {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: MoneroNetworkSpec,
    #[serde(default, skip_serializing_if = "MoneroNetworkStatus::is_empty")]
    pub status: MoneroNetworkStatus,
}

impl MoneroNetwork {
    pub fn new(name: &str, namespace: &str, spec: MoneroNetworkSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some(namespace.to_owned()),
                ..ObjectMeta::default()
            },
            spec,
            status: MoneroNetworkStatus::default(),
        }
    }

    /// Stable name of the member node set at `index`.
    pub fn member_name(&self, index: u32) -> String {
        format!("{}-{}", self.name(), index)
    }
}

impl Resource for MoneroNetwork {
    const KIND: &'static str = "MoneroNetwork";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn apply_defaults(&mut self) {
        if self.spec.replicas == 0 {
            self.spec.replicas = DEFAULT_NETWORK_REPLICAS;
        }
        // Every member owns its identity; a shared secret name would make
        // all members advertise the same onion address.
        self.spec.template.spec.anonymized.secret_ref = None;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_name(Self::KIND, &self.metadata)?;
        if self.spec.replicas < 1 {
            return Err(ValidationError::TooSmall {
                field: "spec.replicas",
                min: 1,
                value: self.spec.replicas,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoneroNetworkSpec {
    #[serde(default)]
    pub replicas: u32,
    #[serde(default)]
    pub template: MoneroNetworkTemplate,
}

/// Member template: labels copied onto each member plus the shared node set spec.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoneroNetworkTemplate {
    #[serde(default)]
    pub metadata: TemplateMeta,
    #[serde(default)]
    pub spec: MoneroNodeSetSpec,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMeta {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoneroNetworkStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl MoneroNetworkStatus {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodeset::AnonymizedConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_to_three_members() {
        let mut net = MoneroNetwork::new("mainnet", "default", MoneroNetworkSpec::default());
        net.apply_defaults();
        assert_eq!(net.spec.replicas, 3);
        let again = {
            let mut copy = net.clone();
            copy.apply_defaults();
            copy
        };
        assert_eq!(net, again);
        net.validate().unwrap();
    }

    #[test]
    fn template_drops_shared_identity() {
        let mut spec = MoneroNetworkSpec::default();
        spec.template.spec.anonymized = AnonymizedConfig {
            enabled: true,
            secret_ref: Some("shared".into()),
        };
        let mut net = MoneroNetwork::new("tor-net", "default", spec);
        net.apply_defaults();
        assert!(net.spec.template.spec.anonymized.enabled);
        assert_eq!(net.spec.template.spec.anonymized.secret_ref, None);
    }

    #[test]
    fn member_names_are_index_suffixed() {
        let net = MoneroNetwork::new("mainnet", "default", MoneroNetworkSpec::default());
        assert_eq!(net.member_name(0), "mainnet-0");
        assert_eq!(net.member_name(2), "mainnet-2");
    }

    #[test]
    fn parses_template_manifest() {
        let manifest = r#"
apiVersion: utxo.com.br/v1alpha1
kind: MoneroNetwork
metadata:
  name: regtest
  namespace: monero
spec:
  replicas: 2
  template:
    metadata:
      labels:
        tier: public
    spec:
      diskSize: 10Gi
      daemonArgs: ["--regtest"]
"#;
        let net: MoneroNetwork = serde_yaml::from_str(manifest).unwrap();
        assert_eq!(net.spec.replicas, 2);
        assert_eq!(net.spec.template.metadata.labels["tier"], "public");
        assert_eq!(net.spec.template.spec.disk_size, "10Gi");
        assert_eq!(net.namespace(), "monero");
    }
}

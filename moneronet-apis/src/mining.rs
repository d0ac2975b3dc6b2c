use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::meta::{require_name, Resource, ValidationError, API_VERSION};

pub const DEFAULT_XMRIG_IMAGE: &str = "index.docker.io/utxobr/xmrig@sha256:a0a231a6fc983885f7fb0ce68fffca027bb2fa032851539901b99ebbfd9140a1";

/// Placeholder replaced by the zero-based worker index in worker args.
pub const ID_PLACEHOLDER: &str = "$(id)";

const fn default_mining_replicas() -> u32 {
    1
}

fn default_api_version() -> String {
    API_VERSION.to_owned()
}

fn default_kind() -> String {
    MoneroMiningNodeSet::KIND.to_owned()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoneroMiningNodeSet {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: MoneroMiningNodeSetSpec,
    #[serde(default, skip_serializing_if = "MoneroMiningNodeSetStatus::is_empty")]
    pub status: MoneroMiningNodeSetStatus,
}

impl MoneroMiningNodeSet {
    pub fn new(name: &str, namespace: &str, spec: MoneroMiningNodeSetSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some(namespace.to_owned()),
                ..ObjectMeta::default()
            },
            spec,
            status: MoneroMiningNodeSetStatus::default(),
        }
    }

    pub fn worker_name(&self, index: u32) -> String {
        format!("{}-{}", self.name(), index)
    }
}

impl Resource for MoneroMiningNodeSet {
    const KIND: &'static str = "MoneroMiningNodeSet";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn apply_defaults(&mut self) {
        if self.spec.worker_image.is_empty() {
            self.spec.worker_image = DEFAULT_XMRIG_IMAGE.to_owned();
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_name(Self::KIND, &self.metadata)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoneroMiningNodeSetSpec {
    /// Zero is accepted and scales the fleet down to no workers.
    #[serde(default = "default_mining_replicas")]
    pub replicas: u32,
    #[serde(default)]
    pub hard_anti_affinity: bool,
    #[serde(default)]
    pub worker_image: String,
    /// Worker arguments; `$(id)` is substituted per replica.
    #[serde(default)]
    pub worker_args_template: Vec<String>,
}

impl Default for MoneroMiningNodeSetSpec {
    fn default() -> Self {
        Self {
            replicas: default_mining_replicas(),
            hard_anti_affinity: false,
            worker_image: String::new(),
            worker_args_template: Vec::new(),
        }
    }
}

impl MoneroMiningNodeSetSpec {
    /// Arguments of the worker at `index` with the placeholder substituted.
    pub fn worker_args(&self, index: u32) -> Vec<String> {
        let id = index.to_string();
        self.worker_args_template
            .iter()
            .map(|arg| arg.replace(ID_PLACEHOLDER, &id))
            .collect()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoneroMiningNodeSetStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl MoneroMiningNodeSetStatus {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_image_and_keeps_replicas() {
        let manifest = "metadata: {name: miners}\nspec: {}\n";
        let mut set: MoneroMiningNodeSet = serde_yaml::from_str(manifest).unwrap();
        set.apply_defaults();
        assert_eq!(set.spec.replicas, 1);
        assert_eq!(set.spec.worker_image, DEFAULT_XMRIG_IMAGE);
        let mut again = set.clone();
        again.apply_defaults();
        assert_eq!(set, again);
        set.validate().unwrap();
    }

    #[test]
    fn substitutes_id_in_every_argument() {
        let spec = MoneroMiningNodeSetSpec {
            worker_args_template: vec![
                "--user=wallet".into(),
                "--rig-id=worker-$(id)".into(),
                "--log-file=/tmp/$(id)-$(id).log".into(),
            ],
            ..MoneroMiningNodeSetSpec::default()
        };
        assert_eq!(
            spec.worker_args(4),
            vec!["--user=wallet", "--rig-id=worker-4", "--log-file=/tmp/4-4.log"]
        );
    }

    #[test]
    fn worker_names_follow_parent() {
        let set = MoneroMiningNodeSet::new("miners", "default", MoneroMiningNodeSetSpec::default());
        assert_eq!(set.worker_name(0), "miners-0");
        assert_eq!(set.worker_name(11), "miners-11");
    }
}

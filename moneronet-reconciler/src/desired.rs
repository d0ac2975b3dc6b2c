use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use moneronet_apis::{ObjectKey, Resource};
use serde::Serialize;
use serde_json::Value;

/// One child object the assembler wants to exist. Never stored as is; the
/// converger reconciles it against the live object with the same key.
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredObject {
    pub key: ObjectKey,
    pub owner_key: ObjectKey,
    pub owner: OwnerReference,
    pub content: Value,
    /// When false the object is only created; an existing one is left as is.
    pub must_match_spec_on_update: bool,
}

impl DesiredObject {
    /// Child `object` of kind `kind` owned by `parent`, in the parent's namespace.
    pub fn child<P, T>(parent: &P, kind: &str, object: &T) -> Result<Self, serde_json::Error>
    where
        P: Resource,
        T: Serialize,
    {
        let content = serde_json::to_value(object)?;
        let name = content
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        Ok(Self {
            key: ObjectKey::new(kind, parent.namespace(), name),
            owner_key: parent.key(),
            owner: parent.controller_ref(),
            content,
            must_match_spec_on_update: true,
        })
    }

    pub fn create_only(mut self) -> Self {
        self.must_match_spec_on_update = false;
        self
    }

    pub fn has_owner_references(&self) -> bool {
        self.content
            .pointer("/metadata/ownerReferences")
            .and_then(Value::as_array)
            .is_some_and(|refs| !refs.is_empty())
    }

    /// Adds the controller reference unless the content already names an owner.
    pub fn stamp_owner(&mut self) -> Result<(), serde_json::Error> {
        if self.has_owner_references() {
            return Ok(());
        }
        let owner = serde_json::to_value(vec![&self.owner])?;
        if let Some(metadata) = self
            .content
            .get_mut("metadata")
            .and_then(Value::as_object_mut)
        {
            metadata.insert("ownerReferences".to_owned(), owner);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use moneronet_apis::{MoneroNodeSet, MoneroNodeSetSpec};
    use serde_json::json;

    fn parent() -> MoneroNodeSet {
        let mut set = MoneroNodeSet::new("node", "monero", MoneroNodeSetSpec::default());
        set.metadata.uid = Some("uid-1".into());
        set
    }

    fn config_map() -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("node-conf".into()),
                namespace: Some("monero".into()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }
    }

    #[test]
    fn child_takes_key_from_content() {
        let desired = DesiredObject::child(&parent(), "ConfigMap", &config_map()).unwrap();
        assert_eq!(desired.key, ObjectKey::new("ConfigMap", "monero", "node-conf"));
        assert_eq!(desired.owner_key.to_string(), "MoneroNodeSet monero/node");
        assert_eq!(desired.content["kind"], "ConfigMap");
        assert!(desired.must_match_spec_on_update);
        assert!(!desired.create_only().must_match_spec_on_update);
    }

    #[test]
    fn stamps_owner_once() {
        let mut desired = DesiredObject::child(&parent(), "ConfigMap", &config_map()).unwrap();
        desired.stamp_owner().unwrap();
        assert_eq!(desired.content["metadata"]["ownerReferences"][0]["uid"], "uid-1");
        assert_eq!(desired.content["metadata"]["ownerReferences"][0]["controller"], true);
    }

    #[test]
    fn keeps_existing_owner() {
        let mut desired = DesiredObject::child(&parent(), "ConfigMap", &config_map()).unwrap();
        let foreign = json!([{ "apiVersion": "v1", "kind": "Other", "name": "x", "uid": "other" }]);
        desired.content["metadata"]["ownerReferences"] = foreign.clone();
        desired.stamp_owner().unwrap();
        assert_eq!(desired.content["metadata"]["ownerReferences"], foreign);
    }
}

//! The cluster API seam.
//!
//! Control loops only talk to a [`ClusterApi`]; [`MemoryStore`] is the
//! in-process implementation used by the operator binary and the tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use moneronet_apis::ObjectKey;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::StoreError;

pub mod fields;
mod memory;

pub use memory::MemoryStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchEventKind {
    Applied,
    Deleted,
}

/// Notification that the object behind `key` changed. Delivery is at least
/// once; consumers must tolerate duplicates.
#[derive(Clone, Debug)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: ObjectKey,
    /// Object state after the change, or the last state for deletions.
    pub object: Value,
}

/// Server-side apply options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyParams {
    pub field_manager: String,
    /// Take ownership of fields another manager holds instead of failing.
    pub force: bool,
    /// Concurrency token; the apply fails if the live object moved past it.
    pub resource_version: Option<String>,
}

impl ApplyParams {
    pub fn forced(field_manager: impl Into<String>) -> Self {
        Self {
            field_manager: field_manager.into(),
            force: true,
            resource_version: None,
        }
    }

    pub fn with_resource_version(mut self, resource_version: Option<String>) -> Self {
        self.resource_version = resource_version;
        self
    }
}

/// Key-addressed access to cluster objects, stored as JSON.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<Value, StoreError>;

    /// Objects of `kind`, optionally limited to one namespace, whose labels
    /// include every pair in `labels`. Sorted by key.
    async fn list(
        &self,
        kind: &str,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Value>, StoreError>;

    async fn create(
        &self,
        key: &ObjectKey,
        object: Value,
        field_manager: &str,
    ) -> Result<Value, StoreError>;

    /// Server-side apply of the fields in `object` on behalf of
    /// `params.field_manager`. Creates the object if it does not exist.
    async fn apply(
        &self,
        key: &ObjectKey,
        object: Value,
        params: &ApplyParams,
    ) -> Result<Value, StoreError>;

    /// Whole-object replace. A `metadata.resourceVersion` in `object` must
    /// match the live one. Status is left untouched.
    async fn update(
        &self,
        key: &ObjectKey,
        object: Value,
        field_manager: &str,
    ) -> Result<Value, StoreError>;

    async fn update_status(&self, key: &ObjectKey, status: Value) -> Result<Value, StoreError>;

    /// Deletes the object and, transitively, everything it owns.
    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;

    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}

pub fn resource_version(object: &Value) -> Option<String> {
    object
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

pub fn labels_of(object: &Value) -> BTreeMap<String, String> {
    object
        .pointer("/metadata/labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_owned())))
                .collect()
        })
        .unwrap_or_default()
}

/// Key of the controlling owner of `object`, if any. Owners share the
/// object's namespace.
pub fn controller_of(key: &ObjectKey, object: &Value) -> Option<ObjectKey> {
    object
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)?
        .iter()
        .find(|owner| owner.get("controller").and_then(Value::as_bool) == Some(true))
        .and_then(|owner| {
            let kind = owner.get("kind")?.as_str()?;
            let name = owner.get("name")?.as_str()?;
            Some(ObjectKey::new(kind, key.namespace.clone(), name))
        })
}

/// UID on the controlling owner reference of `object`.
pub fn controller_uid(object: &Value) -> Option<&str> {
    object
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)?
        .iter()
        .find(|owner| owner.get("controller").and_then(Value::as_bool) == Some(true))
        .and_then(|owner| owner.get("uid")?.as_str())
}

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use moneronet_apis::ObjectKey;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tracing::trace;

use super::fields::{get_path, leaf_paths, overlaps, remove_path, set_path, FieldPath};
use super::{
    controller_of, controller_uid, labels_of, resource_version, ApplyParams, ClusterApi, WatchEvent,
    WatchEventKind,
};
use crate::error::StoreError;

const EVENT_CAPACITY: usize = 1024;

type Managers = BTreeMap<String, BTreeSet<FieldPath>>;

struct StoredObject {
    value: Value,
    version: u64,
    managers: Managers,
}

impl StoredObject {
    fn uid(&self) -> &str {
        self.value
            .pointer("/metadata/uid")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<ObjectKey, StoredObject>,
    /// UIDs of deleted objects. New objects controlled by one of them are
    /// refused.
    deleted_uids: BTreeSet<String>,
    last_version: u64,
    writes: u64,
}

impl StoreState {
    fn check_owner_alive(&self, key: &ObjectKey, object: &Value) -> Result<(), StoreError> {
        match controller_uid(object) {
            Some(uid) if self.deleted_uids.contains(uid) => Err(StoreError::NotFound(
                controller_of(key, object).unwrap_or_else(|| key.clone()),
            )),
            _ => Ok(()),
        }
    }

    fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.writes += 1;
        self.last_version
    }
}

/// In-memory cluster store with resource versions, per-manager field
/// ownership, cascading deletion and a broadcast watch.
///
/// Writes that leave an object unchanged are not counted, do not bump the
/// resource version and publish no event.
pub struct MemoryStore {
    state: Mutex<StoreState>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(StoreState::default()),
            events,
        }
    }

    /// Number of writes that changed an object, including deletions.
    pub fn writes(&self) -> u64 {
        self.state.lock().writes
    }

    /// Every stored object, sorted by key.
    pub fn snapshot(&self) -> Vec<Value> {
        self.state
            .lock()
            .objects
            .values()
            .map(|stored| stored.value.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, kind: WatchEventKind, key: &ObjectKey, object: &Value) {
        trace!(?kind, %key, "publishing watch event");
        // No receivers is fine; nobody is watching yet.
        let _ = self.events.send(WatchEvent {
            kind,
            key: key.clone(),
            object: object.clone(),
        });
    }

    fn insert_new(
        &self,
        state: &mut StoreState,
        key: &ObjectKey,
        mut value: Value,
        field_manager: &str,
    ) -> Value {
        strip_bookkeeping(&mut value);
        let version = state.next_version();
        let uid = hex::encode(rand::random::<[u8; 16]>());
        stamp(&mut value, &uid, version);
        let managers = Managers::from([(field_manager.to_owned(), leaf_paths(&value))]);
        state.objects.insert(
            key.clone(),
            StoredObject {
                value: value.clone(),
                version,
                managers,
            },
        );
        self.publish(WatchEventKind::Applied, key, &value);
        value
    }

    fn commit(
        &self,
        state: &mut StoreState,
        key: &ObjectKey,
        mut value: Value,
        managers: Managers,
    ) -> Result<Value, StoreError> {
        let version = state.next_version();
        let stored = state
            .objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let uid = stored.uid().to_owned();
        stamp(&mut value, &uid, version);
        stored.value = value.clone();
        stored.version = version;
        stored.managers = managers;
        self.publish(WatchEventKind::Applied, key, &value);
        Ok(value)
    }
}

fn normalize(key: &ObjectKey, mut object: Value) -> Result<Value, StoreError> {
    let map = object
        .as_object_mut()
        .ok_or_else(|| StoreError::Invalid(format!("{key} is not a JSON object")))?;
    map.entry("kind")
        .or_insert_with(|| Value::String(key.kind.clone()));
    let metadata = map
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| StoreError::Invalid(format!("{key} has non-object metadata")))?;
    metadata.insert("name".to_owned(), Value::String(key.name.clone()));
    metadata.insert("namespace".to_owned(), Value::String(key.namespace.clone()));
    Ok(object)
}

fn strip_bookkeeping(object: &mut Value) {
    if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.remove("uid");
        metadata.remove("resourceVersion");
    }
}

fn stamp(object: &mut Value, uid: &str, version: u64) {
    if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.insert("uid".to_owned(), json!(uid));
        metadata.insert("resourceVersion".to_owned(), json!(version.to_string()));
    }
}

fn check_version(key: &ObjectKey, wanted: Option<String>, live: u64) -> Result<(), StoreError> {
    match wanted {
        Some(wanted) if wanted != live.to_string() => Err(StoreError::Conflict {
            key: key.clone(),
            reason: format!("resource version {wanted} is stale, live object is at {live}"),
        }),
        _ => Ok(()),
    }
}

fn owned_by(object: &Value, uid: &str) -> bool {
    object
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)
        .is_some_and(|owners| {
            owners
                .iter()
                .any(|owner| owner.get("uid").and_then(Value::as_str) == Some(uid))
        })
}

#[async_trait]
impl ClusterApi for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Value, StoreError> {
        self.state
            .lock()
            .objects
            .get(key)
            .map(|stored| stored.value.clone())
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn list(
        &self,
        kind: &str,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Value>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .filter(|(key, _)| namespace.map_or(true, |ns| key.namespace == ns))
            .filter(|(_, stored)| {
                let have = labels_of(&stored.value);
                labels.iter().all(|(k, v)| have.get(k) == Some(v))
            })
            .map(|(_, stored)| stored.value.clone())
            .collect())
    }

    async fn create(
        &self,
        key: &ObjectKey,
        object: Value,
        field_manager: &str,
    ) -> Result<Value, StoreError> {
        let object = normalize(key, object)?;
        let mut state = self.state.lock();
        if state.objects.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.clone()));
        }
        state.check_owner_alive(key, &object)?;
        Ok(self.insert_new(&mut state, key, object, field_manager))
    }

    async fn apply(
        &self,
        key: &ObjectKey,
        object: Value,
        params: &ApplyParams,
    ) -> Result<Value, StoreError> {
        let mut applied = normalize(key, object)?;
        strip_bookkeeping(&mut applied);
        if let Some(map) = applied.as_object_mut() {
            map.remove("status");
        }

        let mut state = self.state.lock();
        let Some(stored) = state.objects.get(key) else {
            state.check_owner_alive(key, &applied)?;
            return Ok(self.insert_new(&mut state, key, applied, &params.field_manager));
        };
        check_version(key, params.resource_version.clone(), stored.version)?;

        let applied_paths = leaf_paths(&applied);
        let mut conflicts: Vec<(String, FieldPath)> = Vec::new();
        for (manager, owned) in &stored.managers {
            if *manager == params.field_manager {
                continue;
            }
            for path in &applied_paths {
                let contested = owned.iter().any(|theirs| overlaps(theirs, path));
                if contested && get_path(&stored.value, path) != get_path(&applied, path) {
                    conflicts.push((manager.clone(), path.clone()));
                }
            }
        }
        if !conflicts.is_empty() && !params.force {
            let (manager, path) = &conflicts[0];
            return Err(StoreError::Conflict {
                key: key.clone(),
                reason: format!("field {} is managed by {manager}", path.join(".")),
            });
        }

        let mut managers = stored.managers.clone();
        for (manager, path) in &conflicts {
            if let Some(owned) = managers.get_mut(manager) {
                owned.retain(|theirs| !overlaps(theirs, path));
            }
        }

        let mut next = stored.value.clone();
        let previous = managers
            .get(&params.field_manager)
            .cloned()
            .unwrap_or_default();
        for dropped in previous.difference(&applied_paths) {
            let shared = managers
                .iter()
                .filter(|(manager, _)| **manager != params.field_manager)
                .any(|(_, owned)| owned.iter().any(|theirs| overlaps(theirs, dropped)));
            if !shared {
                remove_path(&mut next, dropped);
            }
        }
        for path in &applied_paths {
            if let Some(leaf) = get_path(&applied, path) {
                set_path(&mut next, path, leaf.clone());
            }
        }
        managers.insert(params.field_manager.clone(), applied_paths);
        managers.retain(|_, owned| !owned.is_empty());

        if next == stored.value && managers == stored.managers {
            return Ok(next);
        }
        self.commit(&mut state, key, next, managers)
    }

    async fn update(
        &self,
        key: &ObjectKey,
        object: Value,
        field_manager: &str,
    ) -> Result<Value, StoreError> {
        let mut next = normalize(key, object)?;
        let mut state = self.state.lock();
        let stored = state
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        check_version(key, resource_version(&next), stored.version)?;

        if let Some(map) = next.as_object_mut() {
            match stored.value.get("status") {
                Some(status) => {
                    map.insert("status".to_owned(), status.clone());
                }
                None => {
                    map.remove("status");
                }
            }
        }
        stamp(&mut next, stored.uid(), stored.version);
        if next == stored.value {
            return Ok(next);
        }

        let before = leaf_paths(&stored.value);
        let after = leaf_paths(&next);
        let removed: BTreeSet<FieldPath> = before.difference(&after).cloned().collect();
        let changed: BTreeSet<FieldPath> = after
            .into_iter()
            .filter(|path| get_path(&stored.value, path) != get_path(&next, path))
            .collect();

        let mut managers = stored.managers.clone();
        for owned in managers.values_mut() {
            owned.retain(|path| {
                !removed.contains(path) && !changed.iter().any(|c| overlaps(c, path))
            });
        }
        managers
            .entry(field_manager.to_owned())
            .or_default()
            .extend(changed);
        managers.retain(|_, owned| !owned.is_empty());

        self.commit(&mut state, key, next, managers)
    }

    async fn update_status(&self, key: &ObjectKey, status: Value) -> Result<Value, StoreError> {
        let mut state = self.state.lock();
        let stored = state
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let mut next = stored.value.clone();
        if let Some(map) = next.as_object_mut() {
            if status.is_null() {
                map.remove("status");
            } else {
                map.insert("status".to_owned(), status);
            }
        }
        if next == stored.value {
            return Ok(next);
        }
        let managers = stored.managers.clone();
        self.commit(&mut state, key, next, managers)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let root = state
            .objects
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let mut pending = vec![(key.clone(), root)];
        while let Some((key, removed)) = pending.pop() {
            state.writes += 1;
            self.publish(WatchEventKind::Deleted, &key, &removed.value);

            let uid = removed.uid().to_owned();
            state.deleted_uids.insert(uid.clone());
            let dependents: Vec<ObjectKey> = state
                .objects
                .iter()
                .filter(|(_, stored)| owned_by(&stored.value, &uid))
                .map(|(key, _)| key.clone())
                .collect();
            for dependent in dependents {
                if let Some(stored) = state.objects.remove(&dependent) {
                    pending.push((dependent, stored));
                }
            }
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}

//! Leaf-path view of JSON objects used for field ownership.
//!
//! Objects are walked map by map; every scalar, list, or empty map is a
//! leaf. Lists are atomic: a manager owns a list as a whole.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

pub type FieldPath = Vec<String>;

/// Bookkeeping fields the store owns itself.
const UNTRACKED: &[&[&str]] = &[
    &["apiVersion"],
    &["kind"],
    &["metadata", "name"],
    &["metadata", "namespace"],
    &["metadata", "uid"],
    &["metadata", "resourceVersion"],
    &["metadata", "creationTimestamp"],
    &["status"],
];

fn is_tracked(path: &[String]) -> bool {
    !UNTRACKED.iter().any(|untracked| {
        path.len() >= untracked.len() && path.iter().zip(untracked.iter()).all(|(a, b)| a == b)
    })
}

/// Paths of every tracked leaf in `value`.
pub fn leaf_paths(value: &Value) -> BTreeSet<FieldPath> {
    let mut out = BTreeSet::new();
    let mut prefix = Vec::new();
    walk(value, &mut prefix, &mut out);
    out.retain(|path| is_tracked(path));
    out
}

fn walk(value: &Value, prefix: &mut FieldPath, out: &mut BTreeSet<FieldPath>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                prefix.push(key.clone());
                walk(child, prefix, out);
                prefix.pop();
            }
        }
        _ if prefix.is_empty() => {}
        _ => {
            out.insert(prefix.clone());
        }
    }
}

/// True if one path is a prefix of the other.
pub fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

pub fn get_path<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, key| node.get(key))
}

/// Writes `leaf` at `path`, replacing any non-map node in the way.
pub fn set_path(value: &mut Value, path: &[String], leaf: Value) {
    let Some((last, parents)) = path.split_last() else {
        *value = leaf;
        return;
    };
    let mut node = value;
    for key in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        map.insert(last.clone(), leaf);
    }
}

/// Removes the leaf at `path` and any maps left empty above it.
pub fn remove_path(value: &mut Value, path: &[String]) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let Value::Object(map) = value else {
        return;
    };
    if rest.is_empty() {
        map.remove(first);
        return;
    }
    if let Some(child) = map.get_mut(first) {
        remove_path(child, rest);
        if child.as_object().is_some_and(Map::is_empty) {
            map.remove(first);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn path(parts: &[&str]) -> FieldPath {
        parts.iter().map(|p| (*p).to_owned()).collect()
    }

    #[test]
    fn leaves_skip_bookkeeping_and_keep_lists_atomic() {
        let value = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "a", "resourceVersion": "3", "labels": {"app": "a"}},
            "data": {"torrc": "x", "empty": {}},
            "spec": {"ports": [{"port": 1}, {"port": 2}]},
            "status": {"ready": true}
        });
        let leaves: Vec<_> = leaf_paths(&value).into_iter().collect();
        assert_eq!(
            leaves,
            vec![
                path(&["data", "empty"]),
                path(&["data", "torrc"]),
                path(&["metadata", "labels", "app"]),
                path(&["spec", "ports"]),
            ]
        );
    }

    #[test]
    fn set_and_remove_paths() {
        let mut value = json!({"metadata": {"name": "a"}});
        set_path(&mut value, &path(&["metadata", "labels", "app"]), json!("a"));
        set_path(&mut value, &path(&["spec", "replicas"]), json!(2));
        assert_eq!(get_path(&value, &path(&["spec", "replicas"])), Some(&json!(2)));

        remove_path(&mut value, &path(&["metadata", "labels", "app"]));
        assert_eq!(value, json!({"metadata": {"name": "a"}, "spec": {"replicas": 2}}));
    }

    #[test]
    fn set_path_replaces_scalars_in_the_way() {
        let mut value = json!({"spec": 1});
        set_path(&mut value, &path(&["spec", "replicas"]), json!(3));
        assert_eq!(value, json!({"spec": {"replicas": 3}}));
    }

    #[test]
    fn overlap_is_prefix_either_way() {
        assert!(overlaps(&path(&["a", "b"]), &path(&["a"])));
        assert!(overlaps(&path(&["a"]), &path(&["a", "b"])));
        assert!(!overlaps(&path(&["a", "b"]), &path(&["a", "c"])));
    }
}

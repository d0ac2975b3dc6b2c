//! Manifest files: multi-document YAML (or JSON) holding any mix of the
//! three custom resource kinds.

use std::{
    fs,
    path::{Path, PathBuf},
};

use moneronet_apis::{MoneroMiningNodeSet, MoneroNetwork, MoneroNodeSet, ObjectKey, Resource};
use moneronet_reconciler::assemble::{
    assemble_mining, assemble_network, assemble_nodeset, network_member,
};
use moneronet_reconciler::{AssembleError, DesiredObject};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("unable to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("document {index}: {source}")]
    Parse {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("document {index}: missing kind")]
    MissingKind { index: usize },
    #[error("document {index}: unsupported kind {kind}")]
    UnknownKind { index: usize, kind: String },
    #[error("document {index}: {source}")]
    Encode {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Manifest {
    NodeSet(MoneroNodeSet),
    Network(MoneroNetwork),
    Mining(MoneroMiningNodeSet),
}

impl Manifest {
    pub fn key(&self) -> ObjectKey {
        match self {
            Self::NodeSet(set) => set.key(),
            Self::Network(network) => network.key(),
            Self::Mining(set) => set.key(),
        }
    }

    pub fn apply_defaults(&mut self) {
        match self {
            Self::NodeSet(set) => set.apply_defaults(),
            Self::Network(network) => network.apply_defaults(),
            Self::Mining(set) => set.apply_defaults(),
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::NodeSet(set) => serde_json::to_value(set),
            Self::Network(network) => serde_json::to_value(network),
            Self::Mining(set) => serde_json::to_value(set),
        }
    }

    /// Children this manifest would converge to, with owner references
    /// stamped. Anonymized node sets get a throwaway identity that is never
    /// written anywhere.
    pub fn preview(&self) -> Result<Vec<Value>, AssembleError> {
        let desired = match self {
            Self::NodeSet(set) => preview_nodeset(set)?,
            Self::Network(network) => {
                let mut desired = assemble_network(network)?;
                for index in 0..network.spec.replicas {
                    desired.extend(preview_nodeset(&network_member(network, index))?);
                }
                desired
            }
            Self::Mining(set) => assemble_mining(set)?,
        };
        desired
            .into_iter()
            .map(|mut object| -> Result<Value, AssembleError> {
                object.stamp_owner()?;
                Ok(object.content)
            })
            .collect()
    }
}

fn preview_nodeset(set: &MoneroNodeSet) -> Result<Vec<DesiredObject>, AssembleError> {
    let identity = if set.spec.anonymized.enabled {
        Some(moneronet_tor::issue()?)
    } else {
        None
    };
    assemble_nodeset(set, identity.as_ref())
}

pub fn parse_manifests(text: &str) -> Result<Vec<Manifest>, ManifestError> {
    let mut manifests = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|source| ManifestError::Parse { index, source })?;
        if value.is_null() {
            continue;
        }
        manifests.push(manifest_from_value(index, value)?);
    }
    Ok(manifests)
}

fn manifest_from_value(index: usize, value: serde_yaml::Value) -> Result<Manifest, ManifestError> {
    let kind = value
        .get("kind")
        .and_then(serde_yaml::Value::as_str)
        .ok_or(ManifestError::MissingKind { index })?
        .to_owned();
    let parse = |source| ManifestError::Parse { index, source };
    if kind == MoneroNodeSet::KIND {
        serde_yaml::from_value(value).map(Manifest::NodeSet).map_err(parse)
    } else if kind == MoneroNetwork::KIND {
        serde_yaml::from_value(value).map(Manifest::Network).map_err(parse)
    } else if kind == MoneroMiningNodeSet::KIND {
        serde_yaml::from_value(value).map(Manifest::Mining).map_err(parse)
    } else {
        Err(ManifestError::UnknownKind { index, kind })
    }
}

/// Reads one manifest file, or every manifest file in a directory in name
/// order.
pub fn load_manifests(path: &Path) -> Result<Vec<Manifest>, ManifestError> {
    let io = |source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    };
    if !path.is_dir() {
        let text = fs::read_to_string(path).map_err(io)?;
        return parse_manifests(&text);
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(path).map_err(io)? {
        let file = entry.map_err(io)?.path();
        let is_manifest = file
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext));
        if is_manifest {
            files.push(file);
        }
    }
    files.sort();

    let mut manifests = Vec::new();
    for file in files {
        manifests.extend(load_manifests(&file)?);
    }
    Ok(manifests)
}

/// Renders objects as a `---` separated YAML stream.
pub fn render_yaml(objects: &[Value]) -> Result<String, serde_yaml::Error> {
    let mut out = String::new();
    for object in objects {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(object)?);
    }
    Ok(out)
}

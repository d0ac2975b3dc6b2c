use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

pub const GROUP: &str = "utxo.com.br";
pub const VERSION: &str = "v1alpha1";
pub const API_VERSION: &str = "utxo.com.br/v1alpha1";

/// Identity of any object in the cluster store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an object of the same kind and namespace.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(self.kind.clone(), self.namespace.clone(), name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{kind} is missing metadata.{field}")]
    MissingMetadata { kind: &'static str, field: &'static str },
    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: u32,
        value: u32,
    },
    #[error("{field} is not a valid quantity: {value:?}")]
    InvalidQuantity { field: &'static str, value: String },
}

/// Behaviour shared by the operator's own kinds.
pub trait Resource: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Fills unset spec fields. Applying twice yields the same object.
    fn apply_defaults(&mut self);

    fn validate(&self) -> Result<(), ValidationError>;

    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or("default")
    }

    fn key(&self) -> ObjectKey {
        ObjectKey::new(Self::KIND, self.namespace(), self.name())
    }

    /// Controller owner reference pointing at this object.
    fn controller_ref(&self) -> OwnerReference {
        OwnerReference {
            api_version: API_VERSION.to_owned(),
            kind: Self::KIND.to_owned(),
            name: self.name().to_owned(),
            uid: self.metadata().uid.clone().unwrap_or_default(),
            block_owner_deletion: Some(true),
            controller: Some(true),
        }
    }
}

pub(crate) fn require_name(kind: &'static str, meta: &ObjectMeta) -> Result<(), ValidationError> {
    match meta.name.as_deref() {
        Some(name) if !name.is_empty() => Ok(()),
        _ => Err(ValidationError::MissingMetadata { kind, field: "name" }),
    }
}

const QUANTITY_SUFFIXES: &[&str] = &[
    "", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "k", "M", "G", "T", "P", "E", "m",
];

/// Accepts the plain decimal and binary-SI forms of a resource quantity.
pub(crate) fn is_quantity(value: &str) -> bool {
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);
    let mut parts = number.split('.');
    let whole_ok = parts.next().map(|p| !p.is_empty()).unwrap_or(false);
    let frac_ok = parts.next().map(|p| !p.is_empty()).unwrap_or(true);
    whole_ok
        && frac_ok
        && parts.next().is_none()
        && number.chars().all(|c| c.is_ascii_digit() || c == '.')
        && QUANTITY_SUFFIXES.contains(&suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_forms() {
        for ok in ["50Gi", "1", "0.5Ti", "100M", "250m"] {
            assert!(is_quantity(ok), "{ok}");
        }
        for bad in ["", "Gi", "50GB", "1..2Gi", "-1Gi", ".5Gi", "5.Gi"] {
            assert!(!is_quantity(bad), "{bad}");
        }
    }

    #[test]
    fn key_display() {
        let key = ObjectKey::new("MoneroNodeSet", "default", "node-a");
        assert_eq!(key.to_string(), "MoneroNodeSet default/node-a");
        assert_eq!(key.sibling("node-b").name, "node-b");
    }
}

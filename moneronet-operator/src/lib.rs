//! Operator process for moneronet node fleets: configuration loading,
//! manifest handling and the in-memory run loop behind the
//! `moneronet-operator` binary.

pub mod config;
pub mod manifest;
pub mod run;

pub use crate::config::{load_config, ConfigError, ConfigFormat, OperatorConfig};
pub use crate::manifest::{load_manifests, parse_manifests, render_yaml, Manifest, ManifestError};
pub use crate::run::{run, seed, StopWhen};

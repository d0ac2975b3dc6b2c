//! `utxo.com.br/v1alpha1` resource types.
//!
//! Three operator-facing kinds are defined here:
//!
//! * [`MoneroNodeSet`]: a replicated group of monerod daemons, optionally
//!   reachable through a tor hidden service.
//! * [`MoneroNetwork`]: `replicas` node sets wired as exclusive peers of each
//!   other.
//! * [`MoneroMiningNodeSet`]: a fleet of single-replica xmrig workers.
//!
//! Every kind carries an `apply_defaults` that must run before assembly and is
//! idempotent, and a status whose condition list only ever holds current state.

pub mod condition;
pub mod meta;
pub mod mining;
pub mod network;
pub mod nodeset;

pub use condition::{
    set_condition, Condition, ConditionStatus, CONDITION_READY, REASON_FAILED, REASON_PENDING,
    REASON_SUCCEEDED,
};
pub use meta::{ObjectKey, Resource, ValidationError, API_VERSION, GROUP, VERSION};
pub use mining::{
    MoneroMiningNodeSet, MoneroMiningNodeSetSpec, MoneroMiningNodeSetStatus, DEFAULT_XMRIG_IMAGE,
    ID_PLACEHOLDER,
};
pub use network::{
    MoneroNetwork, MoneroNetworkSpec, MoneroNetworkStatus, MoneroNetworkTemplate, TemplateMeta,
};
pub use nodeset::{
    AnonymizedConfig, MoneroNodeSet, MoneroNodeSetSpec, MoneroNodeSetStatus, ServiceType,
    DEFAULT_DISK_SIZE, DEFAULT_MONEROD_IMAGE,
};

//! Control plane for Monero node fleets.
//!
//! Custom resources ([`moneronet_apis`]) are turned into the workload objects
//! that run them. Every pass is level-triggered: assemble the full desired
//! child set from the parent's spec, converge it against the store with
//! server-side apply, then report a `Ready` condition. A pass that changes
//! nothing writes nothing.
//!
//! The pieces, bottom-up:
//!
//! * [`topology`] plans exclusive peer lists so a network forms a complete
//!   graph.
//! * [`assemble`] builds the desired children of each custom resource.
//! * [`converge`] creates or patches them against a [`ClusterApi`].
//! * [`controller`] runs one work-queue-driven loop per kind.
//!
//! # Quickstart
//!
//! ```
//! use moneronet_apis::{MoneroNodeSet, MoneroNodeSetSpec, Resource};
//! use moneronet_reconciler::assemble::assemble_nodeset;
//!
//! let mut set = MoneroNodeSet::new("node", "default", MoneroNodeSetSpec::default());
//! set.apply_defaults();
//! let children = assemble_nodeset(&set, None).unwrap();
//! let kinds: Vec<_> = children.iter().map(|c| c.key.kind.as_str()).collect();
//! assert_eq!(kinds, ["Service", "StatefulSet"]);
//! ```

pub mod assemble;
pub mod context;
pub mod controller;
pub mod converge;
pub mod desired;
pub mod error;
pub mod monerod;
pub mod objects;
pub mod queue;
pub mod store;
pub mod topology;

pub use crate::context::{BackoffConfig, OperatorContext, ReconcilerConfig};
pub use crate::controller::Manager;
pub use crate::converge::{ConvergeOutcome, ConvergeSummary, Converger};
pub use crate::desired::DesiredObject;
pub use crate::error::{AssembleError, ConvergeError, ReconcileError, StoreError};
pub use crate::store::{ClusterApi, MemoryStore};
pub use crate::topology::{merged_slice, plan_exclusive_peers};

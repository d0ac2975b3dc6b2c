//! Pure mapping from a defaulted parent object to the children it owns.
//!
//! Every function here is deterministic: the same parent (and, for anonymized
//! node sets, the same issued identity) always yields byte-identical
//! [`DesiredObject`](crate::DesiredObject) lists, which is what lets a second
//! convergence pass be a no-op.

mod mining;
mod network;
mod nodeset;

pub use mining::assemble_mining;
pub use network::{assemble_network, network_member};
pub use nodeset::{assemble_nodeset, tor_secret_object};

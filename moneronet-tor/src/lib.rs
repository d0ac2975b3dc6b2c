//! Tor v3 hidden-service plumbing shared by the moneronet reconcilers.
//!
//! [`keys`] issues the long-lived ed25519 identity of an anonymized node set
//! and derives its `.onion` hostname. [`torrc`] renders the two tor
//! configurations the operator ships next to every anonymized node: the
//! outbound SOCKS proxy and the inbound hidden service.
//!
//! # Quickstart
//! ```
//! use moneronet_tor::{already_issued, Credentials};
//!
//! let creds = Credentials::from_seed([7u8; 32]);
//! assert!(already_issued(&creds));
//! assert!(creds.hostname().unwrap().ends_with(".onion"));
//! ```

pub mod keys;
pub mod torrc;

pub use keys::{
    already_issued, issue, issue_with, onion_address, Credentials, CredentialsError,
    FILENAME_HOSTNAME, FILENAME_PUBLIC_KEY, FILENAME_SECRET_KEY, ONION_SUFFIX,
};
pub use torrc::{HiddenServiceConfig, ProxyConfig};

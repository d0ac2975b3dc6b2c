//! monerod container constants, argument sets and config rendering.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

pub const P2P_PORT_NAME: &str = "p2p";
pub const P2P_PORT: u16 = 18080;
pub const RESTRICTED_PORT_NAME: &str = "restricted";
pub const RESTRICTED_PORT: u16 = 18089;
pub const TOR_P2P_PORT_NAME: &str = "tor-p2p";
pub const TOR_P2P_PORT: u16 = 18083;

/// NodePort services expose `port + NODE_PORT_OFFSET`.
pub const NODE_PORT_OFFSET: u16 = 12_000;

pub const CONTAINER_NAME: &str = "monerod";
pub const PROBE_PATH: &str = "/get_info";
pub const PROBE_PERIOD_SECONDS: i32 = 15;
pub const PROBE_INITIAL_DELAY_SECONDS: i32 = 15;
pub const PROBE_FAILURE_THRESHOLD: i32 = 5;

pub const DATA_VOLUME_NAME: &str = "data";
pub const DATA_MOUNT_PATH: &str = "/data";

pub const MEMORY_LIMIT: &str = "1Gi";
pub const HUGEPAGES_LIMIT: &str = "1Gi";

/// Pod annotation carrying [`MonerodConfig::digest`].
pub const CONFIG_DIGEST_ANNOTATION: &str = "utxo.com.br/monerod-config-digest";

/// Flags every monerod container starts with.
pub fn default_args() -> Vec<String> {
    vec![
        format!("--data-dir={DATA_MOUNT_PATH}"),
        "--log-file=/dev/stdout".to_owned(),
        "--non-interactive".to_owned(),
        "--no-zmq".to_owned(),
        "--no-igd".to_owned(),
        "--p2p-bind-ip=0.0.0.0".to_owned(),
        format!("--p2p-bind-port={P2P_PORT}"),
        "--rpc-restricted-bind-ip=0.0.0.0".to_owned(),
        format!("--rpc-restricted-bind-port={RESTRICTED_PORT}"),
    ]
}

/// Flags routing outbound traffic through the local tor proxy and announcing
/// `hostname` as the node's anonymous inbound address.
pub fn anonymized_args(hostname: &str) -> Vec<String> {
    vec![
        format!(
            "--tx-proxy=tor,127.0.0.1:{}",
            moneronet_tor::torrc::SOCKS_PORT
        ),
        format!("--anonymous-inbound={hostname}:{TOR_P2P_PORT},127.0.0.1:{TOR_P2P_PORT}"),
    ]
}

/// Effective daemon configuration as `key=value` pairs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonerodConfig(BTreeMap<String, String>);

impl MonerodConfig {
    /// Builds the config from `--key=value` flags; bare flags become `key=1`.
    pub fn from_args<'a>(args: impl IntoIterator<Item = &'a String>) -> Self {
        let entries = args
            .into_iter()
            .filter_map(|arg| arg.strip_prefix("--"))
            .map(|flag| match flag.split_once('=') {
                Some((key, value)) => (key.to_owned(), value.to_owned()),
                None => (flag.to_owned(), "1".to_owned()),
            })
            .collect();
        Self(entries)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Rendered `monerod.conf`, one sorted `key=value` per line.
    pub fn conf(&self) -> String {
        self.to_string()
    }

    /// Hex sha256 of [`conf`](Self::conf).
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.conf().as_bytes()))
    }
}

impl fmt::Display for MonerodConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.0 {
            writeln!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

//! torrc rendering for the proxy and hidden-service sidecars.

use std::fmt;

pub const SOCKS_PORT: u16 = 9050;
pub const CONTROL_PORT: u16 = 9051;
pub const HIDDEN_SERVICE_DIR: &str = "/tor";

/// Outbound proxy used by the node to reach other peers over tor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    pub socks_port: u16,
    pub control_port: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            socks_port: SOCKS_PORT,
            control_port: CONTROL_PORT,
        }
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SOCKSPort {}", self.socks_port)?;
        write!(f, "ControlPort {}", self.control_port)
    }
}

/// Inbound hidden service forwarding onion ports to the node's own service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HiddenServiceConfig {
    pub dir: String,
    /// In-cluster address the onion ports are forwarded to.
    pub target_host: String,
    pub ports: Vec<u16>,
}

impl HiddenServiceConfig {
    pub fn new(target_host: impl Into<String>, ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            dir: HIDDEN_SERVICE_DIR.to_owned(),
            target_host: target_host.into(),
            ports: ports.into_iter().collect(),
        }
    }
}

impl fmt::Display for HiddenServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HiddenServiceDir {}", self.dir)?;
        for port in &self.ports {
            writeln!(f, "HiddenServicePort {port} {}:{port}", self.target_host)?;
        }
        write!(f, "HiddenServiceVersion 3")
    }
}

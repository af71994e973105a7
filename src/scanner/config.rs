//! Scan engine configuration.
//!
//! Loaded as the `[scanner]` table of the server config file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ports probed by quick scans
pub const TOP_PORTS_QUICK: [u16; 7] = [80, 443, 22, 21, 25, 3306, 445];

/// Ports probed by full scans
pub const TOP_PORTS_FULL: [u16; 22] = [
    21, 22, 23, 25, 53, 80, 110, 135, 139, 143, 161, 389, 443, 445, 3389, 5900, 8080, 8081, 8443,
    3306, 9200, 27017,
];

/// Configuration for the network scan engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// HTTP request timeout in milliseconds
    pub http_timeout_ms: u64,

    /// Maximum concurrent port probes per scan
    pub port_concurrency: usize,

    /// Bytes read when grabbing a service banner
    pub banner_bytes: usize,

    /// Hosts probed at most for a CIDR target
    pub max_cidr_hosts: usize,

    /// Send benign reflection and quote probes in full mode
    pub input_probes: bool,

    /// User-Agent sent with HTTP probes
    pub user_agent: String,

    /// Override the mode port lists (mainly for tests)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<u16>>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2000,
            http_timeout_ms: 5000,
            port_concurrency: 12,
            banner_bytes: 1024,
            max_cidr_hosts: 16,
            input_probes: true,
            user_agent: format!("vulnscan/{}", env!("CARGO_PKG_VERSION")),
            ports: None,
        }
    }
}

impl ScannerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Ports to probe for a scan mode
    pub fn ports_for(&self, mode: crate::jobs::ScanMode) -> Vec<u16> {
        if let Some(ports) = &self.ports {
            return ports.clone();
        }
        match mode {
            crate::jobs::ScanMode::Quick => TOP_PORTS_QUICK.to_vec(),
            crate::jobs::ScanMode::Full => TOP_PORTS_FULL.to_vec(),
        }
    }
}

/// Well-known service name for a port
pub fn service_name(port: u16) -> &'static str {
    match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "dns",
        80 => "http",
        110 => "pop3",
        135 => "msrpc",
        139 => "netbios-ssn",
        143 => "imap",
        161 => "snmp",
        389 => "ldap",
        443 => "https",
        445 => "smb",
        3306 => "mysql",
        3389 => "rdp",
        5900 => "vnc",
        8080 | 8081 => "http-alt",
        8443 => "https-alt",
        9200 => "elasticsearch",
        27017 => "mongodb",
        _ => "unknown",
    }
}

// API Configuration

use crate::db::DatabaseConfig;
use crate::jobs::SchedulerConfig;
use crate::scanner::ScannerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header the identity collaborator forwards the authenticated user id in
pub const DEFAULT_IDENTITY_HEADER: &str = "X-User-Id";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Enable CORS
    pub enable_cors: bool,

    /// Allowed origins; empty allows any
    pub cors_origins: Vec<String>,

    /// Header carrying the user id set by the identity proxy
    pub identity_header: String,

    /// Static API keys (key -> owner id)
    pub api_keys: HashMap<String, String>,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// WebSocket ping interval in seconds
    pub ws_ping_interval_seconds: u64,

    pub scheduler: SchedulerConfig,

    pub scanner: ScannerConfig,

    /// Scan store; jobs are kept in memory when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            cors_origins: Vec::new(),
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            api_keys: HashMap::new(),
            max_body_size: 64 * 1024,
            ws_ping_interval_seconds: 30,
            scheduler: SchedulerConfig::default(),
            scanner: ScannerConfig::default(),
            database: None,
        }
    }
}

const EXAMPLE_CONFIG: &str = r#"# VulnScan API server configuration

host = "0.0.0.0"
port = 8080
enable_cors = true
# Allowed origins; leave empty to allow any
cors_origins = ["http://localhost:3000"]

# The identity proxy forwards the authenticated user id in this header
identity_header = "X-User-Id"
max_body_size = 65536
ws_ping_interval_seconds = 30

# Static API keys for automation: key = "owner id"
[api_keys]
"change-me-ci-key" = "ci-bot"

[scheduler]
max_concurrent_scans = 4
max_concurrent_per_user = 2
queue_capacity = 1000
scheduling_quantum_ms = 500
stage_retries = 2
retry_backoff_ms = 500
cancel_grace_ms = 2000
max_runtime_quick_secs = 600
max_runtime_full_secs = 3600
baseline_quick_secs = 60
baseline_full_secs = 300

[scanner]
connect_timeout_ms = 2000
http_timeout_ms = 5000
port_concurrency = 12
max_cidr_hosts = 16
input_probes = true

# Without a [database] table scan jobs are kept in memory
[database]
type = "sqlite"
path = "./vulnscan.db"

# PostgreSQL instead:
# type = "postgres"
# host = "localhost"
# port = 5432
# database = "vulnscan"
# username = "vulnscan"
# password = "secure_password"
# max_connections = 10
"#;

impl ApiConfig {
    /// Create config from file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ApiConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Create example config file
    pub fn create_example(path: &str) -> anyhow::Result<()> {
        std::fs::write(path, EXAMPLE_CONFIG)?;
        Ok(())
    }

    /// Owner id for an API key
    pub fn owner_for_key(&self, key: &str) -> Option<&str> {
        self.api_keys.get(key).map(String::as_str)
    }

    /// Add API key
    pub fn add_key(&mut self, key: String, owner: String) {
        self.api_keys.insert(key, owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 8080);
        assert!(config.enable_cors);
        assert!(config.api_keys.is_empty());
        assert!(config.database.is_none());
        assert_eq!(config.identity_header, "X-User-Id");
    }

    #[test]
    fn test_example_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vulnscan.toml");
        let path = path.to_str().unwrap();

        ApiConfig::create_example(path).unwrap();
        let config = ApiConfig::from_file(path).unwrap();

        assert_eq!(config.owner_for_key("change-me-ci-key"), Some("ci-bot"));
        assert_eq!(config.scheduler.max_concurrent_per_user, 2);
        assert_eq!(config.scanner.port_concurrency, 12);
        assert!(config.database.is_some());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9000\n[scheduler]\nmax_concurrent_scans = 1").unwrap();

        let config = ApiConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.scheduler.max_concurrent_scans, 1);
        assert_eq!(config.scheduler.queue_capacity, 1000);
    }
}

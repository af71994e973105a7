// VulnScan - vulnerability scan orchestrator
// Licensed under GPL-3.0

use crate::api::ApiConfig;
use crate::db::DatabaseConfig;
use anyhow::Context;
use clap::Parser;

mod api_server_args;
mod database_args;

pub use api_server_args::ApiServerArgs;
pub use database_args::DatabaseArgs;

/// VulnScan - vulnerability scan orchestrator
///
/// Serves the scan REST API: scans are queued per user, run in the
/// background with live progress, and produce severity-classified reports.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
#[command(name = "vulnscan")]
pub struct Args {
    #[command(flatten)]
    pub api: ApiServerArgs,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

impl Args {
    /// Reject combinations the server cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api.max_concurrent == Some(0) {
            anyhow::bail!("--max-concurrent must be at least 1");
        }
        if self.api.max_per_user == Some(0) {
            anyhow::bail!("--max-per-user must be at least 1");
        }
        Ok(())
    }

    /// Load the config file (or defaults) and apply command line overrides
    pub fn load_config(&self) -> anyhow::Result<ApiConfig> {
        let mut config = match &self.api.config {
            Some(path) => {
                let path_str = path
                    .to_str()
                    .ok_or_else(|| anyhow::anyhow!("Invalid config file path"))?;
                ApiConfig::from_file(path_str)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?
            }
            None => ApiConfig::default(),
        };

        self.apply(&mut config)?;
        Ok(config)
    }

    fn apply(&self, config: &mut ApiConfig) -> anyhow::Result<()> {
        if let Some(host) = &self.api.host {
            config.host = host.clone();
        }
        if let Some(port) = self.api.port {
            config.port = port;
        }
        if let Some(max) = self.api.max_concurrent {
            config.scheduler.max_concurrent_scans = max;
        }
        if let Some(max) = self.api.max_per_user {
            config.scheduler.max_concurrent_per_user = max;
        }

        if self.database.in_memory {
            config.database = None;
        } else if let Some(url) = &self.database.url {
            config.database = Some(DatabaseConfig::from_url(url)?);
        }
        Ok(())
    }
}

// VulnScan - vulnerability scan orchestrator
// Licensed under GPL-3.0

use clap::Args;
use std::path::PathBuf;

/// REST API server configuration
///
/// Binding and scheduling limits. Values given here override the
/// configuration file.
#[derive(Args, Debug, Clone, Default)]
pub struct ApiServerArgs {
    /// API server host address
    #[arg(long = "host", value_name = "HOST", id = "api_host")]
    pub host: Option<String>,

    /// API server port
    #[arg(long = "port", value_name = "PORT", id = "api_port")]
    pub port: Option<u16>,

    /// Configuration file (TOML format)
    #[arg(short = 'c', long = "config", value_name = "FILE", id = "api_config")]
    pub config: Option<PathBuf>,

    /// Maximum scans running at once
    #[arg(long = "max-concurrent", value_name = "NUM")]
    pub max_concurrent: Option<usize>,

    /// Maximum scans running at once for a single user
    #[arg(long = "max-per-user", value_name = "NUM")]
    pub max_per_user: Option<usize>,

    /// Generate example configuration file
    #[arg(
        long = "config-example",
        value_name = "FILE",
        id = "api_config_example"
    )]
    pub config_example: Option<PathBuf>,
}

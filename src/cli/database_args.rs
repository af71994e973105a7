// VulnScan - vulnerability scan orchestrator
// Licensed under GPL-3.0

use clap::Args;

/// Scan store selection
#[derive(Args, Debug, Clone, Default)]
pub struct DatabaseArgs {
    /// Scan store: a SQLite file path or a postgres:// URL.
    /// Jobs are kept in memory when neither this nor the config file sets one.
    #[arg(long = "database", value_name = "PATH|URL", id = "database")]
    pub url: Option<String>,

    /// Keep jobs in memory even if the config file names a database
    #[arg(long = "in-memory", conflicts_with = "database")]
    pub in_memory: bool,
}

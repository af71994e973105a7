// VulnScan - vulnerability scan orchestrator
// Licensed under GPL-3.0

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vulnscan::api::{ApiConfig, ApiServer};
use vulnscan::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging - respect RUST_LOG environment variable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command line arguments
    let args = Args::parse();

    // Handle --config-example (generate config example and exit)
    if let Some(config_path) = &args.api.config_example {
        ApiConfig::create_example(
            config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid file path"))?,
        )?;
        println!("Example configuration saved to: {}", config_path.display());
        return Ok(());
    }

    args.validate()?;
    let config = args.load_config()?;

    info!("Starting VulnScan v{}", env!("CARGO_PKG_VERSION"));
    let server = ApiServer::new(config).await?;
    server.run().await?;

    Ok(())
}

// API State Management

use crate::api::config::ApiConfig;
use crate::db::{self, ScanStore};
use crate::jobs::{ProgressEvent, Scheduler};
use crate::scanner::PipelineSet;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Shared application state
pub struct AppState {
    /// API configuration
    pub config: Arc<ApiConfig>,

    /// Scan scheduler
    pub scheduler: Arc<Scheduler>,

    /// Scan store shared with the scheduler
    pub store: Arc<dyn ScanStore>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ApiConfig, store: Arc<dyn ScanStore>, pipelines: PipelineSet) -> Self {
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            pipelines,
            config.scheduler.clone(),
        ));

        Self {
            config: Arc::new(config),
            scheduler,
            store,
            start_time: Instant::now(),
        }
    }

    /// Open the configured store and build the default scan engine
    pub async fn from_config(config: ApiConfig) -> Result<Self> {
        let store = db::open_store(config.database.as_ref()).await?;
        let pipelines = PipelineSet::default_engine(&config.scanner);
        Ok(Self::new(config, store, pipelines))
    }

    /// Recover jobs left by a previous run, then start the scheduler
    pub async fn start_scheduler(&self) -> Result<()> {
        self.scheduler.recover().await?;
        self.scheduler.spawn();
        Ok(())
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Subscribe to scan progress
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.scheduler.subscribe_progress()
    }
}

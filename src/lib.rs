// VulnScan - vulnerability scan orchestrator
// Licensed under GPL-3.0

//! VulnScan accepts scan requests over a REST API, drives each one through a
//! staged scan pipeline as a cancellable background job, tracks live progress
//! and produces severity-classified reports in JSON, CSV, HTML and PDF.

pub mod api;
pub mod cli;
pub mod db;
pub mod error;
pub mod findings;
pub mod jobs;
pub mod output;
pub mod scanner;
pub mod target;

// Re-export commonly used types
pub use crate::cli::Args;
pub use crate::error::ScanError;
pub use crate::findings::{Finding, Severity};
pub use crate::jobs::{JobStatus, ScanId, ScanJob, ScanMode};
pub use crate::output::ReportFormat;
pub use crate::target::ScanTarget;

/// Result type for VulnScan operations
pub type Result<T, E = ScanError> = std::result::Result<T, E>;

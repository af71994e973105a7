// Error types for VulnScan
//
// Every failure the orchestrator can produce is a variant here. The HTTP layer
// maps each variant onto exactly one status/code pair (see api::models::error).

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for VulnScan operations
#[derive(Debug, Error)]
pub enum ScanError {
    /// The submitted target is not a URL, IP address or CIDR range
    #[error("Invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// Missing or expired identity
    #[error("Authentication required: {0}")]
    Authentication(String),

    /// Unknown scan id, or a scan owned by someone else
    #[error("{0} not found")]
    NotFound(String),

    /// Operation is not valid for the current job state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Requested export format is not supported
    #[error("Unsupported report format '{0}' (expected one of: json, csv, html, pdf)")]
    UnsupportedFormat(String),

    /// Stage-level network or timeout failure; retried by the runner
    #[error("Transient failure in stage '{stage}': {details}")]
    TransientScan { stage: String, details: String },

    /// Scheduler-internal failure; isolated to a single job
    #[error("Scheduler failure: {0}")]
    FatalScheduler(String),

    /// Job exceeded its maximum runtime
    #[error("Scan exceeded maximum runtime of {duration:?}")]
    Timeout { duration: Duration },

    /// Scan queue is at capacity
    #[error("Scan queue is full ({capacity} jobs)")]
    QueueFull { capacity: usize },

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Generic I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl ScanError {
    /// Shorthand for an invalid target
    pub fn invalid_target(target: impl Into<String>, reason: impl Into<String>) -> Self {
        ScanError::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a transient stage failure
    pub fn transient(stage: impl Into<String>, details: impl Into<String>) -> Self {
        ScanError::TransientScan {
            stage: stage.into(),
            details: details.into(),
        }
    }

    /// Whether the runner may retry the failing stage
    pub fn is_transient(&self) -> bool {
        matches!(self, ScanError::TransientScan { .. })
    }
}

impl From<sqlx::Error> for ScanError {
    fn from(err: sqlx::Error) -> Self {
        ScanError::Database(err.to_string())
    }
}

impl From<csv::Error> for ScanError {
    fn from(err: csv::Error) -> Self {
        ScanError::Other(format!("CSV error: {}", err))
    }
}

impl<W> From<csv::IntoInnerError<W>> for ScanError {
    fn from(err: csv::IntoInnerError<W>) -> Self {
        ScanError::Io {
            source: io::Error::new(io::ErrorKind::Other, format!("CSV writer error: {}", err)),
        }
    }
}

impl From<handlebars::RenderError> for ScanError {
    fn from(err: handlebars::RenderError) -> Self {
        ScanError::Other(format!("Template render error: {}", err))
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(err: toml::de::Error) -> Self {
        ScanError::Config {
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ScanError {
    fn from(err: toml::ser::Error) -> Self {
        ScanError::Config {
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ScanError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            ScanError::FatalScheduler(format!("scan task panicked: {}", err))
        } else {
            ScanError::FatalScheduler(format!("scan task aborted: {}", err))
        }
    }
}

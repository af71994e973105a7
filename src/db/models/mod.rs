// Database Models Module
// Row types for the scans and findings tables

pub mod finding;
pub mod scan;

pub use finding::FindingRecord;
pub use scan::ScanJobRecord;

use crate::ScanError;
use chrono::{DateTime, Utc};

/// Stored timestamps are microseconds since the Unix epoch
pub(crate) fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> crate::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| ScanError::Database(format!("timestamp out of range: {}", micros)))
}

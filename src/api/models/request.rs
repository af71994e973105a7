// API Request Models

use crate::db::{HistoryQuery, DEFAULT_HISTORY_LIMIT};
use crate::jobs::{JobStatus, ScanMode};
use serde::{Deserialize, Serialize};

/// Scan request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScanRequest {
    /// URL, IP address or CIDR range
    pub target: String,

    /// Defaults to quick
    #[serde(default)]
    pub mode: ScanMode,
}

/// History query string. Values are kept as raw strings so that unknown
/// filters and malformed numbers fall back to "no filter" and the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub status: Option<String>,
    pub mode: Option<String>,
}

impl HistoryParams {
    pub fn into_query(self, owner: &str) -> HistoryQuery {
        let limit = self
            .limit
            .and_then(|l| l.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_HISTORY_LIMIT);
        let offset = self
            .offset
            .and_then(|o| o.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let mut query = HistoryQuery::for_owner(owner).page(limit, offset);
        if let Some(status) = self.status.and_then(|s| s.parse::<JobStatus>().ok()) {
            query = query.with_status(status);
        }
        if let Some(mode) = self.mode.and_then(|m| m.parse::<ScanMode>().ok()) {
            query = query.with_mode(mode);
        }
        query
    }
}

/// Download query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadParams {
    pub format: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults_to_quick() {
        let req: CreateScanRequest = serde_json::from_str(r#"{"target":"example.com"}"#).unwrap();
        assert_eq!(req.mode, ScanMode::Quick);

        let bad: Result<CreateScanRequest, _> =
            serde_json::from_str(r#"{"target":"example.com","mode":"deep"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_history_params_are_lenient() {
        let params = HistoryParams {
            limit: Some("500".into()),
            offset: Some("abc".into()),
            status: Some("exploded".into()),
            mode: Some("full".into()),
        };
        let query = params.into_query("u");
        assert_eq!(query.limit, 100);
        assert_eq!(query.offset, 0);
        assert_eq!(query.status, None);
        assert_eq!(query.mode, Some(ScanMode::Full));

        let query = HistoryParams::default().into_query("u");
        assert_eq!(query.limit, DEFAULT_HISTORY_LIMIT);
    }
}

// API Models Module

pub mod error;
pub mod request;
pub mod response;

pub use error::{ApiError, ApiErrorResponse};
pub use request::{CreateScanRequest, DownloadParams, HistoryParams};
pub use response::{
    CancelResponse, HealthResponse, HistoryItem, HistoryResponse, ScanCreatedResponse,
    ScanStatusResponse,
};

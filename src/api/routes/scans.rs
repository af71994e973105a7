// Scan Routes

use crate::api::{
    middleware::Identity,
    models::{
        error::ApiError,
        request::{CreateScanRequest, DownloadParams},
        response::{CancelResponse, ScanCreatedResponse, ScanStatusResponse},
    },
    state::AppState,
    ws::scan_websocket_handler,
};
use crate::jobs::{JobStatus, ScanId, ScanJob};
use crate::output::{Report, ReportFormat};
use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Extension, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::info;

/// Load a scan owned by the caller. Unknown ids, malformed ids and other
/// users' scans are all reported as not found.
async fn owned_job(state: &AppState, identity: &Identity, id: &str) -> Result<ScanJob, ApiError> {
    let scan_id = ScanId::parse(id)?;
    state
        .store
        .get_job(Some(&identity.owner), &scan_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Scan {} not found", id)))
}

/// Report of a completed scan; anything else has no report yet
async fn completed_report(state: &AppState, identity: &Identity, id: &str) -> Result<Report, ApiError> {
    let job = owned_job(state, identity, id).await?;
    if job.status != JobStatus::Completed {
        return Err(ApiError::NotFound(format!(
            "Report for scan {} is not available (status: {})",
            id, job.status
        )));
    }

    let findings = state.store.findings(&job.scan_id).await?;
    Ok(Report::build(&job, findings))
}

/// Create a new scan
///
/// Validates the target and queues the scan for the caller
pub async fn create_scan(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<CreateScanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ScanCreatedResponse>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    info!("Creating new scan for target: {}", request.target);

    let job = state
        .scheduler
        .submit(&identity.owner, &request.target, request.mode)
        .await?;

    Ok((StatusCode::CREATED, Json(ScanCreatedResponse::from(&job))))
}

/// Get scan status
pub async fn get_scan_status(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<ScanStatusResponse>, ApiError> {
    let job = owned_job(&state, &identity, &id).await?;
    Ok(Json(ScanStatusResponse::from(&job)))
}

/// Cancel a queued or running scan
pub async fn cancel_scan(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let scan_id = ScanId::parse(&id)?;
    let job = state.scheduler.cancel(&identity.owner, &scan_id).await?;

    Ok(Json(CancelResponse {
        scan_id: job.scan_id,
        status: job.status,
    }))
}

/// Get the report of a completed scan
pub async fn get_scan_report(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Report>, ApiError> {
    Ok(Json(completed_report(&state, &identity, &id).await?))
}

/// Download the report as a file, JSON unless `format` says otherwise
pub async fn download_report(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let format = match params.format.as_deref() {
        Some(raw) => raw.parse::<ReportFormat>()?,
        None => ReportFormat::default(),
    };

    let report = completed_report(&state, &identity, &id).await?;
    let body = format.export(&report)?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        format.file_name(&report.scan_id)
    );

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Delete a finished scan and its findings
pub async fn delete_scan(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let job = owned_job(&state, &identity, &id).await?;
    if !job.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Scan {} is {}; cancel it before deleting",
            id, job.status
        )));
    }

    if !state.store.delete_job(&identity.owner, &job.scan_id).await? {
        return Err(ApiError::NotFound(format!("Scan {} not found", id)));
    }

    info!("Scan {} deleted by {}", job.scan_id, identity.owner);
    Ok(StatusCode::NO_CONTENT)
}

/// WebSocket endpoint for scan progress
pub async fn stream_scan(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    // Verify the scan exists before upgrading
    let job = owned_job(&state, &identity, &id).await?;
    let ws = ws.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    Ok(ws.on_upgrade(move |socket| scan_websocket_handler(socket, job.scan_id, state)))
}

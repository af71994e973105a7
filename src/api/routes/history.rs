// Scan History Routes

use crate::api::{
    middleware::Identity,
    models::{
        error::ApiError,
        request::HistoryParams,
        response::{HistoryItem, HistoryResponse},
    },
    state::AppState,
};
use crate::jobs::JobStatus;
use crate::output::Report;
use axum::{
    extract::{Extension, Query, State},
    Json,
};
use std::sync::Arc;

/// List the caller's scans, newest first
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let query = params.into_query(&identity.owner);
    let jobs = state.store.list_jobs(&query).await?;

    let mut scans = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let summary = if job.status == JobStatus::Completed {
            let findings = state.store.findings(&job.scan_id).await?;
            Some(Report::build(job, findings).summary)
        } else {
            None
        };
        scans.push(HistoryItem::new(job, summary));
    }

    Ok(Json(HistoryResponse { scans }))
}

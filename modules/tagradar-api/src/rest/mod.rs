pub mod analyze;

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::warn;

use tagradar_common::ReportPair;

use crate::AppState;

// --- Envelopes ---

/// `{success: false, message}` with the given status.
pub fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "success": false, "message": message.into() })),
    )
        .into_response()
}

pub fn report_response(report: &ReportPair) -> Response {
    Json(serde_json::json!({ "success": true, "data": report })).into_response()
}

// --- Handlers ---

pub async fn api_reports(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store().list().await {
        Ok(reports) => {
            Json(serde_json::json!({ "success": true, "reports": reports })).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to list reports");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Could not retrieve report list.")
        }
    }
}

pub async fn api_report(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> impl IntoResponse {
    match state.store().get(&report_id).await {
        Ok(report) => report_response(&report),
        Err(e) => {
            warn!(report_id = %report_id, error = %e, "Failed to load report");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Could not load report: {report_id}"),
            )
        }
    }
}

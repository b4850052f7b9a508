use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use tagradar_common::validate_hashtags;

use super::{failure, report_response};
use crate::AppState;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    hashtags: Vec<String>,
}

const HASHTAGS_REQUIRED: &str = "Hashtags are required as an array.";

pub async fn api_analyze(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let hashtags = match body {
        Ok(Json(body)) => body.hashtags,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected analyze body");
            return failure(StatusCode::BAD_REQUEST, HASHTAGS_REQUIRED);
        }
    };

    if let Err(e) = validate_hashtags(&hashtags) {
        return failure(StatusCode::BAD_REQUEST, e.public_message());
    }

    info!(hashtags = ?hashtags, "Analyze requested");
    match state.pipeline.analyze(&hashtags).await {
        Ok(report) => report_response(&report),
        Err(e) => {
            error!(stage = e.stage(), error = %e, "Pipeline failed");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred during analysis.",
            )
        }
    }
}

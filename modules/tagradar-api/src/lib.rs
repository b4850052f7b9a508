use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tagradar_pipeline::{Pipeline, ReportStore};

pub mod rest;

pub struct AppState {
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub fn store(&self) -> &ReportStore {
        self.pipeline.store()
    }
}

/// All routes with their layers. `main` binds this; tests drive it in-process.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // REST API
        .route("/api/reports", get(rest::api_reports))
        .route("/api/report/{report_id}", get(rest::api_report))
        .route("/api/analyze", post(rest::analyze::api_analyze))
        .with_state(state)
        // CORS: the dashboard is served from its own origin
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Logging layer: method + path only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

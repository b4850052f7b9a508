use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tagradar_api::{router, AppState};
use tagradar_common::{Config, LogFormat};
use tagradar_pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let filter = EnvFilter::from_default_env().add_directive("tagradar=info".parse()?);
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    info!("Tag Radar API starting...");
    config.log_summary();

    let pipeline = Pipeline::from_config(&config);
    pipeline.store().ensure_dir().await?;

    let state = Arc::new(AppState::new(pipeline));
    let app = router(state);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("Tag Radar API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

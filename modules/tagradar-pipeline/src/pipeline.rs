use std::ffi::OsString;
use std::io::ErrorKind;

use tagradar_common::{Config, ReportPair};
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, info_span, warn, Instrument};

use crate::error::PipelineFailure;
use crate::runner::{Stage, StageRunner};
use crate::store::ReportStore;
use crate::workspace::{RunContext, WorkspaceManager};

/// Environment variable carrying the run id to both stages.
pub const RUN_ID_ENV: &str = "TAGRADAR_RUN_ID";
/// Environment variable telling the collection stage where to write.
pub const COLLECTION_OUTPUT_ENV: &str = "TAGRADAR_COLLECTION_OUTPUT";

/// Drives collection then analysis for each analyze request, one workspace per run.
pub struct Pipeline {
    runner: StageRunner,
    workspace: WorkspaceManager,
    store: ReportStore,
    collection: Stage,
    analysis: Stage,
    /// Guards collection-exit-through-rename when the collection stage writes a fixed file.
    static_output_lock: Mutex<()>,
    run_slots: Semaphore,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Self {
        Self {
            runner: StageRunner::new(
                &config.scripts_dir,
                config.stage_interpreter.clone(),
                config.stage_timeout,
            ),
            workspace: WorkspaceManager::new(
                &config.scripts_dir,
                config.collection_static_output.clone(),
            ),
            store: ReportStore::new(&config.reports_dir),
            collection: Stage::new("collection", &config.collection_stage),
            analysis: Stage::new("analysis", &config.analysis_stage),
            static_output_lock: Mutex::new(()),
            run_slots: Semaphore::new(config.max_concurrent_runs.max(1)),
        }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Run both stages for `hashtags` and return the finished report.
    ///
    /// Temp artifacts are gone by the time this returns, whatever the outcome.
    pub async fn analyze(&self, hashtags: &[String]) -> Result<ReportPair, PipelineFailure> {
        // Slots are never closed, so acquire only fails if that changes.
        let _slot = self.run_slots.acquire().await.ok();

        let workspace = self.workspace.allocate(hashtags)?;
        let span = info_span!(
            "pipeline_run",
            run_id = %workspace.run_id,
            report_id = %workspace.report_id,
        );

        let result = async {
            info!(hashtags = ?workspace.hashtags, "Starting pipeline");
            self.collect(&workspace).await?;
            self.run_analysis(&workspace).await?;
            let report = self
                .store
                .get_id(&workspace.report_id)
                .await
                .map_err(PipelineFailure::Load)?;
            info!("Pipeline complete");
            Ok::<_, PipelineFailure>(report)
        }
        .instrument(span)
        .await;

        drop(workspace);
        result
    }

    /// Run the collection stage and move its output to the run-scoped path.
    async fn collect(&self, ctx: &RunContext) -> Result<(), PipelineFailure> {
        let envs = [
            (RUN_ID_ENV, OsString::from(&ctx.run_id)),
            (COLLECTION_OUTPUT_ENV, ctx.collection_output.clone().into_os_string()),
        ];

        // A fixed output file is shared by every run; hold the lock until it has been moved.
        let _window = match self.workspace.static_output() {
            Some(_) => Some(self.static_output_lock.lock().await),
            None => None,
        };

        let collected = self
            .runner
            .run_with_env(&self.collection, &ctx.hashtags, &envs)
            .await;
        if let Err(e) = collected {
            if let Some(path) = self.workspace.static_output() {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => info!(path = %path.display(), "Removed leftover collection output"),
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => warn!(
                        path = %path.display(),
                        error = %err,
                        "Failed to remove leftover collection output"
                    ),
                }
            }
            return Err(PipelineFailure::Collection(e));
        }

        tokio::fs::rename(&ctx.collection_output, &ctx.relocated_output)
            .await
            .map_err(|source| PipelineFailure::Relocation {
                from: ctx.collection_output.clone(),
                to: ctx.relocated_output.clone(),
                source,
            })?;
        info!(path = %ctx.relocated_output.display(), "Relocated collection output");
        Ok(())
    }

    /// The analysis stage writes both report files straight to the store.
    async fn run_analysis(&self, ctx: &RunContext) -> Result<(), PipelineFailure> {
        let args = [
            ctx.run_id.clone(),
            self.store.campaign_path(&ctx.report_id).to_string_lossy().into_owned(),
            self.store.user_path(&ctx.report_id).to_string_lossy().into_owned(),
        ];
        let envs = [(RUN_ID_ENV, OsString::from(&ctx.run_id))];

        self.runner
            .run_with_env(&self.analysis, &args, &envs)
            .await
            .map(|_| ())
            .map_err(PipelineFailure::Analysis)
    }
}

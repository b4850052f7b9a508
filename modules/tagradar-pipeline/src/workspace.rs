use std::io::ErrorKind;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use tagradar_common::{validate_hashtags, ReportId, TagRadarError};
use tracing::{info, warn};
use uuid::Uuid;

/// Everything one analyze run owns while it is in flight.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// 32 hex chars, 122 random bits. Namespaces every temp artifact.
    pub run_id: String,
    pub hashtags: Vec<String>,
    pub report_id: ReportId,
    /// Where the collection stage writes. Run-scoped unless a legacy static path is configured.
    pub collection_output: PathBuf,
    /// Run-scoped location the analysis stage reads collection data from.
    pub relocated_output: PathBuf,
    /// Intermediate file the analysis stage writes while preprocessing.
    pub preprocessed_output: PathBuf,
    temp_paths: Vec<PathBuf>,
}

impl RunContext {
    /// Paths deleted when the run ends. Never includes a shared static path.
    pub fn temp_artifact_paths(&self) -> &[PathBuf] {
        &self.temp_paths
    }
}

/// Allocates run ids and the temp paths derived from them.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    workdir: PathBuf,
    static_output: Option<PathBuf>,
}

impl WorkspaceManager {
    pub fn new(workdir: impl Into<PathBuf>, static_output: Option<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            static_output,
        }
    }

    pub fn static_output(&self) -> Option<&Path> {
        self.static_output.as_deref()
    }

    pub fn allocate(&self, hashtags: &[String]) -> Result<RunWorkspace, TagRadarError> {
        self.allocate_on(hashtags, Utc::now().date_naive())
    }

    pub fn allocate_on(
        &self,
        hashtags: &[String],
        date: NaiveDate,
    ) -> Result<RunWorkspace, TagRadarError> {
        validate_hashtags(hashtags)?;
        let report_id = ReportId::for_run(&hashtags[0], date)?;
        let run_id = Uuid::new_v4().simple().to_string();

        let relocated_output = self.workdir.join(format!("scraped_data_{run_id}.json"));
        let preprocessed_output = self
            .workdir
            .join(format!("preprocessed_twitter_data_{run_id}.csv"));
        let mut temp_paths = vec![relocated_output.clone(), preprocessed_output.clone()];

        let collection_output = match &self.static_output {
            Some(path) => path.clone(),
            None => {
                let partial = self.workdir.join(format!("scraped_data_{run_id}.partial.json"));
                temp_paths.push(partial.clone());
                partial
            }
        };

        info!(run_id = %run_id, report_id = %report_id, "Allocated run workspace");

        Ok(RunWorkspace {
            ctx: RunContext {
                run_id,
                hashtags: hashtags.to_vec(),
                report_id,
                collection_output,
                relocated_output,
                preprocessed_output,
                temp_paths,
            },
        })
    }
}

/// Owns a [`RunContext`]; dropping it deletes the run's temp artifacts.
///
/// Release happens exactly once on every exit path, including early returns,
/// panics, and a cancelled request future.
#[derive(Debug)]
pub struct RunWorkspace {
    ctx: RunContext,
}

impl RunWorkspace {
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }
}

impl Deref for RunWorkspace {
    type Target = RunContext;

    fn deref(&self) -> &RunContext {
        &self.ctx
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        cleanup(&self.ctx);
    }
}

/// Delete every temp artifact of `ctx`. Missing files are fine; other failures
/// are logged and the remaining paths are still attempted.
pub fn cleanup(ctx: &RunContext) {
    for path in ctx.temp_artifact_paths() {
        match std::fs::remove_file(path) {
            Ok(()) => info!(run_id = %ctx.run_id, path = %path.display(), "Deleted temp file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                run_id = %ctx.run_id,
                path = %path.display(),
                error = %e,
                "Failed to delete temp file"
            ),
        }
    }
}

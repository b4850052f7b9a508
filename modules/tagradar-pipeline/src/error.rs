use std::path::PathBuf;
use std::time::Duration;

use tagradar_common::TagRadarError;
use thiserror::Error;

/// An external stage did not finish successfully.
#[derive(Error, Debug)]
pub enum StageFailure {
    #[error("failed to launch stage {stage}: {source}")]
    Spawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stage {stage} exited with {}: {}", exit_label(*exit_code), excerpt(stderr))]
    Exit {
        stage: String,
        /// `None` when the process was terminated by a signal.
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("stage {stage} timed out after {}s and was killed", after.as_secs())]
    TimedOut { stage: String, after: Duration },
}

impl StageFailure {
    pub fn stage(&self) -> &str {
        match self {
            StageFailure::Spawn { stage, .. }
            | StageFailure::Exit { stage, .. }
            | StageFailure::TimedOut { stage, .. } => stage,
        }
    }
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

const STDERR_EXCERPT_CHARS: usize = 2000;

/// Tail of stderr; the end of a traceback is the useful part.
fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim_end();
    let count = trimmed.chars().count();
    if count <= STDERR_EXCERPT_CHARS {
        trimmed.to_string()
    } else {
        let tail: String = trimmed.chars().skip(count - STDERR_EXCERPT_CHARS).collect();
        format!("...{tail}")
    }
}

/// A durable report could not be produced or read.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("report {report_id} not found")]
    NotFound { report_id: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Why an analyze run stopped. Logged in full; never shown to API clients.
#[derive(Error, Debug)]
pub enum PipelineFailure {
    #[error("invalid run input: {0}")]
    Validation(#[from] TagRadarError),

    #[error("collection stage failed: {0}")]
    Collection(#[source] StageFailure),

    #[error(
        "could not relocate collection output {} to {}: {source}",
        from.display(),
        to.display()
    )]
    Relocation {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("analysis stage failed: {0}")]
    Analysis(#[source] StageFailure),

    #[error("could not load finished report: {0}")]
    Load(#[source] ReportError),
}

impl PipelineFailure {
    /// Name of the step that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineFailure::Validation(_) => "validation",
            PipelineFailure::Collection(_) => "collection",
            PipelineFailure::Relocation { .. } => "relocation",
            PipelineFailure::Analysis(_) => "analysis",
            PipelineFailure::Load(_) => "load",
        }
    }
}

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::error::TagRadarError;

/// File name the stock collection stage writes in its working directory.
pub const DEFAULT_STATIC_OUTPUT: &str = "scraped_data.json";

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Web server
    pub api_host: String,
    pub api_port: u16,

    // Filesystem layout
    pub scripts_dir: PathBuf,
    pub reports_dir: PathBuf,

    // Stages
    pub collection_stage: PathBuf,
    pub analysis_stage: PathBuf,
    /// Program used to launch stage scripts. `None` executes the stage path directly.
    pub stage_interpreter: Option<String>,
    /// Fixed file written by the collection stage. `None` means the stage
    /// writes to the per-run path it is handed.
    pub collection_static_output: Option<PathBuf>,
    pub stage_timeout: Duration,
    pub max_concurrent_runs: usize,

    pub log_format: LogFormat,
}

impl Config {
    /// Defaults rooted at `scripts_dir`, matching the layout the stage scripts expect.
    pub fn local(scripts_dir: impl Into<PathBuf>) -> Self {
        let scripts_dir = scripts_dir.into();
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 5001,
            reports_dir: scripts_dir.join("reports"),
            collection_stage: scripts_dir.join("x_Scarper.py"),
            analysis_stage: scripts_dir.join("process_and_analyze.py"),
            stage_interpreter: Some("python".to_string()),
            // The stock scraper always writes here, ignoring any per-run path.
            collection_static_output: Some(scripts_dir.join(DEFAULT_STATIC_OUTPUT)),
            stage_timeout: Duration::from_secs(900),
            max_concurrent_runs: 2,
            log_format: LogFormat::Text,
            scripts_dir,
        }
    }

    /// Load configuration from environment variables.
    /// Relative paths are resolved against `SCRIPTS_DIR`.
    pub fn from_env() -> Result<Self, TagRadarError> {
        let scripts_dir =
            PathBuf::from(env::var("SCRIPTS_DIR").unwrap_or_else(|_| ".".to_string()));
        let mut config = Self::local(scripts_dir);

        if let Ok(host) = env::var("API_HOST") {
            config.api_host = host;
        }
        if let Ok(port) = env::var("API_PORT") {
            config.api_port = parse_number("API_PORT", &port)?;
        }
        if let Ok(dir) = env::var("REPORTS_DIR") {
            config.reports_dir = resolve(&config.scripts_dir, &dir);
        }
        if let Ok(stage) = env::var("COLLECTION_STAGE") {
            config.collection_stage = resolve(&config.scripts_dir, &stage);
        }
        if let Ok(stage) = env::var("ANALYSIS_STAGE") {
            config.analysis_stage = resolve(&config.scripts_dir, &stage);
        }
        if let Ok(interpreter) = env::var("STAGE_INTERPRETER") {
            config.stage_interpreter = Some(interpreter).filter(|i| !i.trim().is_empty());
        }
        if let Ok(path) = env::var("COLLECTION_STATIC_OUTPUT") {
            if !path.trim().is_empty() {
                config.collection_static_output = Some(resolve(&config.scripts_dir, &path));
            }
        }
        if let Ok(mode) = env::var("COLLECTION_OUTPUT_MODE") {
            if run_scoped_output(&mode)? {
                config.collection_static_output = None;
            }
        }
        if let Ok(secs) = env::var("STAGE_TIMEOUT_SECS") {
            config.stage_timeout = Duration::from_secs(parse_number("STAGE_TIMEOUT_SECS", &secs)?);
        }
        if let Ok(max) = env::var("MAX_CONCURRENT_RUNS") {
            config.max_concurrent_runs = parse_number("MAX_CONCURRENT_RUNS", &max)?;
            if config.max_concurrent_runs == 0 {
                return Err(TagRadarError::Config(
                    "MAX_CONCURRENT_RUNS must be at least 1".to_string(),
                ));
            }
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            config.log_format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" | "" => LogFormat::Text,
                other => {
                    return Err(TagRadarError::Config(format!(
                        "LOG_FORMAT must be `text` or `json`, got `{other}`"
                    )))
                }
            };
        }

        Ok(config)
    }

    /// Log the effective configuration. Nothing here is secret.
    pub fn log_summary(&self) {
        info!(
            scripts_dir = %self.scripts_dir.display(),
            reports_dir = %self.reports_dir.display(),
            collection_stage = %self.collection_stage.display(),
            analysis_stage = %self.analysis_stage.display(),
            interpreter = self.stage_interpreter.as_deref().unwrap_or("<direct>"),
            static_output = ?self.collection_static_output,
            stage_timeout_secs = self.stage_timeout.as_secs(),
            max_concurrent_runs = self.max_concurrent_runs,
            "Loaded configuration"
        );
    }
}

fn resolve(base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// `run` hands the collection stage a per-run output path; `static` keeps the fixed file.
fn run_scoped_output(mode: &str) -> Result<bool, TagRadarError> {
    match mode.trim().to_ascii_lowercase().as_str() {
        "run" => Ok(true),
        "static" | "" => Ok(false),
        other => Err(TagRadarError::Config(format!(
            "COLLECTION_OUTPUT_MODE must be `static` or `run`, got `{other}`"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, TagRadarError> {
    value
        .trim()
        .parse()
        .map_err(|_| TagRadarError::Config(format!("{key} must be a number, got `{value}`")))
}

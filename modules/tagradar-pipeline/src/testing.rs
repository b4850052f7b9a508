// Stub stages for exercising the pipeline without Python.
//
// Stubs are `sh` scripts in a temp dir that doubles as the scripts dir.
// Every stub appends its argv to `<stage>.calls` so tests can count
// invocations, including asserting a stage never ran.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tagradar_common::{Config, DEFAULT_STATIC_OUTPUT};
use tempfile::TempDir;

use crate::pipeline::Pipeline;

/// Collection stub: records its pid in `collection.pid`, writes two records
/// stamped with its run id to the path it is handed, then lingers for
/// `linger` (a `sleep` operand) before exiting.
pub fn collect_script(linger: &str) -> String {
    format!(
        r#"echo "$@" >> collection.calls
echo $$ > collection.pid
echo "collecting $# hashtags"
id="$TAGRADAR_RUN_ID"
printf '[{{"run_id":"%s","content":"a"}},{{"run_id":"%s","content":"b"}}]' "$id" "$id" \
  > "$TAGRADAR_COLLECTION_OUTPUT"
sleep {linger}
"#
    )
}

/// Collection stub for the stock scraper contract: ignores the per-run
/// environment and always writes `scraped_data.json` in its working directory.
pub const FIXED_FILE_COLLECT_SCRIPT: &str = r#"echo "$@" >> collection.calls
printf '[{"content":"%s"}]' "$1" > scraped_data.json
"#;

/// Analysis stub: refuses collection data stamped with another run's id,
/// then writes a 2-row campaign report and a 1-row user report.
pub const ANALYZE_SCRIPT: &str = r#"echo "$@" >> analysis.calls
data=$(cat "scraped_data_$1.json") || exit 2
case "$data" in
  *"$1"*) ;;
  *'"run_id"'*) echo "foreign collection data for $1" >&2; exit 3 ;;
esac
printf 'username,sentiment_score\n' > "preprocessed_twitter_data_$1.csv"
{
  echo 'username,cleaned_content,comments,reposts,suspicion_score'
  echo 'alice,"hello, ""world""",1,2,4.5'
  echo 'bob,plain,0,30,3'
} > "$2"
printf 'username,total_suspicion_score\nalice,4.5\n' > "$3"
"#;

/// Stage stub that records the call, complains on stderr and exits 1.
pub fn failing_script(stage: &str) -> String {
    format!("echo \"$@\" >> {stage}.calls\necho 'stage blew up' >&2\nexit 1\n")
}

/// Collection stub that exits 0 without writing anything.
pub const SILENT_COLLECT_SCRIPT: &str = "echo \"$@\" >> collection.calls\n";

pub struct StubEnv {
    pub dir: TempDir,
    pub config: Config,
}

impl StubEnv {
    /// Working stubs for both stages, run-scoped collection output.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp scripts dir");
        let mut config = Config::local(dir.path());
        config.collection_stage = dir.path().join("collect.sh");
        config.analysis_stage = dir.path().join("analyze.sh");
        config.stage_interpreter = Some("sh".to_string());
        config.collection_static_output = None;
        config.stage_timeout = Duration::from_secs(30);
        config.max_concurrent_runs = 4;
        std::fs::create_dir_all(&config.reports_dir).expect("create reports dir");

        let env = Self { dir, config };
        env.write_collection(&collect_script("0"));
        env.write_analysis(ANALYZE_SCRIPT);
        env
    }

    /// Stubs installed under the stock stage file names, with every other
    /// `Config::local` default untouched apart from the `sh` interpreter.
    pub fn with_default_layout() -> Self {
        let dir = tempfile::tempdir().expect("create temp scripts dir");
        let mut config = Config::local(dir.path());
        config.stage_interpreter = Some("sh".to_string());
        std::fs::create_dir_all(&config.reports_dir).expect("create reports dir");

        let env = Self { dir, config };
        env.write_collection(FIXED_FILE_COLLECT_SCRIPT);
        env.write_analysis(ANALYZE_SCRIPT);
        env
    }

    /// Pid of the most recent collection stub that reached its first line.
    pub fn collection_pid(&self) -> Option<u32> {
        std::fs::read_to_string(self.dir.path().join("collection.pid"))
            .ok()
            .and_then(|pid| pid.trim().parse().ok())
    }

    /// Switch to a legacy collection stage writing a fixed `scraped_data.json`.
    pub fn with_static_output(mut self) -> Self {
        self.config.collection_static_output = Some(self.dir.path().join(DEFAULT_STATIC_OUTPUT));
        self
    }

    pub fn write_collection(&self, body: &str) {
        std::fs::write(&self.config.collection_stage, body).expect("write collection stub");
    }

    pub fn write_analysis(&self, body: &str) {
        std::fs::write(&self.config.analysis_stage, body).expect("write analysis stub");
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::from_config(&self.config)
    }

    pub fn scripts_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Number of times `stage` ("collection" or "analysis") was launched.
    pub fn invocations(&self, stage: &str) -> usize {
        std::fs::read_to_string(self.dir.path().join(format!("{stage}.calls")))
            .map(|calls| calls.lines().count())
            .unwrap_or(0)
    }

    /// Run-scoped temp artifacts still present in the scripts dir.
    pub fn leftover_temp_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.dir.path())
            .expect("read scripts dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                name.starts_with("scraped_data_") || name.starts_with("preprocessed_twitter_data_")
            })
            .collect()
    }
}

impl Default for StubEnv {
    fn default() -> Self {
        Self::new()
    }
}

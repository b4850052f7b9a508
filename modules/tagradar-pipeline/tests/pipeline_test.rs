//! End-to-end runs of the pipeline against `sh` stub stages.
//!
//! Stubs live in a temp scripts dir (see `tagradar_pipeline::testing`). The
//! analysis stub exits 3 when the collection data it is handed was stamped
//! with a different run id, so a successful run proves isolation.

use std::time::Duration;

use chrono::Utc;
use tagradar_pipeline::testing::{
    collect_script, failing_script, StubEnv, SILENT_COLLECT_SCRIPT,
};
use tagradar_pipeline::{PipelineFailure, StageFailure};

fn tags(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

/// True while `pid` names a process that has not exited. Zombies count as gone.
fn process_running(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_run_returns_report_and_leaves_no_temp_files() {
    let env = StubEnv::new();
    let pipeline = env.pipeline();

    let report = pipeline.analyze(&tags(&["#test", "#other"])).await.unwrap();

    assert_eq!(report.campaign_report.len(), 2);
    assert_eq!(report.user_report.len(), 1);
    assert_eq!(report.campaign_report[0].get("cleaned_content"), Some("hello, \"world\""));
    assert_eq!(report.user_report[0].get("username"), Some("alice"));

    assert!(env.leftover_temp_files().is_empty(), "{:?}", env.leftover_temp_files());
    assert_eq!(env.invocations("collection"), 1);
    assert_eq!(env.invocations("analysis"), 1);
}

#[tokio::test]
async fn hashtags_reach_collection_verbatim_in_order() {
    let env = StubEnv::new();
    env.pipeline().analyze(&tags(&["#b", "a c", "#z"])).await.unwrap();

    let calls = std::fs::read_to_string(env.scripts_dir().join("collection.calls")).unwrap();
    assert_eq!(calls.trim_end(), "#b a c #z");
}

#[tokio::test]
async fn stock_fixed_file_scraper_works_with_default_config() {
    let env = StubEnv::with_default_layout();
    let pipeline = env.pipeline();

    let report = pipeline.analyze(&tags(&["#stock"])).await.unwrap();

    assert_eq!(report.campaign_report.len(), 2);
    assert_eq!(report.user_report.len(), 1);
    assert!(!env.scripts_dir().join("scraped_data.json").exists());
    assert!(env.leftover_temp_files().is_empty(), "{:?}", env.leftover_temp_files());

    // The shared file is free again for the next run.
    pipeline.analyze(&tags(&["#stock"])).await.unwrap();
    assert_eq!(env.invocations("collection"), 2);
}

#[tokio::test]
async fn report_lands_in_store_under_derived_id() {
    let env = StubEnv::new();
    let pipeline = env.pipeline();
    pipeline.analyze(&tags(&["#Vote"])).await.unwrap();

    let id = format!("Vote_{}", today());
    let reports = pipeline.store().list().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].id.as_str(), id);

    let fetched = pipeline.store().get(&id).await.unwrap();
    assert_eq!(fetched.campaign_report.len(), 2);
    assert_eq!(fetched.user_report.len(), 1);
}

#[tokio::test]
async fn same_day_rerun_overwrites_report() {
    let env = StubEnv::new();
    let pipeline = env.pipeline();
    pipeline.analyze(&tags(&["#again"])).await.unwrap();
    pipeline.analyze(&tags(&["#again"])).await.unwrap();

    let reports = pipeline.store().list().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(env.invocations("analysis"), 2);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn collection_failure_skips_analysis_and_cleans_up() {
    let env = StubEnv::new();
    env.write_collection(&failing_script("collection"));

    let err = env.pipeline().analyze(&tags(&["#x"])).await.unwrap_err();

    match err {
        PipelineFailure::Collection(StageFailure::Exit { exit_code, stderr, .. }) => {
            assert_eq!(exit_code, Some(1));
            assert!(stderr.contains("stage blew up"));
        }
        other => panic!("expected collection failure, got {other:?}"),
    }
    assert_eq!(env.invocations("analysis"), 0);
    assert!(env.leftover_temp_files().is_empty());
}

#[tokio::test]
async fn missing_collection_output_is_relocation_failure() {
    let env = StubEnv::new();
    env.write_collection(SILENT_COLLECT_SCRIPT);

    let err = env.pipeline().analyze(&tags(&["#x"])).await.unwrap_err();

    assert_eq!(err.stage(), "relocation");
    assert_eq!(env.invocations("analysis"), 0);
    assert!(env.leftover_temp_files().is_empty());
}

#[tokio::test]
async fn analysis_failure_cleans_up() {
    let env = StubEnv::new();
    env.write_analysis(&failing_script("analysis"));

    let err = env.pipeline().analyze(&tags(&["#x"])).await.unwrap_err();

    assert!(matches!(err, PipelineFailure::Analysis(_)));
    assert_eq!(env.invocations("collection"), 1);
    assert!(env.leftover_temp_files().is_empty());
}

#[tokio::test]
async fn analysis_that_writes_nothing_is_load_failure() {
    let env = StubEnv::new();
    env.write_analysis("exit 0\n");

    let err = env.pipeline().analyze(&tags(&["#x"])).await.unwrap_err();
    assert_eq!(err.stage(), "load");
    assert!(env.leftover_temp_files().is_empty());
}

#[tokio::test]
async fn stage_timeout_is_failure_and_cleans_up() {
    let mut env = StubEnv::new();
    env.config.stage_timeout = Duration::from_secs(1);
    env.write_collection(&collect_script("10"));

    let err = env.pipeline().analyze(&tags(&["#slow"])).await.unwrap_err();

    assert!(matches!(err, PipelineFailure::Collection(StageFailure::TimedOut { .. })));
    assert!(env.leftover_temp_files().is_empty());
}

#[tokio::test]
async fn dropped_run_kills_stage_and_cleans_up() {
    let env = StubEnv::new();
    env.write_collection(&collect_script("10"));
    let pipeline = env.pipeline();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(800), pipeline.analyze(&tags(&["#gone"]))).await;
    assert!(cancelled.is_err(), "run finished before it could be dropped");

    assert!(env.leftover_temp_files().is_empty(), "{:?}", env.leftover_temp_files());
    let pid = env.collection_pid().expect("collection stub started");
    let mut running = process_running(pid);
    for _ in 0..40 {
        if !running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        running = process_running(pid);
    }
    assert!(!running, "collection stage {pid} outlived its run");
    assert_eq!(env.invocations("analysis"), 0);
}

#[tokio::test]
async fn dropped_static_run_releases_the_shared_file() {
    let env = StubEnv::new().with_static_output();
    env.write_collection(&collect_script("10"));
    let pipeline = env.pipeline();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(800), pipeline.analyze(&tags(&["#gone"]))).await;
    assert!(cancelled.is_err());

    env.write_collection(&collect_script("0"));
    pipeline.analyze(&tags(&["#next"])).await.unwrap();
    assert!(env.leftover_temp_files().is_empty());
}

#[tokio::test]
async fn invalid_input_launches_nothing() {
    let env = StubEnv::new();
    let pipeline = env.pipeline();

    assert!(matches!(pipeline.analyze(&[]).await, Err(PipelineFailure::Validation(_))));
    assert!(matches!(pipeline.analyze(&tags(&["  "])).await, Err(PipelineFailure::Validation(_))));
    assert_eq!(env.invocations("collection"), 0);
}

// ---------------------------------------------------------------------------
// Isolation between concurrent runs
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_see_only_their_own_collection_data() {
    let env = StubEnv::new();
    env.write_collection(&collect_script("0.3"));
    let pipeline = env.pipeline();

    let first = tags(&["#alpha"]);
    let second = tags(&["#beta"]);
    let (a, b) = tokio::join!(pipeline.analyze(&first), pipeline.analyze(&second));

    assert!(a.is_ok(), "{a:?}");
    assert!(b.is_ok(), "{b:?}");
    assert_eq!(env.invocations("analysis"), 2);
    assert!(env.leftover_temp_files().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn static_output_window_is_serialized() {
    // The stub writes the shared file, then lingers before exiting. Without
    // the lock the second run would overwrite it before the first renames it.
    let env = StubEnv::new().with_static_output();
    env.write_collection(&collect_script("0.3"));
    let pipeline = env.pipeline();

    let first = tags(&["#alpha"]);
    let second = tags(&["#beta"]);
    let third = tags(&["#gamma"]);
    let (a, b, c) = tokio::join!(
        pipeline.analyze(&first),
        pipeline.analyze(&second),
        pipeline.analyze(&third)
    );

    assert!(a.is_ok(), "{a:?}");
    assert!(b.is_ok(), "{b:?}");
    assert!(c.is_ok(), "{c:?}");
    assert!(!env.scripts_dir().join("scraped_data.json").exists());
    assert!(env.leftover_temp_files().is_empty());
}

#[tokio::test]
async fn static_output_left_by_failed_collection_is_removed() {
    let env = StubEnv::new().with_static_output();
    env.write_collection("echo '[]' > \"$TAGRADAR_COLLECTION_OUTPUT\"\nexit 4\n");

    let err = env.pipeline().analyze(&tags(&["#x"])).await.unwrap_err();

    assert!(matches!(err, PipelineFailure::Collection(_)));
    assert!(!env.scripts_dir().join("scraped_data.json").exists());
}

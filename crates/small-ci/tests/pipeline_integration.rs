//! Integration tests for the CI pipeline with an in-memory run log.

use small_ci::{
    CiConfig, CiGate, JobConfig, JobEventKind, Pipeline, PipelineOptions, PipelineSpec, RunLog,
    RunReport,
};
use std::sync::Arc;
use tempfile::TempDir;

fn job(name: &str, commands: &[&str]) -> JobConfig {
    JobConfig::custom(
        name.to_string(),
        commands.iter().map(|c| c.to_string()).collect(),
        60,
    )
}

fn spec_for(dir: &TempDir, jobs: &[JobConfig]) -> PipelineSpec {
    PipelineSpec::new(
        dir.path().to_path_buf(),
        jobs,
        "abc123".to_string(),
        "stable-x86_64-unknown-linux-gnu".to_string(),
    )
}

/// Test: successful pipeline execution (both jobs pass)
#[tokio::test]
async fn test_successful_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RunLog::new());

    let jobs = vec![job("echo_test", &["echo hello"]), job("echo_test2", &["echo world"])];
    let spec = spec_for(&dir, &jobs);

    let result = Pipeline::run(log.clone(), &spec, jobs, PipelineOptions::default())
        .await
        .expect("pipeline failed");

    assert!(result.success, "Pipeline should succeed");
    assert_eq!(result.passed_count(), 2, "Both jobs should pass");
    assert_eq!(result.failed_count(), 0, "No jobs should fail");
    assert_eq!(result.run_id, log.run_id(), "Run ID should match the log");
    assert_eq!(result.spec_digest, spec.spec_digest());

    let events = log.events().await;
    assert_eq!(events.len(), 4, "Should have 4 events (2 started + 2 succeeded)");
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);
    assert_eq!(events[0].kind, JobEventKind::JobStarted);
    assert_eq!(events[1].kind, JobEventKind::JobSucceeded);
    assert_eq!(events[1].job_name, "echo_test");
}

/// Test: failed job captured with error info
#[tokio::test]
async fn test_failed_job_captured() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RunLog::new());

    let jobs = vec![job("false_test", &["false"])];
    let spec = spec_for(&dir, &jobs);

    let result = Pipeline::run(log.clone(), &spec, jobs, PipelineOptions::default())
        .await
        .expect("pipeline failed");

    assert!(!result.success, "Pipeline should fail");
    assert_eq!(result.passed_count(), 0, "No jobs should pass");
    assert_eq!(result.failed_count(), 1, "One job should fail");
    assert_eq!(result.jobs[0].failed_command.as_deref(), Some("false"));

    let events = log.events().await;
    let failed = events
        .iter()
        .find(|e| e.kind == JobEventKind::JobFailed)
        .expect("Should have job_failed event");
    assert_eq!(failed.payload["exit_code"].as_i64(), Some(1));
    assert_eq!(failed.payload["error"], "'false' exited with code 1");
}

/// Test: later jobs still run after a failure
#[tokio::test]
async fn test_failure_does_not_stop_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RunLog::new());

    let jobs = vec![job("first", &["exit 2"]), job("second", &["echo ran"])];
    let spec = spec_for(&dir, &jobs);

    let result = Pipeline::run(log.clone(), &spec, jobs, PipelineOptions::default())
        .await
        .expect("pipeline failed");

    assert!(!result.success);
    assert_eq!(result.jobs.len(), 2);
    assert!(result.jobs[1].passed());
    assert!(result.jobs[1].stdout.contains("ran"));
}

/// Test: gate evaluation detects failures
#[tokio::test]
async fn test_gate_evaluation_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RunLog::new());

    let jobs = vec![job("fail_test", &["false"])];
    let spec = spec_for(&dir, &jobs);

    Pipeline::run(log.clone(), &spec, jobs, PipelineOptions::default())
        .await
        .expect("pipeline failed");

    let verdict = CiGate::evaluate(&log.events().await);
    assert!(!verdict.passed, "Gate should fail for failed jobs");
    assert!(!verdict.violations.is_empty(), "Should have violations");
}

/// Test: allowed failure keeps both the pipeline and the gate green
#[tokio::test]
async fn test_allowed_failure_passes() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RunLog::new());

    let jobs = vec![
        job("required", &["true"]),
        job("optional", &["false"]).allowing_failure(),
    ];
    let spec = spec_for(&dir, &jobs);

    let result = Pipeline::run(log.clone(), &spec, jobs, PipelineOptions::default())
        .await
        .expect("pipeline failed");

    assert!(result.success, "Allowed failure should not fail the pipeline");
    assert_eq!(result.failed_count(), 1);
    assert_eq!(result.blocking_failures().count(), 0);

    let verdict = CiGate::evaluate(&log.events().await);
    assert!(verdict.passed);
    assert_eq!(verdict.warnings.len(), 1);
}

/// Test: disabled job is skipped
#[tokio::test]
async fn test_disabled_job_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RunLog::new());

    let jobs = vec![
        job("echo_test", &["echo hello"]),
        job("skip_me", &["false"]).disabled(),
    ];
    let spec = spec_for(&dir, &jobs);

    let result = Pipeline::run(log.clone(), &spec, jobs, PipelineOptions::default())
        .await
        .expect("pipeline failed");

    assert!(result.success, "Pipeline should succeed (disabled job not run)");
    assert_eq!(result.jobs.len(), 1, "Only one job should be executed");
    assert_eq!(log.len().await, 2, "Should have 2 events (disabled job not run)");
}

/// Test: job execution error (timeout) is recorded as job_failed and pipeline continues
#[tokio::test]
async fn test_execution_error_recorded_as_job_failed() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RunLog::new());

    let jobs = vec![
        JobConfig::custom("slow".to_string(), vec!["sleep 5".to_string()], 1),
        job("after", &["true"]),
    ];
    let spec = spec_for(&dir, &jobs);

    let result = Pipeline::run(log.clone(), &spec, jobs, PipelineOptions::default())
        .await
        .expect("pipeline run should not fail");

    assert!(!result.success, "Pipeline should report failure");
    let slow = &result.jobs[0];
    assert_eq!(slow.exit_code, -1, "Execution error should use exit_code -1");
    assert!(slow.stderr.contains("timed out"));
    assert!(result.jobs[1].passed());

    let events = log.events().await;
    assert_eq!(events.len(), 4);
    assert_eq!(events[1].kind, JobEventKind::JobFailed);
    assert_eq!(
        events[1].payload["exit_code"].as_i64(),
        Some(-1),
        "job_failed event should have exit_code -1"
    );
}

/// Test: parallel mode keeps result order and records every job
#[tokio::test]
async fn test_parallel_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RunLog::new());

    let jobs = vec![
        job("a", &["sleep 0.2", "echo a"]),
        job("b", &["echo b"]),
        job("c", &["echo c"]),
    ];
    let spec = spec_for(&dir, &jobs);

    let result = Pipeline::run(log.clone(), &spec, jobs, PipelineOptions { parallel: true })
        .await
        .expect("pipeline failed");

    assert!(result.success);
    let names: Vec<&str> = result.jobs.iter().map(|j| j.job_name.as_str()).collect();
    assert_eq!(names, ["a", "b", "c"]);

    let events = log.events().await;
    assert_eq!(events.len(), 6);
    let mut seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=6).collect::<Vec<_>>());
    assert!(CiGate::evaluate(&events).passed);
}

/// Test: a YAML-defined job sees its variables and cache directories
#[tokio::test]
async fn test_yaml_job_runs_with_variables() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RunLog::new());

    let config = CiConfig::from_yaml(
        r#"
variables:
  CARGO_HOME: $CI_PROJECT_DIR/cargo

check:
  cache:
    paths:
      - cargo/
  script:
    - test -d "$CARGO_HOME"
    - echo "job $CI_JOB_NAME"
"#,
    )
    .expect("parse failed");
    let jobs = config.select(&[]).unwrap();
    let spec = spec_for(&dir, &jobs);

    let result = Pipeline::run(log.clone(), &spec, jobs, PipelineOptions::default())
        .await
        .expect("pipeline failed");

    assert!(result.success, "stderr: {}", result.jobs[0].stderr);
    assert!(result.jobs[0].stdout.contains("job check"));
}

/// Test: a report written after a run reads back with the same verdict
#[tokio::test]
async fn test_report_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RunLog::new());

    let jobs = vec![job("ok", &["true"]), job("broken", &["false"])];
    let spec = spec_for(&dir, &jobs);

    let result = Pipeline::run(log.clone(), &spec, jobs, PipelineOptions::default())
        .await
        .expect("pipeline failed");

    let report = RunReport::new(spec.clone(), result, log.events().await);
    let path = dir.path().join("ci-report.json");
    report.write_to(&path).expect("write failed");

    let loaded = RunReport::read_from(&path).expect("read failed");
    assert_eq!(loaded.spec, spec);
    assert!(!loaded.verdict.passed);
    assert_eq!(loaded.events.len(), 4);
    assert_eq!(loaded.result.run_id, log.run_id());
}

/// Test: the workspace's own .gitlab-ci.yml is the built-in matrix
#[test]
fn test_workspace_ci_file_matches_builtin() {
    let config = CiConfig::from_yaml(include_str!("../../../.gitlab-ci.yml"))
        .expect("workspace .gitlab-ci.yml should parse");
    assert_eq!(config, CiConfig::builtin());
}

/// Test: jobs marked `when: manual` or `when: never` are parsed but not run
#[tokio::test]
async fn test_manual_yaml_jobs_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RunLog::new());

    let config = CiConfig::from_yaml(
        r#"
check:
  script: ["true"]
  timeout: 60
publish:
  script: ["false"]
  when: manual
cleanup:
  script: ["false"]
  when: never
"#,
    )
    .expect("parse failed");
    let jobs = config.select(&[]).unwrap();
    assert_eq!(jobs.len(), 3);
    let spec = spec_for(&dir, &jobs);

    let result = Pipeline::run(log.clone(), &spec, jobs, PipelineOptions::default())
        .await
        .expect("pipeline failed");

    assert!(result.success);
    let names: Vec<&str> = result.jobs.iter().map(|j| j.job_name.as_str()).collect();
    assert_eq!(names, ["check"]);
    assert_eq!(log.len().await, 2);
}

//! CI pipeline orchestration and run recording.

use crate::job::JobConfig;
use crate::log::{JobEventKind, RunLog};
use crate::runner::{JobResult, JobRunner};
use crate::spec::PipelineSpec;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// How the pipeline schedules its jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Run jobs concurrently instead of one after another.
    pub parallel: bool,
}

/// Result of a complete CI pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Run ID of the event log.
    pub run_id: String,

    /// Whether every job passed or was allowed to fail.
    pub success: bool,

    /// Results of individual jobs, in configuration order.
    pub jobs: Vec<JobResult>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Digest of the pipeline specification.
    pub spec_digest: String,

    pub started_at: DateTime<Utc>,
}

impl PipelineResult {
    /// Number of jobs that passed.
    pub fn passed_count(&self) -> usize {
        self.jobs.iter().filter(|j| j.passed()).count()
    }

    /// Number of jobs that failed, allowed or not.
    pub fn failed_count(&self) -> usize {
        self.jobs.iter().filter(|j| !j.passed()).count()
    }

    /// Jobs whose failure fails the pipeline.
    pub fn blocking_failures(&self) -> impl Iterator<Item = &JobResult> {
        self.jobs.iter().filter(|j| !j.acceptable())
    }
}

/// CI pipeline orchestrator.
pub struct Pipeline;

impl Pipeline {
    /// Execute a CI pipeline and record all events into `log`.
    ///
    /// Each enabled job produces:
    /// - One `job_started` event on start
    /// - One `job_succeeded` event on success or `job_failed` event on failure
    ///
    /// Spawn errors and timeouts are recorded as failures and do not stop
    /// the remaining jobs.
    pub async fn run(
        log: Arc<RunLog>,
        spec: &PipelineSpec,
        jobs: Vec<JobConfig>,
        options: PipelineOptions,
    ) -> anyhow::Result<PipelineResult> {
        let start = Instant::now();
        let started_at = Utc::now();
        let spec_digest = spec.spec_digest();
        let run_id = log.run_id().to_string();
        let workspace = spec.workspace_path.as_path();

        info!(
            run_id = %run_id,
            spec_digest = %&spec_digest[..12],
            parallel = options.parallel,
            "Starting CI pipeline"
        );

        let mut enabled = Vec::new();
        for job in &jobs {
            if job.enabled {
                enabled.push(job);
            } else {
                info!(job = %job.name, "Skipping disabled job");
            }
        }

        let job_results = if options.parallel {
            join_all(enabled.iter().map(|job| Self::run_job(&log, job, workspace))).await
        } else {
            let mut results = Vec::with_capacity(enabled.len());
            for job in &enabled {
                results.push(Self::run_job(&log, job, workspace).await);
            }
            results
        };

        let success = job_results.iter().all(JobResult::acceptable);
        let duration_ms = start.elapsed().as_millis() as u64;

        if success {
            info!(run_id = %run_id, duration_ms, "CI pipeline completed successfully");
        } else {
            info!(run_id = %run_id, duration_ms, "CI pipeline failed");
        }

        Ok(PipelineResult {
            run_id,
            success,
            jobs: job_results,
            duration_ms,
            spec_digest,
            started_at,
        })
    }

    /// Run one job, recording its start and outcome.
    async fn run_job(log: &RunLog, job: &JobConfig, workspace: &Path) -> JobResult {
        info!(job = %job.name, "Executing job");

        log.record(
            JobEventKind::JobStarted,
            &job.name,
            json!({
                "image": &job.image,
                "commands": job.commands().collect::<Vec<_>>(),
                "timeout_secs": job.timeout_secs,
                "allow_failure": job.allow_failure,
            }),
        )
        .await;

        let job_start = Instant::now();
        let result = match JobRunner::execute(job, workspace).await {
            Ok(result) => result,
            Err(e) => {
                // Job execution itself failed (e.g. timeout, spawn error).
                JobResult {
                    job_name: job.name.clone(),
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    duration_ms: job_start.elapsed().as_millis() as u64,
                    success: false,
                    failed_command: None,
                    allow_failure: job.allow_failure,
                }
            }
        };

        if result.passed() {
            log.record(
                JobEventKind::JobSucceeded,
                &job.name,
                json!({
                    "exit_code": result.exit_code,
                    "duration_ms": result.duration_ms,
                }),
            )
            .await;
        } else {
            let error = match &result.failed_command {
                Some(command) => format!("'{}' exited with code {}", command, result.exit_code),
                None => format!("execution error: {}", result.stderr),
            };
            log.record(
                JobEventKind::JobFailed,
                &job.name,
                json!({
                    "exit_code": result.exit_code,
                    "stderr": &result.stderr,
                    "duration_ms": result.duration_ms,
                    "error": error,
                }),
            )
            .await;
        }

        result
    }
}

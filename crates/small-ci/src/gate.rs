//! CI gate evaluation for pass/fail criteria.

use crate::log::{JobEvent, JobEventKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateVerdict {
    /// Whether the gate passed.
    pub passed: bool,

    /// Violations that caused failure (empty if passed).
    pub violations: Vec<String>,

    /// Failures of jobs marked `allow_failure`; reported, not fatal.
    pub warnings: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// CI gate evaluation rules.
pub struct CiGate;

impl CiGate {
    /// Evaluate whether every started job succeeded.
    ///
    /// Gate rule:
    /// - For each started job there must be a `job_started` event
    /// - Followed by either:
    ///   - A `job_succeeded` event with exit_code == 0 (pass)
    ///   - A `job_failed` event (fail)
    /// - Any failed job fails the gate, unless its `job_started` payload
    ///   carries `allow_failure: true`, in which case it becomes a warning
    /// - A started job with no outcome fails the gate
    pub fn evaluate(events: &[JobEvent]) -> GateVerdict {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        // Jobs started, with their allow_failure flag, and jobs with an outcome
        let mut started: BTreeMap<&str, bool> = BTreeMap::new();
        let mut finished: BTreeSet<&str> = BTreeSet::new();

        for event in events {
            let job = event.job_name.as_str();
            match event.kind {
                JobEventKind::JobStarted => {
                    let allow_failure = event.payload["allow_failure"].as_bool().unwrap_or(false);
                    started.insert(job, allow_failure);
                }
                JobEventKind::JobSucceeded => {
                    finished.insert(job);
                    let exit_code = event.payload["exit_code"].as_i64().unwrap_or(-1);
                    if exit_code != 0 {
                        let message = format!(
                            "Job '{}' reported success with non-zero exit code: {}",
                            job, exit_code
                        );
                        Self::classify(&started, job, message, &mut violations, &mut warnings);
                    }
                }
                JobEventKind::JobFailed => {
                    finished.insert(job);
                    let error = event.payload["error"]
                        .as_str()
                        .unwrap_or("Unknown error")
                        .to_string();
                    let message = format!("Job '{}' failed: {}", job, error);
                    Self::classify(&started, job, message, &mut violations, &mut warnings);
                }
            }
        }

        // Check for jobs that were started but never finished
        for job in started.keys() {
            if !finished.contains(job) {
                violations.push(format!("Job '{}' was started but never finished", job));
            }
        }

        let passed = violations.is_empty();
        let message = if passed && warnings.is_empty() {
            "All jobs passed".to_string()
        } else if passed {
            format!("Gate passed with {} allowed failure(s)", warnings.len())
        } else {
            format!("Gate failed with {} violation(s)", violations.len())
        };

        GateVerdict {
            passed,
            violations,
            warnings,
            message,
        }
    }

    fn classify(
        started: &BTreeMap<&str, bool>,
        job: &str,
        message: String,
        violations: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        if started.get(job).copied().unwrap_or(false) {
            warnings.push(message);
        } else {
            violations.push(message);
        }
    }
}

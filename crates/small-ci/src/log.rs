//! In-memory event log for a pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// What happened to a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    JobStarted,
    JobSucceeded,
    JobFailed,
}

impl JobEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobEventKind::JobStarted => "job_started",
            JobEventKind::JobSucceeded => "job_succeeded",
            JobEventKind::JobFailed => "job_failed",
        }
    }
}

/// A single recorded event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobEvent {
    /// Position in the run, starting at 1.
    pub seq: u64,

    pub kind: JobEventKind,

    pub job_name: String,

    /// Event details (exit code, output, error, ...).
    pub payload: Value,

    pub timestamp: DateTime<Utc>,
}

/// Append-only event log shared by the jobs of one run.
///
/// Sequence numbers are assigned under the lock, so they are dense and
/// follow recording order even when jobs run concurrently.
#[derive(Debug)]
pub struct RunLog {
    run_id: String,
    events: Mutex<Vec<JobEvent>>,
}

impl RunLog {
    /// Create an empty log with a fresh run id.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append an event and return its sequence number.
    pub async fn record(&self, kind: JobEventKind, job_name: &str, payload: Value) -> u64 {
        let mut events = self.events.lock().await;
        let seq = events.len() as u64 + 1;
        events.push(JobEvent {
            seq,
            kind,
            job_name: job_name.to_string(),
            payload,
            timestamp: Utc::now(),
        });
        debug!(run_id = %self.run_id, seq, kind = kind.as_str(), job = job_name, "Recorded event");
        seq
    }

    /// Snapshot of every event recorded so far.
    pub async fn events(&self) -> Vec<JobEvent> {
        self.events.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

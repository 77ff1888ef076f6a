//! Run reports persisted as JSON.

use crate::error::Result;
use crate::gate::{CiGate, GateVerdict};
use crate::log::JobEvent;
use crate::pipeline::PipelineResult;
use crate::spec::PipelineSpec;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Everything known about one finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub spec: PipelineSpec,
    pub result: PipelineResult,
    pub verdict: GateVerdict,
    pub events: Vec<JobEvent>,
}

impl RunReport {
    /// Build a report, evaluating the gate over `events`.
    pub fn new(spec: PipelineSpec, result: PipelineResult, events: Vec<JobEvent>) -> Self {
        let verdict = CiGate::evaluate(&events);
        Self {
            spec,
            result,
            verdict,
            events,
        }
    }

    /// Write the report as pretty JSON.
    ///
    /// The file is written next to its destination and renamed into place,
    /// so readers never observe a partial report.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let json = serde_json::to_vec_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;

        debug!(path = %path.display(), events = self.events.len(), "Wrote run report");
        Ok(())
    }

    /// Read a report written by [`RunReport::write_to`].
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&content)?)
    }
}

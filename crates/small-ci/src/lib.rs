//! small CI - the test matrix for the `small` crate, runnable locally
//!
//! Provides:
//! - The three matrix jobs (`test:std`, `test:no_std`, `test:stable`) and
//!   a reader/writer for the `.gitlab-ci.yml` that declares them
//! - A runner that executes job scripts on the host
//! - A pipeline that records every job into a run log
//! - Gate evaluation and JSON run reports

pub mod config;
pub mod error;
pub mod gate;
pub mod job;
pub mod log;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod spec;
pub mod telemetry;

// Re-export key types
pub use config::CiConfig;
pub use error::{CiError, Result};
pub use gate::{CiGate, GateVerdict};
pub use job::{BuiltinJob, JobConfig};
pub use log::{JobEvent, JobEventKind, RunLog};
pub use pipeline::{Pipeline, PipelineOptions, PipelineResult};
pub use report::RunReport;
pub use runner::{JobResult, JobRunner};
pub use spec::PipelineSpec;
pub use telemetry::init_tracing;

/// small-ci crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

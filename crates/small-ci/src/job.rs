//! CI job definitions and configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Container image the built-in jobs declare.
pub const DEFAULT_IMAGE: &str = "rust:latest";

/// Job timeout when the configuration does not set one (one hour).
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Cargo home relative to the project, so the runner can cache it.
pub const CARGO_HOME: &str = "$CI_PROJECT_DIR/cargo";

/// Paths the built-in jobs ask the runner to cache.
pub const CACHE_PATHS: [&str; 2] = ["cargo/", "target/"];

/// Builtin test jobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinJob {
    /// Nightly toolchain, default features plus serde
    Std,

    /// Nightly toolchain, `std` disabled
    NoStd,

    /// Stable toolchain, every feature
    Stable,
}

impl BuiltinJob {
    /// Every builtin job, in pipeline order.
    pub fn all() -> [BuiltinJob; 3] {
        [BuiltinJob::Std, BuiltinJob::NoStd, BuiltinJob::Stable]
    }

    /// Get the job name as it appears in `.gitlab-ci.yml`.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinJob::Std => "test:std",
            BuiltinJob::NoStd => "test:no_std",
            BuiltinJob::Stable => "test:stable",
        }
    }

    /// Look a builtin job up by name.
    pub fn from_name(name: &str) -> Option<BuiltinJob> {
        Self::all().into_iter().find(|job| job.name() == name)
    }

    /// Toolchain the job installs and tests with.
    pub fn toolchain(&self) -> &'static str {
        match self {
            BuiltinJob::Std | BuiltinJob::NoStd => "nightly",
            BuiltinJob::Stable => "stable",
        }
    }

    /// Feature flags passed to `cargo test`.
    pub fn feature_flags(&self) -> &'static str {
        match self {
            BuiltinJob::Std => "--features serde",
            BuiltinJob::NoStd => "--no-default-features --features serde",
            BuiltinJob::Stable => "--all-features",
        }
    }

    /// Get the job's script: install the toolchain, print versions, run the tests.
    pub fn script(&self) -> Vec<String> {
        let toolchain = self.toolchain();
        vec![
            format!("rustup toolchain install {toolchain} --profile minimal"),
            format!("rustc +{toolchain} --version && cargo +{toolchain} --version"),
            format!("cargo +{toolchain} test -p small {}", self.feature_flags()),
        ]
    }
}

/// Configuration for a CI job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobConfig {
    /// Job name, e.g. `test:std`.
    pub name: String,

    /// Container image the job declares. Recorded, not pulled.
    pub image: Option<String>,

    /// Environment variables; values may reference `$CI_PROJECT_DIR`.
    pub variables: BTreeMap<String, String>,

    /// Commands run before `script`.
    pub before_script: Vec<String>,

    /// Shell commands, each run with `sh -c`.
    pub script: Vec<String>,

    /// Paths the runner caches between jobs.
    pub cache_paths: Vec<String>,

    /// Whether a failure of this job still lets the pipeline pass.
    pub allow_failure: bool,

    /// Timeout in seconds for the whole job (0 disables it).
    pub timeout_secs: u64,

    /// Whether local runs execute this job. `when: manual` and
    /// `when: never` jobs are parsed with this unset.
    pub enabled: bool,
}

impl JobConfig {
    /// Create a new job configuration from a builtin job.
    pub fn from_builtin(job: BuiltinJob, timeout_secs: u64) -> Self {
        let variables = BTreeMap::from([("CARGO_HOME".to_string(), CARGO_HOME.to_string())]);
        Self {
            name: job.name().to_string(),
            image: Some(DEFAULT_IMAGE.to_string()),
            variables,
            before_script: Vec::new(),
            script: job.script(),
            cache_paths: CACHE_PATHS.iter().map(|p| p.to_string()).collect(),
            allow_failure: false,
            timeout_secs,
            enabled: true,
        }
    }

    /// Create a custom job configuration.
    pub fn custom(name: String, script: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name,
            image: None,
            variables: BTreeMap::new(),
            before_script: Vec::new(),
            script,
            cache_paths: Vec::new(),
            allow_failure: false,
            timeout_secs,
            enabled: true,
        }
    }

    /// Add an environment variable.
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Let this job fail without failing the pipeline.
    pub fn allowing_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    /// Disable this job, as `when: manual` does.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Commands in execution order: `before_script`, then `script`.
    pub fn commands(&self) -> impl Iterator<Item = &String> {
        self.before_script.iter().chain(self.script.iter())
    }
}

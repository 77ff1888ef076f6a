//! `.gitlab-ci.yml` parsing and emission.
//!
//! Only the part of the GitLab job schema the test matrix uses is read:
//! `image`, `variables`, `before_script`, `script`, `cache.paths`,
//! `allow_failure`, `timeout` and `when`. Top-level `image`, `variables`,
//! `before_script` (or the same keys under `default`) are merged into
//! every job, with job values taking precedence.

use crate::error::{CiError, Result};
use crate::job::{BuiltinJob, JobConfig, DEFAULT_TIMEOUT_SECS};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Top-level keys that configure the pipeline rather than name a job.
const RESERVED_KEYS: &[&str] = &[
    "image",
    "variables",
    "before_script",
    "after_script",
    "default",
    "stages",
    "include",
    "workflow",
    "cache",
    "services",
];

/// A parsed CI configuration: jobs in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiConfig {
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawImage {
    Name(String),
    Detailed { name: String },
}

impl RawImage {
    fn into_name(self) -> String {
        match self {
            RawImage::Name(name) | RawImage::Detailed { name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCommands {
    One(String),
    Many(Vec<String>),
}

impl RawCommands {
    fn into_vec(self) -> Vec<String> {
        match self {
            RawCommands::One(command) => vec![command],
            RawCommands::Many(commands) => commands,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimeout {
    Seconds(u64),
    Duration(String),
}

impl RawTimeout {
    fn into_secs(self) -> Result<u64> {
        match self {
            RawTimeout::Seconds(secs) => Ok(secs),
            RawTimeout::Duration(text) => parse_timeout(&text),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawCacheEntry {
    #[serde(default)]
    paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCache {
    One(RawCacheEntry),
    Many(Vec<RawCacheEntry>),
}

impl RawCache {
    fn into_paths(self) -> Vec<String> {
        match self {
            RawCache::One(entry) => entry.paths,
            RawCache::Many(entries) => entries.into_iter().flat_map(|e| e.paths).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawDefaults {
    image: Option<RawImage>,
    #[serde(default)]
    variables: Mapping,
    before_script: Option<RawCommands>,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    image: Option<RawImage>,
    #[serde(default)]
    variables: Mapping,
    before_script: Option<RawCommands>,
    script: Option<RawCommands>,
    cache: Option<RawCache>,
    #[serde(default)]
    allow_failure: bool,
    timeout: Option<RawTimeout>,
    when: Option<String>,
}

impl CiConfig {
    /// The built-in test matrix: `test:std`, `test:no_std`, `test:stable`.
    pub fn builtin() -> Self {
        Self {
            jobs: BuiltinJob::all()
                .into_iter()
                .map(|job| JobConfig::from_builtin(job, DEFAULT_TIMEOUT_SECS))
                .collect(),
        }
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading CI configuration");
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a `.gitlab-ci.yml` document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut root: Value = serde_yaml::from_str(content)?;
        root.apply_merge()?;
        let document: Mapping = serde_yaml::from_value(root)?;

        let mut defaults = match document.get("default") {
            Some(value) => serde_yaml::from_value::<RawDefaults>(value.clone())?,
            None => RawDefaults::default(),
        };
        if let Some(image) = document.get("image") {
            defaults.image = Some(serde_yaml::from_value(image.clone())?);
        }
        if let Some(Value::Mapping(variables)) = document.get("variables") {
            defaults.variables = variables.clone();
        }
        if let Some(before_script) = document.get("before_script") {
            defaults.before_script = Some(serde_yaml::from_value(before_script.clone())?);
        }

        let default_image = defaults.image.map(RawImage::into_name);
        let default_variables = scalar_map("variables", defaults.variables)?;
        let default_before_script = defaults
            .before_script
            .map(RawCommands::into_vec)
            .unwrap_or_default();

        let mut jobs = Vec::new();
        for (key, value) in document {
            let Some(name) = key.as_str() else {
                continue;
            };
            if name.starts_with('.') || RESERVED_KEYS.contains(&name) {
                continue;
            }

            let raw: RawJob = serde_yaml::from_value(value).map_err(|e| CiError::InvalidJob {
                job: name.to_string(),
                reason: e.to_string(),
            })?;

            let script = raw.script.map(RawCommands::into_vec).unwrap_or_default();
            if script.is_empty() {
                return Err(CiError::InvalidJob {
                    job: name.to_string(),
                    reason: "job has no script".to_string(),
                });
            }

            let mut variables = default_variables.clone();
            variables.extend(scalar_map(name, raw.variables)?);

            let timeout_secs = match raw.timeout {
                Some(timeout) => timeout.into_secs()?,
                None => DEFAULT_TIMEOUT_SECS,
            };

            // Manual and never-run jobs are kept but skipped locally
            let enabled = !matches!(raw.when.as_deref(), Some("manual" | "never"));
            if !enabled {
                debug!(job = name, "Job is not run automatically");
            }

            jobs.push(JobConfig {
                name: name.to_string(),
                image: raw.image.map(RawImage::into_name).or_else(|| default_image.clone()),
                variables,
                before_script: raw
                    .before_script
                    .map(RawCommands::into_vec)
                    .unwrap_or_else(|| default_before_script.clone()),
                script,
                cache_paths: raw.cache.map(RawCache::into_paths).unwrap_or_default(),
                allow_failure: raw.allow_failure,
                timeout_secs,
                enabled,
            });
        }

        if jobs.is_empty() {
            return Err(CiError::NoJobs);
        }

        debug!(jobs = jobs.len(), "Parsed CI configuration");
        Ok(Self { jobs })
    }

    /// Emit the configuration in the GitLab job schema.
    ///
    /// Every job is written out in full; nothing is factored into
    /// top-level defaults.
    pub fn to_yaml(&self) -> Result<String> {
        let mut document = Mapping::new();

        for job in &self.jobs {
            let mut entry = Mapping::new();
            if let Some(image) = &job.image {
                entry.insert("image".into(), image.as_str().into());
            }
            if !job.variables.is_empty() {
                let variables: Mapping = job
                    .variables
                    .iter()
                    .map(|(k, v)| (Value::from(k.as_str()), Value::from(v.as_str())))
                    .collect();
                entry.insert("variables".into(), Value::Mapping(variables));
            }
            if !job.before_script.is_empty() {
                entry.insert("before_script".into(), string_list(&job.before_script));
            }
            entry.insert("script".into(), string_list(&job.script));
            if !job.cache_paths.is_empty() {
                let mut cache = Mapping::new();
                cache.insert("paths".into(), string_list(&job.cache_paths));
                entry.insert("cache".into(), Value::Mapping(cache));
            }
            if job.allow_failure {
                entry.insert("allow_failure".into(), true.into());
            }
            if job.timeout_secs != DEFAULT_TIMEOUT_SECS {
                entry.insert(
                    "timeout".into(),
                    format!("{} seconds", job.timeout_secs).into(),
                );
            }
            if !job.enabled {
                entry.insert("when".into(), "manual".into());
            }
            document.insert(job.name.as_str().into(), Value::Mapping(entry));
        }

        Ok(serde_yaml::to_string(&document)?)
    }

    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|job| job.name == name)
    }

    pub fn job_names(&self) -> Vec<String> {
        self.jobs.iter().map(|job| job.name.clone()).collect()
    }

    /// Jobs with the given names, in the order requested.
    ///
    /// An empty selection returns every job.
    pub fn select(&self, names: &[String]) -> Result<Vec<JobConfig>> {
        if names.is_empty() {
            return Ok(self.jobs.clone());
        }
        names
            .iter()
            .map(|name| {
                self.job(name)
                    .cloned()
                    .ok_or_else(|| CiError::UnknownJob(name.clone()))
            })
            .collect()
    }
}

fn string_list(items: &[String]) -> Value {
    Value::Sequence(items.iter().map(|s| Value::from(s.as_str())).collect())
}

/// Converts a YAML mapping of scalar values into strings.
///
/// GitLab also accepts `{ value: ..., description: ... }` entries.
fn scalar_map(owner: &str, mapping: Mapping) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (key, value) in mapping {
        let key = scalar_to_string(&key).ok_or_else(|| CiError::InvalidJob {
            job: owner.to_string(),
            reason: "variable names must be scalars".to_string(),
        })?;
        let value = match &value {
            Value::Mapping(detailed) => detailed.get("value").and_then(scalar_to_string),
            other => scalar_to_string(other),
        }
        .ok_or_else(|| CiError::InvalidJob {
            job: owner.to_string(),
            reason: format!("variable '{key}' must be a scalar"),
        })?;
        out.insert(key, value);
    }
    Ok(out)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses a GitLab duration such as `1h 30m`, `90 minutes` or `45s` into seconds.
pub fn parse_timeout(input: &str) -> Result<u64> {
    let invalid = || CiError::InvalidTimeout(input.to_string());

    let mut total = 0u64;
    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(invalid());
    }

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(invalid());
        }
        let amount: u64 = rest[..digits_end].parse().map_err(|_| invalid())?;
        rest = rest[digits_end..].trim_start();

        let unit_end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let multiplier = match &rest[..unit_end] {
            "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
            "m" | "min" | "mins" | "minute" | "minutes" => 60,
            "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
            _ => return Err(invalid()),
        };
        rest = rest[unit_end..].trim_start();

        total = amount
            .checked_mul(multiplier)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
    }

    Ok(total)
}

//! CI job execution.

use crate::job::JobConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Result of a job execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Job name.
    pub job_name: String,

    /// Exit code of the last command run (0 = success).
    pub exit_code: i32,

    /// Captured stdout of every command run.
    pub stdout: String,

    /// Captured stderr of every command run.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,

    /// The command that failed, if any.
    pub failed_command: Option<String>,

    /// Whether the job was allowed to fail.
    pub allow_failure: bool,
}

impl JobResult {
    /// Whether this job passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Whether this job is acceptable for the pipeline: passed, or failed but allowed to.
    pub fn acceptable(&self) -> bool {
        self.passed() || self.allow_failure
    }
}

/// CI job runner that executes a job's script on the host.
pub struct JobRunner;

impl JobRunner {
    /// Execute a single job in `workspace` and return the result.
    ///
    /// Each command runs through `sh -c` with the job variables in its
    /// environment, plus `CI_PROJECT_DIR` and `CI_JOB_NAME`. Execution
    /// stops at the first failing command. Cache directories are created
    /// before the first command. The timeout covers the whole job.
    pub async fn execute(job: &JobConfig, workspace: &Path) -> anyhow::Result<JobResult> {
        let start = Instant::now();

        // Validate script
        if job.script.is_empty() {
            anyhow::bail!("Job {} has empty script", job.name);
        }

        if let Some(image) = &job.image {
            debug!(job = %job.name, image = %image, "Image recorded; running on the host");
        }

        for path in &job.cache_paths {
            tokio::fs::create_dir_all(workspace.join(path)).await?;
        }

        let env = job_environment(job, workspace);

        let run = Self::run_commands(job, workspace, &env);
        let mut result = if job.timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(job.timeout_secs), run)
                .await
                .map_err(|_| {
                    anyhow::anyhow!(
                        "Job {} timed out after {} seconds",
                        job.name,
                        job.timeout_secs
                    )
                })??
        } else {
            run.await?
        };

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn run_commands(
        job: &JobConfig,
        workspace: &Path,
        env: &BTreeMap<String, String>,
    ) -> anyhow::Result<JobResult> {
        let mut stdout = String::new();
        let mut stderr = String::new();

        for command in job.commands() {
            debug!(job = %job.name, command = %command, "Running command");

            // kill_on_drop so a timed out job does not leave its child behind
            let child = Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(workspace)
                .envs(env)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;
            let output = child.wait_with_output().await?;

            stdout.push_str(&String::from_utf8_lossy(&output.stdout));
            stderr.push_str(&String::from_utf8_lossy(&output.stderr));

            if !output.status.success() {
                let exit_code = output.status.code().unwrap_or(-1);
                warn!(job = %job.name, command = %command, exit_code, "Command failed");
                return Ok(JobResult {
                    job_name: job.name.clone(),
                    exit_code,
                    stdout,
                    stderr,
                    duration_ms: 0,
                    success: false,
                    failed_command: Some(command.clone()),
                    allow_failure: job.allow_failure,
                });
            }
        }

        Ok(JobResult {
            job_name: job.name.clone(),
            exit_code: 0,
            stdout,
            stderr,
            duration_ms: 0,
            success: true,
            failed_command: None,
            allow_failure: job.allow_failure,
        })
    }
}

/// Environment for a job's commands.
///
/// Variable values are expanded against `CI_PROJECT_DIR`, `CI_JOB_NAME`
/// and the runner's own environment, the way the CI service expands
/// `CARGO_HOME: $CI_PROJECT_DIR/cargo`.
pub fn job_environment(job: &JobConfig, workspace: &Path) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(
        "CI_PROJECT_DIR".to_string(),
        workspace.to_string_lossy().into_owned(),
    );
    env.insert("CI_JOB_NAME".to_string(), job.name.clone());

    let builtins = env.clone();
    for (key, value) in &job.variables {
        let expanded = expand_variables(value, |name| {
            builtins
                .get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok())
        });
        env.insert(key.clone(), expanded);
    }
    env
}

/// Expands `$NAME` and `${NAME}` references. Unknown names expand to
/// the empty string; `$$` is a literal `$`.
pub fn expand_variables<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }

        match chars.peek().copied() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((start, '{')) => {
                chars.next();
                let name_start = start + 1;
                let mut name_end = None;
                for (idx, c) in chars.by_ref() {
                    if c == '}' {
                        name_end = Some(idx);
                        break;
                    }
                }
                match name_end {
                    Some(end) => out.push_str(&lookup(&input[name_start..end]).unwrap_or_default()),
                    // Unterminated: keep it as written
                    None => out.push_str(&input[start - 1..]),
                }
            }
            Some((start, c)) if c == '_' || c.is_ascii_alphabetic() => {
                let mut end = input.len();
                while let Some(&(idx, c)) = chars.peek() {
                    if c == '_' || c.is_ascii_alphanumeric() {
                        chars.next();
                    } else {
                        end = idx;
                        break;
                    }
                }
                out.push_str(&lookup(&input[start..end]).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "CI_PROJECT_DIR" => Some("/builds/small".to_string()),
            "USER" => Some("ci".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_job_result_passed() {
        let result = JobResult {
            job_name: "test:std".to_string(),
            exit_code: 0,
            stdout: "".to_string(),
            stderr: "".to_string(),
            duration_ms: 100,
            success: true,
            failed_command: None,
            allow_failure: false,
        };
        assert!(result.passed());
        assert!(result.acceptable());
    }

    #[test]
    fn test_job_result_failed_but_allowed() {
        let result = JobResult {
            job_name: "test:stable".to_string(),
            exit_code: 101,
            stdout: "".to_string(),
            stderr: "error".to_string(),
            duration_ms: 100,
            success: false,
            failed_command: Some("cargo test".to_string()),
            allow_failure: true,
        };
        assert!(!result.passed());
        assert!(result.acceptable());
    }

    #[test]
    fn test_expand_variables() {
        assert_eq!(expand_variables("$CI_PROJECT_DIR/cargo", lookup), "/builds/small/cargo");
        assert_eq!(expand_variables("${USER}_home", lookup), "ci_home");
        assert_eq!(expand_variables("cost: $$5", lookup), "cost: $5");
        assert_eq!(expand_variables("$MISSING/x", lookup), "/x");
        assert_eq!(expand_variables("trailing $", lookup), "trailing $");
        assert_eq!(expand_variables("${OPEN", lookup), "${OPEN");
        assert_eq!(expand_variables("plain", lookup), "plain");
    }

    #[test]
    fn test_job_environment_expands_project_dir() {
        let job = JobConfig::custom("env".to_string(), vec!["true".to_string()], 60)
            .with_variable("CARGO_HOME", "$CI_PROJECT_DIR/cargo");
        let env = job_environment(&job, Path::new("/work"));
        assert_eq!(env["CARGO_HOME"], "/work/cargo");
        assert_eq!(env["CI_JOB_NAME"], "env");
    }

    #[tokio::test]
    async fn test_execute_simple_job() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobConfig::custom("echo_test".to_string(), vec!["echo hello".to_string()], 60);

        let result = JobRunner::execute(&job, dir.path()).await.expect("execute failed");
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobConfig::custom(
            "stops".to_string(),
            vec![
                "echo first".to_string(),
                "exit 3".to_string(),
                "echo never".to_string(),
            ],
            60,
        );

        let result = JobRunner::execute(&job, dir.path()).await.expect("execute failed");
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.failed_command.as_deref(), Some("exit 3"));
        assert!(result.stdout.contains("first"));
        assert!(!result.stdout.contains("never"));
    }

    #[tokio::test]
    async fn test_execute_sees_variables_and_cache_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = JobConfig::custom(
            "vars".to_string(),
            vec!["test -d cargo && echo \"$CARGO_HOME\"".to_string()],
            60,
        )
        .with_variable("CARGO_HOME", "$CI_PROJECT_DIR/cargo");
        job.cache_paths = vec!["cargo/".to_string()];

        let result = JobRunner::execute(&job, dir.path()).await.expect("execute failed");
        assert!(result.passed(), "stderr: {}", result.stderr);
        let expected = dir.path().join("cargo");
        assert!(result.stdout.trim_end().ends_with(&*expected.to_string_lossy()));
    }

    #[tokio::test]
    async fn test_execute_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobConfig::custom("slow".to_string(), vec!["sleep 5".to_string()], 1);

        let err = JobRunner::execute(&job, dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_execute_rejects_empty_script() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobConfig::custom("empty".to_string(), vec![], 60);
        assert!(JobRunner::execute(&job, dir.path()).await.is_err());
    }
}

//! Pipeline specification and identity.

use crate::job::JobConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Pipeline specification.
///
/// Identifies what a run executed: where, which jobs, at which commit and
/// with which toolchain. Two runs with the same spec digest ran the same
/// matrix against the same sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineSpec {
    /// Workspace root path.
    pub workspace_path: PathBuf,

    /// SHA-256 digest of ordered job names and commands (deterministic).
    pub jobs_digest: String,

    /// Git commit SHA where execution occurred.
    pub git_sha: String,

    /// Active toolchain as reported by `rustup show active-toolchain`.
    pub toolchain: String,
}

impl PipelineSpec {
    /// Create a new pipeline specification.
    pub fn new(workspace_path: PathBuf, jobs: &[JobConfig], git_sha: String, toolchain: String) -> Self {
        let jobs_digest = compute_jobs_digest(jobs);
        Self {
            workspace_path,
            jobs_digest,
            git_sha,
            toolchain,
        }
    }

    /// Create a specification, asking git and rustup for the commit and toolchain.
    pub async fn detect(workspace_path: PathBuf, jobs: &[JobConfig]) -> Self {
        let (git_sha, toolchain) = tokio::join!(
            command_output(&workspace_path, "git", &["rev-parse", "HEAD"]),
            command_output(&workspace_path, "rustup", &["show", "active-toolchain"]),
        );
        Self::new(workspace_path, jobs, git_sha, toolchain)
    }

    /// Digest over every field, identifying the run.
    pub fn spec_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.workspace_path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.jobs_digest.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.git_sha.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.toolchain.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Compute deterministic digest of ordered jobs and their commands.
fn compute_jobs_digest(jobs: &[JobConfig]) -> String {
    let mut hasher = Sha256::new();
    for job in jobs {
        hasher.update(job.name.as_bytes());
        hasher.update(b"\0");
        for command in job.commands() {
            hasher.update(command.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\x1e");
    }
    hex::encode(hasher.finalize())
}

/// First line of a command's stdout, or `unknown` if it cannot run.
async fn command_output(dir: &Path, program: &str, args: &[&str]) -> String {
    match Command::new(program).args(args).current_dir(dir).output().await {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            stdout.lines().next().unwrap_or("unknown").trim().to_string()
        }
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::BuiltinJob;

    fn jobs(names: &[&str]) -> Vec<JobConfig> {
        names
            .iter()
            .map(|name| JobConfig::custom(name.to_string(), vec![format!("echo {name}")], 60))
            .collect()
    }

    #[test]
    fn test_pipeline_spec_new() {
        let spec = PipelineSpec::new(
            PathBuf::from("."),
            &jobs(&["a", "b"]),
            "abc123".to_string(),
            "stable-x86_64".to_string(),
        );

        assert_eq!(spec.workspace_path, PathBuf::from("."));
        assert_eq!(spec.git_sha, "abc123");
        assert_eq!(spec.toolchain, "stable-x86_64");
        assert_eq!(spec.jobs_digest.len(), 64);
    }

    #[test]
    fn test_jobs_digest_deterministic() {
        assert_eq!(
            compute_jobs_digest(&jobs(&["a", "b"])),
            compute_jobs_digest(&jobs(&["a", "b"]))
        );
    }

    #[test]
    fn test_jobs_digest_order_sensitive() {
        assert_ne!(
            compute_jobs_digest(&jobs(&["a", "b"])),
            compute_jobs_digest(&jobs(&["b", "a"]))
        );
    }

    #[test]
    fn test_jobs_digest_covers_commands() {
        let builtin = JobConfig::from_builtin(BuiltinJob::Std, 60);
        let mut changed = builtin.clone();
        changed.script.push("cargo doc".to_string());
        assert_ne!(
            compute_jobs_digest(&[builtin]),
            compute_jobs_digest(&[changed])
        );
    }

    #[test]
    fn test_spec_digest_changes_with_sha() {
        let a = PipelineSpec::new(PathBuf::from("."), &jobs(&["a"]), "1".into(), "t".into());
        let b = PipelineSpec::new(PathBuf::from("."), &jobs(&["a"]), "2".into(), "t".into());
        assert_ne!(a.spec_digest(), b.spec_digest());
    }

    #[tokio::test]
    async fn test_command_output_missing_program() {
        let out = command_output(Path::new("."), "definitely-not-a-real-program", &[]).await;
        assert_eq!(out, "unknown");
    }

    #[tokio::test]
    async fn test_detect_outside_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(&["a"]);
        let spec = PipelineSpec::detect(dir.path().to_path_buf(), &jobs).await;

        assert_eq!(spec.git_sha, "unknown");
        assert_eq!(spec.jobs_digest, compute_jobs_digest(&jobs));
        assert_eq!(spec.workspace_path, dir.path());
    }
}

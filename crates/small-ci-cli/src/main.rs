//! small-ci - run the small test matrix locally
//!
//! ## Commands
//!
//! - `list`: List the jobs of the matrix
//! - `show`: Print the matrix as `.gitlab-ci.yml`
//! - `init`: Write the built-in matrix to `.gitlab-ci.yml`
//! - `run`: Run jobs, evaluate the gate and optionally save a report
//! - `gate`: Re-evaluate the gate of a saved report

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use small_ci::{
    BuiltinJob, CiConfig, CiGate, GateVerdict, JobConfig, JobResult, Pipeline, PipelineOptions,
    PipelineSpec, RunLog, RunReport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "small-ci")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run the small crate's CI test matrix locally", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the job definitions come from.
#[derive(Args)]
struct ConfigSource {
    /// CI configuration file
    #[arg(short, long, env = "SMALL_CI_CONFIG", default_value = ".gitlab-ci.yml")]
    config: PathBuf,

    /// Use the built-in matrix instead of reading a file
    #[arg(long)]
    builtin: bool,
}

impl ConfigSource {
    fn load(&self) -> Result<CiConfig> {
        if self.builtin {
            return Ok(CiConfig::builtin());
        }
        CiConfig::load(&self.config)
            .with_context(|| format!("Failed to load CI configuration {:?}", self.config))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the jobs of the matrix
    List {
        #[command(flatten)]
        source: ConfigSource,
    },

    /// Print the configuration as YAML
    Show {
        #[command(flatten)]
        source: ConfigSource,
    },

    /// Write the built-in matrix as a CI configuration file
    Init {
        /// File to write
        #[arg(short, long, default_value = ".gitlab-ci.yml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run jobs and evaluate the gate
    Run {
        #[command(flatten)]
        source: ConfigSource,

        /// Workspace the jobs run in
        #[arg(short, long, env = "SMALL_CI_WORKSPACE", default_value = ".")]
        workspace: PathBuf,

        /// Job to run (repeatable; default: every job)
        #[arg(short, long = "job")]
        jobs: Vec<String>,

        /// Run jobs concurrently
        #[arg(long)]
        parallel: bool,

        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Evaluate the gate of a saved run report
    Gate {
        /// Report written by `run --report`
        #[arg(long)]
        report: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    small_ci::init_tracing(cli.json, level);

    match cli.command {
        Commands::List { source } => cmd_list(&source.load()?),
        Commands::Show { source } => cmd_show(&source.load()?),
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Run {
            source,
            workspace,
            jobs,
            parallel,
            report,
        } => {
            let config = source.load()?;
            cmd_run(&config, &workspace, &jobs, parallel, report.as_deref()).await
        }
        Commands::Gate { report } => cmd_gate(&report),
    }
}

/// List job names with their toolchain, image and script length
fn cmd_list(config: &CiConfig) -> Result<()> {
    for job in &config.jobs {
        println!("{}", list_line(job));
    }
    Ok(())
}

fn list_line(job: &JobConfig) -> String {
    let toolchain = BuiltinJob::from_name(&job.name)
        .map(|builtin| builtin.toolchain())
        .unwrap_or("-");
    let image = job.image.as_deref().unwrap_or("-");
    let mut flags = String::new();
    if job.allow_failure {
        flags.push_str(" (allow failure)");
    }
    if !job.enabled {
        flags.push_str(" (manual)");
    }
    format!(
        "{:<16} {:<8} {:<14} {} command(s){}",
        job.name,
        toolchain,
        image,
        job.commands().count(),
        flags
    )
}

fn cmd_show(config: &CiConfig) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}

/// Write the built-in matrix
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
    }

    let yaml = CiConfig::builtin().to_yaml()?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;

    info!(path = %path.display(), "Wrote built-in CI matrix");
    println!("Wrote {}", path.display());
    Ok(())
}

/// Run the selected jobs and evaluate the gate
async fn cmd_run(
    config: &CiConfig,
    workspace: &Path,
    job_names: &[String],
    parallel: bool,
    report_path: Option<&Path>,
) -> Result<()> {
    let jobs = config.select(job_names)?;
    let workspace = workspace
        .canonicalize()
        .with_context(|| format!("Workspace {:?} does not exist", workspace))?;

    let spec = PipelineSpec::detect(workspace.clone(), &jobs).await;

    println!("Running CI pipeline for workspace: {:?}", workspace);
    println!(
        "Jobs: {}",
        jobs.iter().map(|j| j.name.as_str()).collect::<Vec<_>>().join(", ")
    );
    println!("Git SHA: {}", spec.git_sha);
    println!();

    let log = Arc::new(RunLog::new());
    let result = Pipeline::run(log.clone(), &spec, jobs, PipelineOptions { parallel })
        .await
        .context("CI pipeline failed to run")?;

    // Print results
    println!("Run ID: {}", result.run_id);
    println!("Status: {}", if result.success { "✓ PASSED" } else { "✗ FAILED" });
    println!("Duration: {}ms", result.duration_ms);
    println!();

    for job_result in &result.jobs {
        println!("  {}", job_line(job_result));
    }

    println!();
    println!("Summary: {}/{} jobs passed", result.passed_count(), result.jobs.len());

    let report = RunReport::new(spec, result, log.events().await);
    print_verdict(&report.verdict);

    if let Some(path) = report_path {
        report
            .write_to(path)
            .with_context(|| format!("Failed to write report {:?}", path))?;
        println!("Report: {}", path.display());
    }

    if report.result.success && report.verdict.passed {
        println!("\n✓ All checks passed!");
        Ok(())
    } else {
        anyhow::bail!("CI checks failed")
    }
}

/// Re-evaluate a saved report
fn cmd_gate(path: &Path) -> Result<()> {
    let report =
        RunReport::read_from(path).with_context(|| format!("Failed to read report {:?}", path))?;

    println!("Run ID: {}", report.result.run_id);
    println!("Spec digest: {}", report.result.spec_digest);

    let verdict = CiGate::evaluate(&report.events);
    print_verdict(&verdict);

    if verdict.passed {
        Ok(())
    } else {
        anyhow::bail!("{}", verdict.message)
    }
}

fn job_line(result: &JobResult) -> String {
    let status = if result.passed() {
        "✓"
    } else if result.allow_failure {
        "!"
    } else {
        "✗"
    };
    let mut line = format!(
        "{} {} ({}ms, exit code: {})",
        status, result.job_name, result.duration_ms, result.exit_code
    );
    if let Some(command) = &result.failed_command {
        line.push_str(&format!(" at `{}`", command));
    }
    line
}

fn print_verdict(verdict: &GateVerdict) {
    println!("Gate: {}", if verdict.passed { "✓ PASSED" } else { "✗ FAILED" });

    if !verdict.violations.is_empty() {
        println!("Violations:");
        for violation in &verdict.violations {
            println!("  - {}", violation);
        }
    }
    if !verdict.warnings.is_empty() {
        println!("Allowed failures:");
        for warning in &verdict.warnings {
            println!("  - {}", warning);
        }
    }
}

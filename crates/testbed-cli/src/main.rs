//! testbed - pub/sub security evaluation runner
//!
//! Builds the workload for one security variant, brings up an emulated
//! network of one publisher and `hosts - 1` subscribers, and repeats the
//! measurement run until the requested number of runs has succeeded.
//!
//! ```text
//! testbed --hosts 5 --evaluate H --runs 10 --clean-start
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use testbed_core::{
    Evaluation, EvaluationRequest, EvaluationSummary, RunOutcome, Settings, TestbedError,
};
use testbed_net::NetnsPlatform;
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(name = "testbed")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pub/sub security variant evaluation on an emulated network", long_about = None)]
struct Cli {
    /// Workload hosts: one publisher plus N-1 subscribers (2..=65535)
    #[arg(long)]
    hosts: u32,

    /// Security variant to evaluate (A to J)
    #[arg(long, value_name = "VARIANT")]
    evaluate: String,

    /// Successful runs to collect
    #[arg(long, default_value_t = 1)]
    runs: u32,

    /// Remove leftovers of an earlier evaluation before starting
    #[arg(long)]
    clean_start: bool,

    /// Rewrite node configs even when they already exist
    #[arg(long)]
    force_regenerate: bool,

    /// Project root holding the workload sources, templates and scripts
    #[arg(long, env = "TESTBED_PROJECT_DIR", default_value = ".")]
    project_dir: PathBuf,

    /// JSON settings file, overlaid onto the project defaults
    #[arg(long, env = "TESTBED_SETTINGS")]
    settings: Option<PathBuf>,

    /// Keep node configs and certificates after teardown
    #[arg(long)]
    keep_artifacts: bool,

    /// Seconds to wait for the publisher's readiness marker
    #[arg(long)]
    readiness_timeout_secs: Option<u64>,

    /// Seconds to wait for the statistics collector to exit
    #[arg(long)]
    collector_timeout_secs: Option<u64>,

    /// Give up on a run after this many failed attempts (default: never)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines and a JSON summary
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn request(&self) -> EvaluationRequest {
        let mut request = EvaluationRequest::new(self.hosts, &self.evaluate, self.runs);
        request.clean_start = self.clean_start;
        request.force_regenerate = self.force_regenerate;
        request
    }

    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.settings {
            Some(path) => Settings::load(path, &self.project_dir)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => Settings::for_project(&self.project_dir),
        };

        if self.keep_artifacts {
            settings.keep_artifacts = true;
        }
        if let Some(secs) = self.readiness_timeout_secs {
            settings.timing.readiness_timeout_secs = secs;
        }
        if let Some(secs) = self.collector_timeout_secs {
            settings.timing.collector_timeout_secs = secs;
        }
        if self.max_attempts.is_some() {
            settings.timing.max_attempts_per_run = self.max_attempts;
        }
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    testbed_core::init_tracing(cli.json, level);

    match run(&cli).await {
        Ok(summary) => {
            if let Err(e) = print_summary(&summary, cli.json) {
                eprintln!("Error: {e:#}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let message = failure_message(&e);
            error!(error = %format!("{e:#}"), "{message}");
            eprintln!("{message}: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Setup errors mean nothing was provisioned; anything else happened with
/// a network up and was followed by teardown.
fn failure_message(e: &anyhow::Error) -> &'static str {
    match e.downcast_ref::<TestbedError>() {
        Some(err) if err.is_fatal_setup() => "Evaluation rejected before setup",
        _ => "Evaluation failed",
    }
}

async fn run(cli: &Cli) -> Result<EvaluationSummary> {
    let settings = cli.settings()?;
    info!(project_dir = %settings.project_dir.display(), "Using project");

    let platform = Arc::new(NetnsPlatform::new(
        settings.network.address_base,
        settings.network.prefix_len,
    ));
    let evaluation = Evaluation::new(platform, settings);

    let request = cli.request();
    evaluation.run(&request).await.with_context(|| {
        format!(
            "Evaluation of variant {} on {} hosts failed",
            request.variant, request.hosts
        )
    })
}

fn print_summary(summary: &EvaluationSummary, json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(summary).context("Failed to serialise summary")?;
        println!("{rendered}");
        return Ok(());
    }

    let report = &summary.report;
    println!("Variant {} on {} hosts", summary.variant, summary.hosts);
    println!(
        "  Nodes: {} ({} subscribers)",
        summary.node_count, summary.subscriber_count
    );
    if let Some(digest) = &summary.build_digest {
        println!("  Build: {digest}");
    }
    println!(
        "  Runs: {}/{} completed in {} attempts ({} failed)",
        report.completed_runs(),
        report.runs_requested,
        report.attempts.len(),
        report.failed_attempts()
    );
    for attempt in &report.attempts {
        let outcome = match &attempt.outcome {
            RunOutcome::Success => "ok".to_string(),
            RunOutcome::Failure { reason } => reason.to_string(),
        };
        println!(
            "    run {} attempt {}: {} ({} ms)",
            attempt.run_index,
            attempt.attempt,
            outcome,
            attempt.duration_ms()
        );
    }
    println!("  Duration: {} ms", summary.duration_ms);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_invocation() {
        let cli = Cli::try_parse_from(["testbed", "--hosts", "3", "--evaluate", "H"]).unwrap();
        assert_eq!(cli.hosts, 3);
        assert_eq!(cli.evaluate, "H");
        assert_eq!(cli.runs, 1);
        assert!(!cli.clean_start);
        assert_eq!(cli.max_attempts, None);
    }

    #[test]
    fn test_missing_variant_is_rejected() {
        let err = Cli::try_parse_from(["testbed", "--hosts", "3"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_non_numeric_hosts_is_rejected() {
        let err =
            Cli::try_parse_from(["testbed", "--hosts", "many", "--evaluate", "A"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_flags_override_settings() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "testbed",
            "--hosts",
            "4",
            "--evaluate",
            "e",
            "--runs",
            "5",
            "--clean-start",
            "--project-dir",
            &project,
            "--keep-artifacts",
            "--readiness-timeout-secs",
            "7",
            "--max-attempts",
            "3",
        ])
        .unwrap();

        let settings = cli.settings().unwrap();
        assert_eq!(settings.project_dir, dir.path());
        assert!(settings.keep_artifacts);
        assert_eq!(settings.timing.readiness_timeout_secs, 7);
        assert_eq!(settings.timing.collector_timeout_secs, 120);
        assert_eq!(settings.timing.max_attempts_per_run, Some(3));

        let request = cli.request();
        assert_eq!(request.runs, 5);
        assert!(request.clean_start);
    }

    #[test]
    fn test_settings_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testbed.json");
        std::fs::write(
            &path,
            r#"{ "project_dir": "/srv/eval", "timing": { "collector_timeout_secs": 30 } }"#,
        )
        .unwrap();
        let path_arg = path.to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "testbed",
            "--hosts",
            "2",
            "--evaluate",
            "A",
            "--settings",
            &path_arg,
        ])
        .unwrap();

        let settings = cli.settings().unwrap();
        assert_eq!(settings.project_dir, PathBuf::from("/srv/eval"));
        assert_eq!(settings.timing.collector_timeout_secs, 30);
    }

    #[test]
    fn test_settings_file_without_project_dir_uses_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testbed.json");
        std::fs::write(&path, r#"{ "keep_artifacts": true }"#).unwrap();
        let path_arg = path.to_string_lossy().to_string();
        let project = dir.path().join("project");
        let project_arg = project.to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "testbed",
            "--hosts",
            "2",
            "--evaluate",
            "A",
            "--settings",
            &path_arg,
            "--project-dir",
            &project_arg,
        ])
        .unwrap();

        let settings = cli.settings().unwrap();
        assert_eq!(settings.project_dir, project);
        assert_eq!(settings.configs.dir, project.join("vsomeip-configs"));
        assert!(settings.keep_artifacts);
    }

    #[test]
    fn test_failure_message_distinguishes_setup_errors() {
        let setup = anyhow::Error::new(TestbedError::UnknownVariant("Z".to_string()))
            .context("Evaluation of variant Z on 3 hosts failed");
        assert_eq!(failure_message(&setup), "Evaluation rejected before setup");

        let run = anyhow::Error::new(TestbedError::RetriesExhausted {
            run_index: 1,
            attempts: 3,
        })
        .context("Evaluation of variant A on 3 hosts failed");
        assert_eq!(failure_message(&run), "Evaluation failed");

        let other = anyhow::anyhow!("summary could not be printed");
        assert_eq!(failure_message(&other), "Evaluation failed");
    }

    #[test]
    fn test_zero_max_attempts_is_invalid() {
        let cli = Cli::try_parse_from([
            "testbed",
            "--hosts",
            "2",
            "--evaluate",
            "A",
            "--max-attempts",
            "0",
        ])
        .unwrap();
        assert!(cli.settings().is_err());
    }
}

//! Build step execution.

use crate::error::{BuildError, Result};
use crate::spec::BuildSpec;
use crate::step::BuildStep;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Result of a step execution.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Step name.
    pub step_name: String,

    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl StepResult {
    /// Whether this step passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes build steps as child processes.
pub struct BuildRunner;

impl BuildRunner {
    /// Execute a single step with the build spec's placeholders and environment applied.
    pub async fn execute_step(
        step: &BuildStep,
        spec: &BuildSpec,
        description: &Path,
    ) -> Result<StepResult> {
        let start = Instant::now();

        let argv = step.render(spec, description);
        let (exe, args) = argv.split_first().ok_or_else(|| BuildError::EmptyCommand {
            step: step.name.clone(),
        })?;

        debug!(step = %step.name, command = %argv.join(" "), "Running build step");

        let mut command = Command::new(exe);
        command
            .args(args)
            .envs(spec.step_env(description))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &step.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| BuildError::Spawn {
            step: step.name.clone(),
            source,
        })?;

        let output = if step.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(step.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| BuildError::TimedOut {
                step: step.name.clone(),
                timeout_secs: step.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        Ok(StepResult {
            step_name: step.name.clone(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

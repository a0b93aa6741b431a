//! Build pipeline orchestration.

use crate::error::{BuildError, Result};
use crate::runner::{BuildRunner, StepResult};
use crate::spec::BuildSpec;
use crate::step::BuildStep;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// File name of the build description written into the build directory.
pub const DESCRIPTION_FILE: &str = "testbed-build.json";

/// Name of the define holding the number of subscriber contributions.
pub const SUBSCRIBER_COUNT_DEFINE: &str = "SUBSCRIBER_COUNT_TO_RECORD";

/// A `#define` in the workload sources kept in sync with the build spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefinePatch {
    /// Source file containing the define.
    pub file: PathBuf,

    /// Define name, e.g. `SUBSCRIBER_COUNT_TO_RECORD`.
    pub name: String,
}

/// Result of a complete build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Digest of the build specification.
    pub spec_digest: String,

    /// Where the build description was written.
    pub description_path: PathBuf,

    /// Results of the executed steps.
    pub steps: Vec<StepResult>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

/// The external build pipeline, invoked with an explicit [`BuildSpec`].
#[derive(Debug, Clone)]
pub struct BuildPipeline {
    pub build_dir: PathBuf,
    pub steps: Vec<BuildStep>,
    pub subscriber_define: Option<DefinePatch>,
}

impl BuildPipeline {
    pub fn new(build_dir: impl Into<PathBuf>, steps: Vec<BuildStep>) -> Self {
        Self {
            build_dir: build_dir.into(),
            steps,
            subscriber_define: None,
        }
    }

    /// Keep `#define SUBSCRIBER_COUNT_TO_RECORD` in `file` equal to the build spec's count.
    pub fn with_subscriber_define(mut self, file: impl Into<PathBuf>) -> Self {
        self.subscriber_define = Some(DefinePatch {
            file: file.into(),
            name: SUBSCRIBER_COUNT_DEFINE.to_string(),
        });
        self
    }

    /// Apply the build spec and build. The first failing step aborts with an error.
    pub async fn apply_and_build(&self, spec: &BuildSpec) -> Result<BuildReport> {
        let start = Instant::now();
        info!(
            target_branch = %spec.target,
            definitions = %spec.definitions_string(),
            digest = %spec.short_digest(),
            "Applying build spec"
        );

        tokio::fs::create_dir_all(&self.build_dir).await?;
        let description_path = self.build_dir.join(DESCRIPTION_FILE);
        tokio::fs::write(&description_path, serde_json::to_vec_pretty(spec)?).await?;

        if let Some(patch) = &self.subscriber_define {
            let changed = patch_define(&patch.file, &patch.name, &spec.subscriber_count.to_string())?;
            if changed {
                info!(file = ?patch.file, define = %patch.name, value = spec.subscriber_count, "Updated define");
            }
        }

        let mut results = Vec::new();
        for step in &self.steps {
            if !step.enabled {
                info!(step = %step.name, "Skipping disabled step");
                continue;
            }

            info!(step = %step.name, "Executing build step");
            let result = BuildRunner::execute_step(step, spec, &description_path).await?;
            if !result.passed() {
                warn!(step = %step.name, exit_code = result.exit_code, "Build step failed");
                return Err(BuildError::StepFailed {
                    step: result.step_name,
                    exit_code: result.exit_code,
                    stderr: result.stderr.trim().to_string(),
                });
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(duration_ms, steps = results.len(), "Build completed");

        Ok(BuildReport {
            spec_digest: spec.digest.clone(),
            description_path,
            steps: results,
            duration_ms,
        })
    }
}

/// Set `#define <name> <value>` in `file`.
///
/// Returns whether the file was rewritten. A file without the define is left
/// untouched.
pub fn patch_define(file: &Path, name: &str, value: &str) -> Result<bool> {
    let content = std::fs::read_to_string(file)?;
    let pattern = Regex::new(&format!(r"(?m)^#define {} (.*)$", regex::escape(name)))
        .map_err(|source| BuildError::DefinePattern {
            name: name.to_string(),
            source,
        })?;

    let current = match pattern.captures(&content) {
        Some(caps) => caps.get(1).map(|m| m.as_str().trim().to_string()),
        None => {
            warn!(file = ?file, define = %name, "Define not found");
            return Ok(false);
        }
    };
    if current.as_deref() == Some(value) {
        return Ok(false);
    }

    let replacement = format!("#define {name} {value}");
    let updated = pattern.replace_all(&content, regex::NoExpand(&replacement));
    std::fs::write(file, updated.as_bytes())?;
    Ok(true)
}

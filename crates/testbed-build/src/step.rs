//! Build step definitions and configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::spec::BuildSpec;

/// One command of the external build pipeline.
///
/// Arguments may contain the placeholders `{target}`, `{definitions}`,
/// `{subscriber_count}` and `{description}`, filled from the [`BuildSpec`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildStep {
    /// Human-readable step name.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Working directory; inherits the orchestrator's when unset.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Timeout in seconds (0 = none).
    pub timeout_secs: u64,

    /// Whether this step is enabled.
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl BuildStep {
    /// Switch the workload sources to the build spec's target.
    pub fn checkout(source_dir: &Path, timeout_secs: u64) -> Self {
        Self {
            name: "checkout".to_string(),
            command: vec![
                "git".to_string(),
                "-C".to_string(),
                source_dir.to_string_lossy().to_string(),
                "checkout".to_string(),
                "{target}".to_string(),
            ],
            working_dir: None,
            timeout_secs,
            enabled: true,
        }
    }

    /// Run a build script; it reads the build spec from the `TESTBED_*` environment.
    pub fn script(script: &Path, timeout_secs: u64) -> Self {
        Self {
            name: "build".to_string(),
            command: vec![script.to_string_lossy().to_string()],
            working_dir: script.parent().map(Path::to_path_buf),
            timeout_secs,
            enabled: true,
        }
    }

    /// Create a custom step.
    pub fn custom(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command,
            working_dir: None,
            timeout_secs,
            enabled: true,
        }
    }

    /// Disable this step.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Command with every placeholder substituted.
    pub fn render(&self, spec: &BuildSpec, description: &Path) -> Vec<String> {
        let definitions = spec.definitions_string();
        let count = spec.subscriber_count.to_string();
        let description = description.to_string_lossy();
        self.command
            .iter()
            .map(|arg| {
                arg.replace("{target}", &spec.target)
                    .replace("{definitions}", &definitions)
                    .replace("{subscriber_count}", &count)
                    .replace("{description}", &description)
            })
            .collect()
    }
}

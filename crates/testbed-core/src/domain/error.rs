//! Error taxonomy for the testbed.

use std::path::PathBuf;

use crate::domain::node::Role;

/// Testbed errors.
///
/// Everything except [`TestbedError::ReadinessTimeout`] aborts an evaluation;
/// the run loop turns a readiness timeout into a failed attempt.
#[derive(Debug, thiserror::Error)]
pub enum TestbedError {
    #[error("unknown variant: {0}")]
    UnknownVariant(String),

    #[error("invalid host count {0}: must be between 2 and 65535")]
    InvalidHostCount(u32),

    #[error("invalid run count {0}: at least one run is required")]
    InvalidRunCount(u32),

    #[error("invalid node name: {0}")]
    InvalidNodeName(String),

    #[error("role {0} has no configuration template")]
    NoTemplate(Role),

    #[error("role {0} has no certificate")]
    NoIdentity(Role),

    #[error("configuration template not found: {0:?}")]
    TemplateMissing(PathBuf),

    #[error("invalid configuration template {path:?}: {reason}")]
    TemplateInvalid { path: PathBuf, reason: String },

    #[error("no configuration for node {0}")]
    ConfigNotFound(String),

    #[error("certificate tool failed for {node} with exit code {exit_code}: {stderr}")]
    CertificateTool {
        node: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("resolver command `{command}` failed with exit code {exit_code}: {stderr}")]
    ResolverCommand {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("readiness marker {marker:?} did not appear within {waited_secs}s")]
    ReadinessTimeout { marker: PathBuf, waited_secs: u64 },

    #[error("run {run_index} failed {attempts} times in a row")]
    RetriesExhausted { run_index: u32, attempts: u32 },

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("build error: {0}")]
    Build(#[from] testbed_build::BuildError),

    #[error("network platform error: {0}")]
    Platform(#[from] testbed_net::NetError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TestbedError {
    /// Setup errors abort before any run starts; nothing needs cleaning up yet.
    pub fn is_fatal_setup(&self) -> bool {
        matches!(
            self,
            TestbedError::UnknownVariant(_)
                | TestbedError::InvalidHostCount(_)
                | TestbedError::InvalidRunCount(_)
                | TestbedError::Build(_)
                | TestbedError::Settings(_)
        )
    }
}

/// Result type for testbed operations.
pub type Result<T> = std::result::Result<T, TestbedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_testbed_error_display() {
        let err = TestbedError::UnknownVariant("Z".to_string());
        assert_eq!(err.to_string(), "unknown variant: Z");

        let err = TestbedError::InvalidHostCount(1);
        assert!(err.to_string().contains("between 2 and 65535"));

        let err = TestbedError::NoTemplate(Role::DnsResolver);
        assert!(err.to_string().contains("dns-resolver"));
    }

    #[test]
    fn test_readiness_timeout_display() {
        let err = TestbedError::ReadinessTimeout {
            marker: PathBuf::from("/tmp/ready"),
            waited_secs: 60,
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/ready"));
        assert!(msg.contains("60s"));
    }

    #[test]
    fn test_fatal_setup_classification() {
        assert!(TestbedError::UnknownVariant("Q".into()).is_fatal_setup());
        assert!(TestbedError::InvalidHostCount(0).is_fatal_setup());
        assert!(!TestbedError::RetriesExhausted {
            run_index: 1,
            attempts: 3
        }
        .is_fatal_setup());
    }

    #[test]
    fn test_build_error_converts() {
        let build = testbed_build::BuildError::StepFailed {
            step: "build".to_string(),
            exit_code: 1,
            stderr: "boom".to_string(),
        };
        let err: TestbedError = build.into();
        assert!(err.to_string().starts_with("build error"));
        assert!(err.is_fatal_setup());
    }
}

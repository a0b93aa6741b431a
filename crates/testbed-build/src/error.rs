//! Build errors. Every variant aborts the evaluation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build step {step} has an empty command")]
    EmptyCommand { step: String },

    #[error("build step {step} could not be started: {source}")]
    Spawn {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build step {step} timed out after {timeout_secs} seconds")]
    TimedOut { step: String, timeout_secs: u64 },

    #[error("build step {step} exited with code {exit_code}: {stderr}")]
    StepFailed {
        step: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("invalid define pattern for {name}: {source}")]
    DefinePattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_display() {
        let err = BuildError::StepFailed {
            step: "build".to_string(),
            exit_code: 2,
            stderr: "cmake: not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("build"));
        assert!(msg.contains("code 2"));
        assert!(msg.contains("cmake: not found"));
    }

    #[test]
    fn test_timed_out_display() {
        let err = BuildError::TimedOut {
            step: "checkout".to_string(),
            timeout_secs: 30,
        };
        assert!(err.to_string().contains("30 seconds"));
    }
}

//! Error types for testbed-net

use thiserror::Error;

/// Errors raised by a network platform or a supervised process
#[derive(Error, Debug)]
pub enum NetError {
    /// A platform command exited non-zero
    #[error("command `{command}` failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A platform command could not be started at all
    #[error("failed to run `{command}`: {source}")]
    CommandUnavailable {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A workload process could not be spawned
    #[error("failed to spawn process {name}: {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The host is not part of the emulated network
    #[error("unknown host: {0}")]
    UnknownHost(String),

    /// The address space for hosts is exhausted
    #[error("address space exhausted after {0} hosts")]
    AddressExhausted(u32),

    /// Empty argument vector passed to exec
    #[error("empty command")]
    EmptyCommand,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display() {
        let err = NetError::CommandFailed {
            command: "ovs-vsctl add-br s1".to_string(),
            exit_code: 1,
            stderr: "database connection failed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ovs-vsctl add-br s1"));
        assert!(msg.contains("exit code 1"));
    }

    #[test]
    fn test_unknown_host_display() {
        let err = NetError::UnknownHost("h9".to_string());
        assert_eq!(err.to_string(), "unknown host: h9");
    }
}

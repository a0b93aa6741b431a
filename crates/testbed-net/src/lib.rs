//! testbed-net: the emulated network behind an evaluation
//!
//! Defines the [`NetworkPlatform`] seam the orchestrator talks to: one switch,
//! hosts linked to it with a fixed [`LinkProfile`], per-host command execution
//! and supervised background processes ([`Supervised`]).
//!
//! ## Implementations
//!
//! - [`NetnsPlatform`]: Linux network namespaces, veth pairs, `tc netem`
//!   shaping and an Open vSwitch bridge.
//! - [`FakePlatform`]: in-memory recorder with scripted process exits, for tests.

pub mod error;
pub mod fakes;
pub mod netns;
pub mod process;

use std::net::Ipv4Addr;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::NetError;
pub use fakes::{FakePlatform, PlatformCall};
pub use netns::NetnsPlatform;
pub use process::ChildProcess;

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, NetError>;

/// Shaping parameters applied to every host-to-switch link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkProfile {
    /// Link rate in Mbit/s.
    pub bandwidth_mbit: u32,
    /// One-way delay in milliseconds.
    pub delay_ms: u32,
    /// Packet loss in percent.
    pub loss_percent: f32,
    /// Queue depth in packets.
    pub max_queue_size: u32,
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self {
            bandwidth_mbit: 1000,
            delay_ms: 0,
            loss_percent: 0.0,
            max_queue_size: 99_999,
        }
    }
}

/// Captured result of a short-lived command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Description of a long-running background process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Process-visible name, used for logging and supervision.
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// When set, stdout and stderr are appended to this file.
    pub output_path: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            output_path: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn output_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

/// Handle to a background process owned by the orchestrator.
#[async_trait]
pub trait Supervised: Send {
    /// Process-visible name given at launch.
    fn name(&self) -> &str;

    /// OS process id, if the process is still known to the OS.
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit and return its exit code (-1 when killed by a signal).
    async fn wait(&mut self) -> Result<i32>;

    /// Stop the process. Idempotent: terminating an exited process is a no-op.
    async fn terminate(&mut self) -> Result<()>;
}

/// The emulated network an evaluation runs on.
///
/// `host = None` in [`exec`](NetworkPlatform::exec) and
/// [`spawn`](NetworkPlatform::spawn) targets the orchestrator's own namespace.
#[async_trait]
pub trait NetworkPlatform: Send + Sync {
    async fn create_switch(&self, name: &str) -> Result<()>;

    /// Create a host linked to `switch` and return its assigned address.
    async fn create_host(&self, name: &str, switch: &str, link: &LinkProfile)
        -> Result<Ipv4Addr>;

    /// Program the switch to forward everything like a plain L2 hub.
    async fn install_forwarding(&self, switch: &str) -> Result<()>;

    async fn add_default_route(&self, host: &str, gateway: Ipv4Addr) -> Result<()>;

    /// Run a short-lived command to completion and capture its output.
    async fn exec(&self, host: Option<&str>, argv: &[String]) -> Result<CommandOutput>;

    /// Launch a background process.
    async fn spawn(&self, host: Option<&str>, spec: &LaunchSpec) -> Result<Box<dyn Supervised>>;

    /// Remove every switch and host this platform created.
    async fn destroy(&self) -> Result<()>;

    /// Remove leftovers of an earlier, crashed evaluation: the named switch
    /// and every namespace whose name starts with `host_prefix`.
    async fn purge(&self, switch: &str, host_prefix: &str) -> Result<()>;
}

/// Address of the `index`-th host (1-based) above `base`.
pub fn host_address(base: Ipv4Addr, index: u32) -> Result<Ipv4Addr> {
    u32::from(base)
        .checked_add(index)
        .map(Ipv4Addr::from)
        .ok_or(NetError::AddressExhausted(index))
}

/// Render an argument vector for log and error messages.
pub fn describe(argv: &[String]) -> String {
    argv.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_address_sequential() {
        let base = Ipv4Addr::new(10, 0, 0, 0);
        assert_eq!(host_address(base, 1).unwrap(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(host_address(base, 256).unwrap(), Ipv4Addr::new(10, 0, 1, 0));
        assert_eq!(
            host_address(base, 65_535).unwrap(),
            Ipv4Addr::new(10, 0, 255, 255)
        );
    }

    #[test]
    fn test_host_address_overflow() {
        let base = Ipv4Addr::new(255, 255, 255, 255);
        assert!(matches!(
            host_address(base, 1),
            Err(NetError::AddressExhausted(1))
        ));
    }

    #[test]
    fn test_link_profile_default_is_lossless() {
        let link = LinkProfile::default();
        assert_eq!(link.bandwidth_mbit, 1000);
        assert_eq!(link.delay_ms, 0);
        assert_eq!(link.loss_percent, 0.0);
        assert_eq!(link.max_queue_size, 99_999);
    }

    #[test]
    fn test_launch_spec_builder() {
        let spec = LaunchSpec::new("h1", "/opt/bin/my-publisher")
            .env("VSOMEIP_APPLICATION_NAME", "h1")
            .arg("--verbose")
            .output_to("/tmp/h1.out");
        assert_eq!(spec.args, vec!["--verbose".to_string()]);
        assert_eq!(spec.env.len(), 1);
        assert_eq!(spec.output_path, Some(PathBuf::from("/tmp/h1.out")));
    }
}

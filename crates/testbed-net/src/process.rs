//! Supervised OS processes and one-shot command execution.

use std::fs::OpenOptions;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::NetError;
use crate::{describe, CommandOutput, LaunchSpec, Result, Supervised};

/// A spawned child process, killed when dropped.
#[derive(Debug)]
pub struct ChildProcess {
    name: String,
    child: Child,
    exit_code: Option<i32>,
}

impl ChildProcess {
    /// Spawn `command` as a supervised process named `name`.
    pub fn spawn(name: impl Into<String>, mut command: Command) -> Result<Self> {
        let name = name.into();
        command.kill_on_drop(true);
        let child = command.spawn().map_err(|source| NetError::SpawnFailed {
            name: name.clone(),
            source,
        })?;
        debug!(process = %name, pid = ?child.id(), "Spawned process");
        Ok(Self {
            name,
            child,
            exit_code: None,
        })
    }
}

#[async_trait]
impl Supervised for ChildProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let status = self.child.wait().await?;
        let code = status.code().unwrap_or(-1);
        self.exit_code = Some(code);
        Ok(code)
    }

    async fn terminate(&mut self) -> Result<()> {
        if self.exit_code.is_some() {
            return Ok(());
        }
        if let Some(status) = self.child.try_wait()? {
            self.exit_code = Some(status.code().unwrap_or(-1));
            return Ok(());
        }
        self.child.start_kill()?;
        let status = self.child.wait().await?;
        self.exit_code = Some(status.code().unwrap_or(-1));
        debug!(process = %self.name, "Terminated process");
        Ok(())
    }
}

/// Build the command for `spec`, prefixed with `prefix` (e.g. `ip netns exec h1`).
pub fn launch_command(prefix: &[String], spec: &LaunchSpec) -> Result<Command> {
    let mut command = match prefix.split_first() {
        Some((exe, rest)) => {
            let mut command = Command::new(exe);
            command.args(rest).arg(&spec.program);
            command
        }
        None => Command::new(&spec.program),
    };
    command
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null());

    match &spec.output_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let err = file.try_clone()?;
            command.stdout(Stdio::from(file)).stderr(Stdio::from(err));
        }
        None => {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }
    Ok(command)
}

/// Run `argv` to completion, capturing its output. Non-zero exits are returned, not raised.
pub async fn run_command(argv: &[String]) -> Result<CommandOutput> {
    let (exe, args) = argv.split_first().ok_or(NetError::EmptyCommand)?;
    let output = Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| NetError::CommandUnavailable {
            command: describe(argv),
            source,
        })?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Run `argv` and fail with [`NetError::CommandFailed`] on a non-zero exit.
pub async fn run_checked(argv: &[String]) -> Result<CommandOutput> {
    let output = run_command(argv).await?;
    if !output.success() {
        return Err(NetError::CommandFailed {
            command: describe(argv),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_command_captures_stdout() {
        let output = run_command(&argv(&["echo", "hello"])).await.unwrap();
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_checked_rejects_failure() {
        let err = run_checked(&argv(&["false"])).await.unwrap_err();
        assert!(matches!(err, NetError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_run_command_empty() {
        assert!(matches!(
            run_command(&[]).await,
            Err(NetError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn test_child_process_exit_code() {
        let spec = LaunchSpec::new("exit3", "sh").arg("-c").arg("exit 3");
        let command = launch_command(&[], &spec).unwrap();
        let mut child = ChildProcess::spawn("exit3", command).unwrap();
        assert_eq!(child.wait().await.unwrap(), 3);
        // Cached after the first wait.
        assert_eq!(child.wait().await.unwrap(), 3);
        child.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_child_process_terminate_long_running() {
        let spec = LaunchSpec::new("sleeper", "sleep").arg("30");
        let command = launch_command(&[], &spec).unwrap();
        let mut child = ChildProcess::spawn("sleeper", command).unwrap();
        assert!(child.id().is_some());
        child.terminate().await.unwrap();
        assert_eq!(child.wait().await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_launch_command_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("echo.log");
        let spec = LaunchSpec::new("echo", "sh")
            .arg("-c")
            .arg("echo $GREETING")
            .env("GREETING", "hi-there")
            .output_to(&log);
        let command = launch_command(&[], &spec).unwrap();
        let mut child = ChildProcess::spawn("echo", command).unwrap();
        assert_eq!(child.wait().await.unwrap(), 0);
        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("hi-there"));
    }

    #[test]
    fn test_spawn_missing_binary_fails() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let spec = LaunchSpec::new("ghost", "/nonexistent/ghost-binary");
            let command = launch_command(&[], &spec).unwrap();
            let err = ChildProcess::spawn("ghost", command).unwrap_err();
            assert!(matches!(err, NetError::SpawnFailed { .. }));
        });
    }
}

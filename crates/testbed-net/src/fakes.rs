//! In-memory fake platform (testing only)
//!
//! `FakePlatform` records every call, hands out sequential `10.0.0.x`
//! addresses and returns supervised handles whose exit codes are scripted
//! per program. Programs can also be configured to create a file when
//! spawned, which is how a fake publisher signals readiness.

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::NetError;
use crate::{host_address, CommandOutput, LaunchSpec, LinkProfile, NetworkPlatform, Result, Supervised};

/// One recorded interaction with the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    CreateSwitch(String),
    CreateHost { name: String, switch: String },
    InstallForwarding(String),
    DefaultRoute { host: String, gateway: Ipv4Addr },
    Exec { host: Option<String>, argv: Vec<String> },
    Spawn { host: Option<String>, spec: LaunchSpec },
    Terminate(String),
    Destroy,
    Purge { switch: String, host_prefix: String },
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<PlatformCall>,
    hosts: Vec<(String, Ipv4Addr)>,
    switches: Vec<String>,
    exit_scripts: HashMap<PathBuf, VecDeque<Option<i32>>>,
    spawn_files: HashMap<PathBuf, PathBuf>,
    exec_failures: HashMap<String, i32>,
    running: Vec<String>,
}

/// Recording platform with scripted process behaviour.
#[derive(Debug, Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<FakeState>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the exit codes of successive spawns of `program`.
    ///
    /// `None` means the process never exits on its own. Once the script is
    /// exhausted, further spawns never exit either.
    pub fn script_exits(
        &self,
        program: impl Into<PathBuf>,
        codes: impl IntoIterator<Item = Option<i32>>,
    ) {
        let mut state = self.state.lock().unwrap();
        state
            .exit_scripts
            .entry(program.into())
            .or_default()
            .extend(codes);
    }

    /// Create `path` whenever `program` is spawned.
    pub fn touch_on_spawn(&self, program: impl Into<PathBuf>, path: impl Into<PathBuf>) {
        let mut state = self.state.lock().unwrap();
        state.spawn_files.insert(program.into(), path.into());
    }

    /// Make `exec` of a command whose first argument is `program` exit with `code`.
    pub fn fail_exec(&self, program: impl Into<String>, code: i32) {
        let mut state = self.state.lock().unwrap();
        state.exec_failures.insert(program.into(), code);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Hosts currently in the network with their addresses.
    pub fn hosts(&self) -> Vec<(String, Ipv4Addr)> {
        self.state.lock().unwrap().hosts.clone()
    }

    /// Launch specs of every spawn of `program`.
    pub fn spawns_of(&self, program: &Path) -> Vec<(Option<String>, LaunchSpec)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Spawn { host, spec } if spec.program == program => {
                    Some((host, spec))
                }
                _ => None,
            })
            .collect()
    }

    /// `exec` argument vectors whose first element is `program`.
    pub fn execs_of(&self, program: &str) -> Vec<(Option<String>, Vec<String>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Exec { host, argv } if argv.first().map(String::as_str) == Some(program) => {
                    Some((host, argv))
                }
                _ => None,
            })
            .collect()
    }

    /// Names of processes spawned and neither exited nor terminated.
    pub fn running(&self) -> Vec<String> {
        self.state.lock().unwrap().running.clone()
    }

    /// Number of `Terminate` calls recorded.
    pub fn terminations(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, PlatformCall::Terminate(_)))
            .count()
    }

    pub fn is_destroyed(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.calls.contains(&PlatformCall::Destroy) && state.hosts.is_empty()
    }

    fn record(&self, call: PlatformCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

/// Scripted process handed out by [`FakePlatform::spawn`].
#[derive(Debug)]
struct FakeProcess {
    name: String,
    exit_code: Option<i32>,
    finished: bool,
    state: Arc<Mutex<FakeState>>,
}

impl FakeProcess {
    fn mark_stopped(&mut self) {
        self.finished = true;
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.running.iter().position(|n| n == &self.name) {
            state.running.remove(pos);
        }
    }
}

#[async_trait]
impl Supervised for FakeProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<u32> {
        None
    }

    async fn wait(&mut self) -> Result<i32> {
        match self.exit_code {
            Some(code) => {
                if !self.finished {
                    self.mark_stopped();
                }
                Ok(code)
            }
            None => std::future::pending().await,
        }
    }

    async fn terminate(&mut self) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(PlatformCall::Terminate(self.name.clone()));
        if !self.finished {
            self.mark_stopped();
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkPlatform for FakePlatform {
    async fn create_switch(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.switches.push(name.to_string());
        state.calls.push(PlatformCall::CreateSwitch(name.to_string()));
        Ok(())
    }

    async fn create_host(
        &self,
        name: &str,
        switch: &str,
        _link: &LinkProfile,
    ) -> Result<Ipv4Addr> {
        let mut state = self.state.lock().unwrap();
        if !state.switches.iter().any(|s| s == switch) {
            return Err(NetError::UnknownHost(switch.to_string()));
        }
        let index = state.hosts.len() as u32 + 1;
        let address = host_address(Ipv4Addr::new(10, 0, 0, 0), index)?;
        state.hosts.push((name.to_string(), address));
        state.calls.push(PlatformCall::CreateHost {
            name: name.to_string(),
            switch: switch.to_string(),
        });
        Ok(address)
    }

    async fn install_forwarding(&self, switch: &str) -> Result<()> {
        self.record(PlatformCall::InstallForwarding(switch.to_string()));
        Ok(())
    }

    async fn add_default_route(&self, host: &str, gateway: Ipv4Addr) -> Result<()> {
        self.record(PlatformCall::DefaultRoute {
            host: host.to_string(),
            gateway,
        });
        Ok(())
    }

    async fn exec(&self, host: Option<&str>, argv: &[String]) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(PlatformCall::Exec {
            host: host.map(str::to_string),
            argv: argv.to_vec(),
        });
        let exit_code = argv
            .first()
            .and_then(|program| state.exec_failures.get(program).copied())
            .unwrap_or(0);
        Ok(CommandOutput {
            exit_code,
            ..CommandOutput::default()
        })
    }

    async fn spawn(&self, host: Option<&str>, spec: &LaunchSpec) -> Result<Box<dyn Supervised>> {
        let (exit_code, touch) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(PlatformCall::Spawn {
                host: host.map(str::to_string),
                spec: spec.clone(),
            });
            let exit_code = state
                .exit_scripts
                .get_mut(&spec.program)
                .and_then(VecDeque::pop_front)
                .flatten();
            let touch = state.spawn_files.get(&spec.program).cloned();
            if exit_code.is_none() {
                state.running.push(spec.name.clone());
            }
            (exit_code, touch)
        };

        if let Some(path) = touch {
            std::fs::write(&path, b"ready")?;
        }

        Ok(Box::new(FakeProcess {
            name: spec.name.clone(),
            exit_code,
            finished: exit_code.is_some(),
            state: self.state.clone(),
        }))
    }

    async fn destroy(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.hosts.clear();
        state.switches.clear();
        state.calls.push(PlatformCall::Destroy);
        Ok(())
    }

    async fn purge(&self, switch: &str, host_prefix: &str) -> Result<()> {
        self.record(PlatformCall::Purge {
            switch: switch.to_string(),
            host_prefix: host_prefix.to_string(),
        });
        Ok(())
    }
}

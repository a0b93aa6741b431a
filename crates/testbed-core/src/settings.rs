//! Evaluation settings.
//!
//! Every path, command and timing knob of an evaluation lives here. Defaults
//! are derived from a project root with [`Settings::for_project`]; a JSON
//! settings file only needs to name what differs from them.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use testbed_build::{BuildPipeline, BuildStep};
use testbed_net::LinkProfile;

use crate::domain::error::{Result, TestbedError};

/// Project root used when nothing else is configured.
pub const DEFAULT_PROJECT_DIR: &str = ".";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub project_dir: PathBuf,
    pub network: NetworkSettings,
    pub configs: ConfigSettings,
    pub certificates: CertificateSettings,
    pub resolver: ResolverSettings,
    pub workload: WorkloadSettings,
    pub build: BuildSettings,
    pub timing: TimingSettings,
    /// Keep node configs and certificates after teardown.
    pub keep_artifacts: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub switch: String,
    /// Node names are `<host_prefix><index>`.
    pub host_prefix: String,
    pub address_base: Ipv4Addr,
    pub prefix_len: u8,
    /// Default route of every node, reached through `<node>-eth0`.
    pub gateway: Ipv4Addr,
    pub link: LinkProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSettings {
    /// Directory holding the templates and the per-node configs.
    pub dir: PathBuf,
    pub publisher_template: PathBuf,
    pub subscriber_template: PathBuf,
    /// Directory of the per-node workload log files.
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateSettings {
    pub dir: PathBuf,
    pub service_tool: PathBuf,
    pub client_tool: PathBuf,
    pub service_id: u16,
    pub instance_id: u16,
    pub major_version: u8,
    pub minor_version: u32,
    pub publisher_port: u16,
    /// Comma-separated, passed to the client tool verbatim.
    pub subscriber_ports: String,
    pub protocol: String,
}

/// An `A` record in a zone file that must point at the resolver node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub file: PathBuf,
    /// Owner name as written in the zone, e.g. `ns.service.`.
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverSettings {
    pub config_file: PathBuf,
    pub zone_records: Vec<ZoneRecord>,
    /// Restores pristine zone files. Empty disables the reset.
    pub reset_command: Vec<String>,
    pub setup_command: Vec<String>,
    /// `{config}` is replaced with `config_file`.
    pub start_command: Vec<String>,
    pub stop_command: Vec<String>,
    pub kill_command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSettings {
    pub publisher_binary: PathBuf,
    pub subscriber_binary: PathBuf,
    pub collector_binary: PathBuf,
    pub statistics_dir: PathBuf,
    /// Created by the publisher once it is initialised.
    pub readiness_marker: PathBuf,
    /// Directory where the workload leaves its per-node sockets.
    pub runtime_dir: PathBuf,
    pub runtime_artifact_prefix: String,
    pub config_env: String,
    pub name_env: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Set to false to reuse the current build tree.
    pub enabled: bool,
    pub build_dir: PathBuf,
    /// Source file carrying `#define SUBSCRIBER_COUNT_TO_RECORD`.
    pub subscriber_define_file: Option<PathBuf>,
    pub steps: Vec<BuildStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSettings {
    pub poll_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub readiness_timeout_secs: u64,
    pub collector_timeout_secs: u64,
    /// `None` retries a failing run forever.
    pub max_attempts_per_run: Option<u32>,
}

impl Settings {
    /// Defaults laid out below `project_dir`.
    pub fn for_project(project_dir: impl Into<PathBuf>) -> Self {
        let root: PathBuf = project_dir.into();
        Self {
            network: NetworkSettings::default(),
            configs: ConfigSettings::for_project(&root),
            certificates: CertificateSettings::for_project(&root),
            resolver: ResolverSettings::for_project(&root),
            workload: WorkloadSettings::for_project(&root),
            build: BuildSettings::for_project(&root),
            timing: TimingSettings::default(),
            keep_artifacts: false,
            project_dir: root,
        }
    }

    /// Load a settings file on top of the defaults of its `project_dir`,
    /// or of `default_root` when the file names none.
    pub fn load(path: &Path, default_root: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content, default_root)
    }

    pub fn from_json(content: &str, default_root: &Path) -> Result<Self> {
        let overlay: Value = serde_json::from_str(content)?;
        if !overlay.is_object() {
            return Err(TestbedError::Settings(
                "settings must be a JSON object".to_string(),
            ));
        }
        let project_dir = overlay
            .get("project_dir")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_root.to_path_buf());

        let mut merged = serde_json::to_value(Self::for_project(project_dir))?;
        merge_json(&mut merged, overlay);
        let settings: Settings = serde_json::from_value(merged)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.host_prefix.is_empty() {
            return Err(TestbedError::Settings("host_prefix is empty".to_string()));
        }
        if self.timing.poll_interval_ms == 0 {
            return Err(TestbedError::Settings(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.timing.max_attempts_per_run == Some(0) {
            return Err(TestbedError::Settings(
                "max_attempts_per_run must be positive".to_string(),
            ));
        }
        if self.resolver.start_command.is_empty() {
            return Err(TestbedError::Settings(
                "resolver start_command is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The build pipeline described by these settings.
    pub fn build_pipeline(&self) -> BuildPipeline {
        let pipeline = BuildPipeline::new(&self.build.build_dir, self.build.steps.clone());
        match &self.build.subscriber_define_file {
            Some(file) => pipeline.with_subscriber_define(file),
            None => pipeline,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::for_project(DEFAULT_PROJECT_DIR)
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            switch: "s1".to_string(),
            host_prefix: "h".to_string(),
            address_base: Ipv4Addr::new(10, 0, 0, 0),
            prefix_len: 8,
            gateway: Ipv4Addr::new(10, 0, 0, 0),
            link: LinkProfile::default(),
        }
    }
}

impl ConfigSettings {
    fn for_project(root: &Path) -> Self {
        let dir = root.join("vsomeip-configs");
        Self {
            publisher_template: dir.join("vsomeip-udp-mininet-publisher.json"),
            subscriber_template: dir.join("vsomeip-udp-mininet-subscriber.json"),
            log_dir: PathBuf::from("/var/log"),
            dir,
        }
    }
}

impl CertificateSettings {
    fn for_project(root: &Path) -> Self {
        Self {
            dir: root.join("certificates"),
            service_tool: root.join("service-svcb-and-tlsa-generator.bash"),
            client_tool: root.join("client-svcb-and-tlsa-generator.bash"),
            service_id: 0x1234,
            instance_id: 0x5678,
            major_version: 0,
            minor_version: 0,
            publisher_port: 30509,
            subscriber_ports: "40000,40002".to_string(),
            protocol: "UDP".to_string(),
        }
    }
}

impl ResolverSettings {
    fn for_project(root: &Path) -> Self {
        let zones = root.join("zones");
        Self {
            config_file: root.join("nsd").join("nsd.conf"),
            zone_records: vec![
                ZoneRecord {
                    file: zones.join("service.zone"),
                    owner: "ns.service.".to_string(),
                },
                ZoneRecord {
                    file: zones.join("client.zone"),
                    owner: "ns.client.".to_string(),
                },
            ],
            reset_command: vec![root
                .join("reset-zone-file.bash")
                .to_string_lossy()
                .to_string()],
            setup_command: vec!["nsd-control-setup".to_string()],
            start_command: vec!["nsd".to_string(), "-c".to_string(), "{config}".to_string()],
            stop_command: vec!["nsd-control".to_string(), "stop".to_string()],
            kill_command: vec!["pkill".to_string(), "nsd".to_string()],
        }
    }
}

impl WorkloadSettings {
    fn for_project(root: &Path) -> Self {
        let build = root.join("vsomeip").join("build");
        Self {
            publisher_binary: build.join("examples").join("my-publisher"),
            subscriber_binary: build.join("examples").join("my-subscriber"),
            collector_binary: build
                .join("implementation")
                .join("statistics")
                .join("statistics-writer-main"),
            statistics_dir: root.join("statistic-results"),
            readiness_marker: root.join("publisher.ready"),
            runtime_dir: root.to_path_buf(),
            runtime_artifact_prefix: "vsomeip-h".to_string(),
            config_env: "VSOMEIP_CONFIGURATION".to_string(),
            name_env: "VSOMEIP_APPLICATION_NAME".to_string(),
        }
    }
}

impl BuildSettings {
    fn for_project(root: &Path) -> Self {
        let source = root.join("vsomeip");
        Self {
            enabled: true,
            build_dir: source.join("build"),
            subscriber_define_file: Some(
                source
                    .join("implementation")
                    .join("service_discovery")
                    .join("src")
                    .join("service_discovery_impl.cpp"),
            ),
            steps: vec![
                BuildStep::checkout(&source, 120),
                BuildStep::script(&root.join("build_vsomeip.bash"), 3600),
            ],
        }
    }
}

impl TimingSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs(self.collector_timeout_secs)
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            settle_delay_ms: 3000,
            readiness_timeout_secs: 60,
            collector_timeout_secs: 120,
            max_attempts_per_run: None,
        }
    }
}

/// Recursively overlay `overlay` onto `base`. Objects merge key by key;
/// everything else is replaced.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

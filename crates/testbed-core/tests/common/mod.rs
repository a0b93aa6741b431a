//! Shared fixture: a throwaway project tree driven through the fake platform.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use testbed_core::Settings;
use testbed_net::{FakePlatform, NetworkPlatform};

pub const PUBLISHER_TEMPLATE: &str = r#"{
    "unicast": "127.0.0.1",
    "network": "-template",
    "logging": { "level": "info", "console": "true" },
    "applications": [ { "name": "publisher", "id": "0x0000" } ],
    "routing": "publisher"
}"#;

pub const SUBSCRIBER_TEMPLATE: &str = r#"{
    "unicast": "127.0.0.1",
    "network": "-template",
    "logging": { "level": "info", "console": "true" },
    "applications": [ { "name": "subscriber", "id": "0x0000" } ],
    "routing": "subscriber"
}"#;

pub const NSD_CONF: &str = "server:\n    ip-address: 127.0.0.1 # mininet-host-ip\n";
pub const SERVICE_ZONE: &str = "$ORIGIN service.\nns.service.   IN   A   127.0.0.1\n";
pub const CLIENT_ZONE: &str = "$ORIGIN client.\nns.client.   IN   A   127.0.0.1\n";

pub struct Fixture {
    pub dir: TempDir,
    pub settings: Settings,
    pub fake: FakePlatform,
}

impl Fixture {
    /// Project tree with templates and resolver files, no build, fast timing.
    /// The fake publisher touches the readiness marker when spawned.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut settings = Settings::for_project(root);
        settings.build.enabled = false;
        settings.configs.log_dir = root.join("logs");
        settings.timing.poll_interval_ms = 10;
        settings.timing.settle_delay_ms = 0;
        settings.timing.readiness_timeout_secs = 1;
        settings.timing.collector_timeout_secs = 1;

        std::fs::create_dir_all(&settings.configs.log_dir).unwrap();
        std::fs::create_dir_all(&settings.configs.dir).unwrap();
        std::fs::write(&settings.configs.publisher_template, PUBLISHER_TEMPLATE).unwrap();
        std::fs::write(&settings.configs.subscriber_template, SUBSCRIBER_TEMPLATE).unwrap();
        write_resolver_files(root);

        let fake = FakePlatform::new();
        fake.touch_on_spawn(
            &settings.workload.publisher_binary,
            &settings.workload.readiness_marker,
        );

        Self {
            dir,
            settings,
            fake,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn platform(&self) -> Arc<dyn NetworkPlatform> {
        Arc::new(self.fake.clone())
    }

    /// Script the statistics collector's exit codes, one per attempt.
    pub fn collector_exits(&self, codes: impl IntoIterator<Item = Option<i32>>) {
        self.fake
            .script_exits(&self.settings.workload.collector_binary, codes);
    }
}

fn write_resolver_files(root: &Path) {
    std::fs::create_dir_all(root.join("nsd")).unwrap();
    std::fs::create_dir_all(root.join("zones")).unwrap();
    std::fs::write(root.join("nsd/nsd.conf"), NSD_CONF).unwrap();
    std::fs::write(root.join("zones/service.zone"), SERVICE_ZONE).unwrap();
    std::fs::write(root.join("zones/client.zone"), CLIENT_ZONE).unwrap();
}

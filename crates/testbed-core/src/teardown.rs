//! Teardown at the end of an evaluation and clean starts before one.

use std::sync::Arc;

use testbed_net::NetworkPlatform;
use tracing::info;

use crate::artifacts::{remove_file_if_exists, remove_matching, remove_prefixed};
use crate::dns::DnsCoordinator;
use crate::domain::error::Result;
use crate::domain::node::parse_suffix;
use crate::node_config::NodeConfigStore;
use crate::obs;
use crate::settings::Settings;

/// What a teardown or clean start removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownSummary {
    pub hosts_removed: usize,
    pub configs_removed: usize,
    pub certificates_removed: usize,
    pub files_removed: usize,
}

impl TeardownSummary {
    pub fn artifacts_removed(&self) -> usize {
        self.configs_removed + self.certificates_removed + self.files_removed
    }
}

pub struct Teardown<'a> {
    platform: Arc<dyn NetworkPlatform>,
    store: &'a NodeConfigStore,
    settings: &'a Settings,
}

impl<'a> Teardown<'a> {
    pub fn new(
        platform: Arc<dyn NetworkPlatform>,
        store: &'a NodeConfigStore,
        settings: &'a Settings,
    ) -> Self {
        Self {
            platform,
            store,
            settings,
        }
    }

    /// Stop the resolver, destroy the network and remove node artifacts
    /// unless they are kept for the next invocation.
    pub async fn run(
        &self,
        hosts: usize,
        dns: Option<&mut DnsCoordinator>,
    ) -> Result<TeardownSummary> {
        if let Some(dns) = dns {
            if dns.needs_stop() {
                dns.stop().await;
            }
            if let Err(e) = dns.reset_zones().await {
                obs::emit_best_effort_failure("teardown.reset_zones", &e);
            }
        }

        self.platform.destroy().await?;

        let mut summary = TeardownSummary {
            hosts_removed: hosts,
            ..TeardownSummary::default()
        };
        summary.files_removed += self.remove_run_files()?;
        if self.settings.keep_artifacts {
            info!("Keeping node configs and certificates");
        } else {
            self.remove_node_artifacts(&mut summary)?;
        }

        obs::emit_teardown(summary.hosts_removed, summary.artifacts_removed());
        Ok(summary)
    }

    /// Remove everything a crashed evaluation may have left behind.
    pub async fn clean_start(&self) -> Result<TeardownSummary> {
        let network = &self.settings.network;
        self.platform
            .purge(&network.switch, &network.host_prefix)
            .await?;

        let mut summary = TeardownSummary::default();
        summary.files_removed += self.remove_run_files()?;
        self.remove_node_artifacts(&mut summary)?;

        info!(
            artifacts_removed = summary.artifacts_removed(),
            "Clean start"
        );
        Ok(summary)
    }

    /// Readiness marker, per-node logs and captured output, runtime sockets.
    fn remove_run_files(&self) -> Result<usize> {
        let workload = &self.settings.workload;
        let prefix = &self.settings.network.host_prefix;

        let mut removed = usize::from(remove_file_if_exists(&workload.readiness_marker)?);
        removed += remove_matching(&self.settings.configs.log_dir, |name| {
            name.strip_suffix(".log")
                .or_else(|| name.strip_suffix(".out"))
                .is_some_and(|stem| parse_suffix(prefix, stem).is_ok())
        })?;
        removed += remove_prefixed(&workload.runtime_dir, &workload.runtime_artifact_prefix)?;
        Ok(removed)
    }

    fn remove_node_artifacts(&self, summary: &mut TeardownSummary) -> Result<()> {
        summary.configs_removed = self.store.remove_all()?;
        summary.certificates_removed =
            remove_matching(&self.settings.certificates.dir, |_| true)?;
        Ok(())
    }
}

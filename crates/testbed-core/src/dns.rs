//! Resolver coordination for variants that need name resolution.
//!
//! The resolver daemon and its zone files are external. This module only
//! rewrites the well-known placeholder lines with the resolver node's
//! address, starts and stops the daemon on that node, and tells every
//! workload node where the resolver lives.

use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;

use regex::{NoExpand, Regex};
use testbed_net::{describe, NetworkPlatform};
use tracing::{debug, info, warn};

use crate::domain::error::{Result, TestbedError};
use crate::domain::node::{packed_ipv4_literal, Node};
use crate::node_config::NodeConfigStore;
use crate::obs;
use crate::settings::ResolverSettings;
use crate::topology::Topology;

/// Trailing marker of the listen-address line in the resolver config.
pub const HOST_IP_MARKER: &str = "# mininet-host-ip";

/// Replace the listen-address placeholder line with `address`.
pub fn patch_listen_address(content: &str, address: Ipv4Addr) -> Result<String> {
    let pattern = Regex::new(&format!(r"(?m)^.* {}[ \t]*$", regex::escape(HOST_IP_MARKER)))
        .map_err(|e| TestbedError::Settings(format!("listen address marker: {e}")))?;
    let line = format!("    ip-address: {address} {HOST_IP_MARKER}");
    Ok(pattern.replace_all(content, NoExpand(&line)).into_owned())
}

/// Point the `A` record of `owner` at `address`, keeping the column layout.
pub fn patch_a_record(content: &str, owner: &str, address: Ipv4Addr) -> Result<String> {
    let pattern = Regex::new(&format!(
        r"(?m)^({}[ \t]+IN[ \t]+A[ \t]+)\S.*$",
        regex::escape(owner)
    ))
    .map_err(|e| TestbedError::Settings(format!("zone record owner {owner:?}: {e}")))?;
    Ok(pattern
        .replace_all(content, |caps: &regex::Captures| format!("{}{address}", &caps[1]))
        .into_owned())
}

/// Rewrite `path` with `patch`, leaving it untouched when nothing changes.
fn rewrite(path: &Path, patch: impl FnOnce(&str) -> Result<String>) -> Result<bool> {
    let content = std::fs::read_to_string(path)?;
    let updated = patch(&content)?;
    if updated == content {
        return Ok(false);
    }
    std::fs::write(path, updated)?;
    Ok(true)
}

/// Owns the resolver daemon for one evaluation.
pub struct DnsCoordinator {
    platform: Arc<dyn NetworkPlatform>,
    settings: ResolverSettings,
    node: Node,
    /// Set once the daemon may have been launched, cleared by `stop`.
    started: bool,
}

impl DnsCoordinator {
    pub fn new(platform: Arc<dyn NetworkPlatform>, settings: ResolverSettings, node: Node) -> Self {
        Self {
            platform,
            settings,
            node,
            started: false,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Whether a start was attempted since the last stop. A failed start
    /// still counts: the daemon may be half up.
    pub fn needs_stop(&self) -> bool {
        self.started
    }

    /// Restore pristine zone files with the configured reset command.
    pub async fn reset_zones(&self) -> Result<()> {
        if self.settings.reset_command.is_empty() {
            return Ok(());
        }
        let output = self.platform.exec(None, &self.settings.reset_command).await?;
        if !output.success() {
            warn!(
                command = %describe(&self.settings.reset_command),
                exit_code = output.exit_code,
                "Zone reset failed"
            );
        }
        Ok(())
    }

    /// Write the resolver address into its config and zone files.
    pub fn patch_files(&self) -> Result<()> {
        let address = self.node.address;
        if rewrite(&self.settings.config_file, |c| patch_listen_address(c, address))? {
            debug!(file = ?self.settings.config_file, "Patched resolver listen address");
        }
        for record in &self.settings.zone_records {
            if rewrite(&record.file, |c| patch_a_record(c, &record.owner, address))? {
                debug!(file = ?record.file, owner = %record.owner, "Patched zone record");
            }
        }
        Ok(())
    }

    async fn run_checked(&self, argv: &[String]) -> Result<()> {
        let output = self.platform.exec(Some(&self.node.name), argv).await?;
        if output.success() {
            Ok(())
        } else {
            Err(TestbedError::ResolverCommand {
                command: describe(argv),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Patch the resolver files and start the daemon on the resolver node.
    pub async fn start(&mut self) -> Result<()> {
        self.patch_files()?;
        self.started = true;
        if !self.settings.setup_command.is_empty() {
            self.run_checked(&self.settings.setup_command).await?;
        }

        let config = self.settings.config_file.to_string_lossy().to_string();
        let start: Vec<String> = self
            .settings
            .start_command
            .iter()
            .map(|arg| arg.replace("{config}", &config))
            .collect();
        self.run_checked(&start).await?;

        info!(node = %self.node.name, address = %self.node.address, "Resolver started");
        Ok(())
    }

    /// Stop the daemon: control command first, then a forced kill.
    ///
    /// Never fails; either command failing is only logged.
    pub async fn stop(&mut self) {
        for argv in [&self.settings.stop_command, &self.settings.kill_command] {
            if argv.is_empty() {
                continue;
            }
            match self.platform.exec(Some(&self.node.name), argv).await {
                Ok(output) if output.success() => {}
                Ok(output) => debug!(
                    command = %describe(argv),
                    exit_code = output.exit_code,
                    "Resolver stop command failed"
                ),
                Err(e) => obs::emit_best_effort_failure("resolver.stop", &e),
            }
        }
        self.started = false;
        info!(node = %self.node.name, "Resolver stopped");
    }

    /// Record the resolver address in every workload node's config.
    pub fn inject_address(&self, store: &NodeConfigStore, topology: &Topology) -> Result<usize> {
        let literal = packed_ipv4_literal(self.node.address);
        let mut patched = 0;
        for node in topology.workload_nodes() {
            store.update(&node.name, |config| config.set_dns_server(&literal))?;
            patched += 1;
        }
        info!(dns_server = %literal, nodes = patched, "Injected resolver address");
        Ok(patched)
    }
}

//! Linux namespace platform
//!
//! Each host is a network namespace connected to an Open vSwitch bridge
//! through a veth pair. The host-side interface is `<host>-eth0`, the
//! switch-side one `<switch>-eth<port>`. Links are shaped with a single
//! `tc netem` qdisc (rate, delay, loss, queue limit).
//!
//! Requires root, `iproute2` and Open vSwitch on the orchestrator machine.

use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::NetError;
use crate::process::{launch_command, run_checked, run_command, ChildProcess};
use crate::{host_address, CommandOutput, LaunchSpec, LinkProfile, NetworkPlatform, Result, Supervised};

#[derive(Debug, Default)]
struct NetnsState {
    switches: Vec<(String, u32)>,
    hosts: Vec<String>,
}

/// Network platform backed by `ip netns`, veth pairs and Open vSwitch.
#[derive(Debug)]
pub struct NetnsPlatform {
    address_base: Ipv4Addr,
    prefix_len: u8,
    state: Mutex<NetnsState>,
}

impl Default for NetnsPlatform {
    fn default() -> Self {
        Self::new(Ipv4Addr::new(10, 0, 0, 0), 8)
    }
}

impl NetnsPlatform {
    /// Hosts get `address_base + n` for the n-th created host.
    pub fn new(address_base: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            address_base,
            prefix_len,
            state: Mutex::new(NetnsState::default()),
        }
    }

    fn next_host(&self, name: &str) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.hosts.push(name.to_string());
        state.hosts.len() as u32
    }

    fn next_port(&self, switch: &str) -> Result<u32> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .switches
            .iter_mut()
            .find(|(name, _)| name == switch)
            .ok_or_else(|| NetError::UnknownHost(switch.to_string()))?;
        entry.1 += 1;
        Ok(entry.1)
    }

    fn has_host(&self, host: &str) -> bool {
        self.state.lock().unwrap().hosts.iter().any(|h| h == host)
    }

    fn netns_prefix(&self, host: Option<&str>) -> Result<Vec<String>> {
        match host {
            Some(host) if self.has_host(host) => Ok(args(&["ip", "netns", "exec", host])),
            Some(host) => Err(NetError::UnknownHost(host.to_string())),
            None => Ok(Vec::new()),
        }
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Arguments of the `tc` qdisc shaping one link.
fn netem_args(interface: &str, link: &LinkProfile) -> Vec<String> {
    let mut argv = args(&["tc", "qdisc", "replace", "dev", interface, "root", "netem"]);
    argv.extend([
        "rate".to_string(),
        format!("{}mbit", link.bandwidth_mbit),
        "delay".to_string(),
        format!("{}ms", link.delay_ms),
        "loss".to_string(),
        format!("{}%", link.loss_percent),
        "limit".to_string(),
        link.max_queue_size.to_string(),
    ]);
    argv
}

#[async_trait]
impl NetworkPlatform for NetnsPlatform {
    async fn create_switch(&self, name: &str) -> Result<()> {
        info!(switch = %name, "Creating switch");
        run_checked(&args(&["ovs-vsctl", "--may-exist", "add-br", name])).await?;
        // No controller: without an explicit flow the bridge drops everything.
        run_checked(&args(&["ovs-vsctl", "set-fail-mode", name, "secure"])).await?;
        run_checked(&args(&["ip", "link", "set", name, "up"])).await?;
        self.state
            .lock()
            .unwrap()
            .switches
            .push((name.to_string(), 0));
        Ok(())
    }

    async fn create_host(
        &self,
        name: &str,
        switch: &str,
        link: &LinkProfile,
    ) -> Result<Ipv4Addr> {
        let port = self.next_port(switch)?;
        let index = self.next_host(name);
        let address = host_address(self.address_base, index)?;
        let host_if = format!("{name}-eth0");
        let switch_if = format!("{switch}-eth{port}");
        let cidr = format!("{address}/{}", self.prefix_len);

        debug!(host = %name, %address, port, "Creating host");
        run_checked(&args(&["ip", "netns", "add", name])).await?;
        run_checked(&args(&[
            "ip", "link", "add", &host_if, "type", "veth", "peer", "name", &switch_if,
        ]))
        .await?;
        run_checked(&args(&["ip", "link", "set", &host_if, "netns", name])).await?;

        let in_ns = |rest: &[&str]| {
            let mut argv = args(&["ip", "netns", "exec", name]);
            argv.extend(rest.iter().map(|s| s.to_string()));
            argv
        };
        run_checked(&in_ns(&["ip", "link", "set", "lo", "up"])).await?;
        run_checked(&in_ns(&["ip", "addr", "add", &cidr, "dev", &host_if])).await?;
        run_checked(&in_ns(&["ip", "link", "set", &host_if, "up"])).await?;

        let mut shape = args(&["ip", "netns", "exec", name]);
        shape.extend(netem_args(&host_if, link));
        run_checked(&shape).await?;

        run_checked(&args(&["ovs-vsctl", "add-port", switch, &switch_if])).await?;
        run_checked(&args(&["ip", "link", "set", &switch_if, "up"])).await?;
        Ok(address)
    }

    async fn install_forwarding(&self, switch: &str) -> Result<()> {
        run_checked(&args(&["ovs-ofctl", "add-flow", switch, "action=normal"])).await?;
        Ok(())
    }

    async fn add_default_route(&self, host: &str, gateway: Ipv4Addr) -> Result<()> {
        let mut argv = self.netns_prefix(Some(host))?;
        let gateway = gateway.to_string();
        let device = format!("{host}-eth0");
        argv.extend(args(&[
            "ip", "route", "replace", "default", "via", &gateway, "dev", &device, "onlink",
        ]));
        run_checked(&argv).await?;
        Ok(())
    }

    async fn exec(&self, host: Option<&str>, argv: &[String]) -> Result<CommandOutput> {
        let mut full = self.netns_prefix(host)?;
        full.extend(argv.iter().cloned());
        run_command(&full).await
    }

    async fn spawn(&self, host: Option<&str>, spec: &LaunchSpec) -> Result<Box<dyn Supervised>> {
        let prefix = self.netns_prefix(host)?;
        let command = launch_command(&prefix, spec)?;
        Ok(Box::new(ChildProcess::spawn(spec.name.clone(), command)?))
    }

    async fn destroy(&self) -> Result<()> {
        let (hosts, switches) = {
            let mut state = self.state.lock().unwrap();
            let hosts = std::mem::take(&mut state.hosts);
            let switches = std::mem::take(&mut state.switches);
            (hosts, switches)
        };

        for host in &hosts {
            // Deleting the namespace also removes both ends of its veth pair.
            if let Err(e) = run_checked(&args(&["ip", "netns", "del", host])).await {
                warn!(host = %host, error = %e, "Failed to delete namespace");
            }
        }
        for (switch, _) in &switches {
            run_checked(&args(&["ovs-vsctl", "--if-exists", "del-br", switch])).await?;
        }
        info!(hosts = hosts.len(), switches = switches.len(), "Network destroyed");
        Ok(())
    }

    async fn purge(&self, switch: &str, host_prefix: &str) -> Result<()> {
        let listing = run_checked(&args(&["ip", "netns", "list"])).await?;
        for name in stale_namespaces(&listing.stdout, host_prefix) {
            warn!(host = %name, "Removing stale namespace");
            run_checked(&args(&["ip", "netns", "del", &name])).await?;
        }
        run_checked(&args(&["ovs-vsctl", "--if-exists", "del-br", switch])).await?;
        Ok(())
    }
}

/// Namespace names in `ip netns list` output that look like `<prefix><digits>`.
fn stale_namespaces(listing: &str, host_prefix: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| {
            name.strip_prefix(host_prefix)
                .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
                .unwrap_or(false)
        })
        .map(str::to_string)
        .collect()
}

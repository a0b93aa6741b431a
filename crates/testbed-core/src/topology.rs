//! Topology provisioning: one switch, sequentially named nodes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use testbed_net::NetworkPlatform;
use tracing::info;

use crate::domain::error::{Result, TestbedError};
use crate::domain::node::{node_name, Node, Role, MAX_NODE_SUFFIX};
use crate::domain::variant::Variant;
use crate::settings::NetworkSettings;

pub const MIN_HOSTS: u32 = 2;
pub const MAX_HOSTS: u32 = MAX_NODE_SUFFIX;

/// Reject host counts outside `MIN_HOSTS..=MAX_HOSTS`.
pub fn validate_hosts(hosts: u32) -> Result<()> {
    if (MIN_HOSTS..=MAX_HOSTS).contains(&hosts) {
        Ok(())
    } else {
        Err(TestbedError::InvalidHostCount(hosts))
    }
}

/// Nodes provisioned for `hosts` workload hosts under `variant`.
pub fn node_count(hosts: u32, variant: &Variant) -> u32 {
    hosts + u32::from(variant.requires_dns())
}

/// The emulated network of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub switch: String,
    /// Ordered by index; `h1` is the publisher, a resolver is always last.
    pub nodes: Vec<Node>,
}

impl Topology {
    pub fn publisher(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.role == Role::Publisher)
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.role == Role::Subscriber)
    }

    pub fn resolver(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.role == Role::DnsResolver)
    }

    /// Publisher and subscribers.
    pub fn workload_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_workload())
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn subscriber_count(&self) -> u32 {
        self.subscribers().count() as u32
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Role of the `index`-th node out of `hosts` workload hosts.
pub fn role_of(index: u32, hosts: u32) -> Role {
    match index {
        1 => Role::Publisher,
        i if i <= hosts => Role::Subscriber,
        _ => Role::DnsResolver,
    }
}

/// Creates the switch and nodes on a [`NetworkPlatform`].
pub struct TopologyProvisioner {
    platform: Arc<dyn NetworkPlatform>,
    settings: NetworkSettings,
}

impl TopologyProvisioner {
    pub fn new(platform: Arc<dyn NetworkPlatform>, settings: NetworkSettings) -> Self {
        Self { platform, settings }
    }

    /// Build the network for `hosts` workload hosts, plus a resolver node
    /// when `with_resolver`. Platform errors are fatal.
    pub async fn provision(&self, hosts: u32, with_resolver: bool) -> Result<Topology> {
        validate_hosts(hosts)?;
        let total = hosts + u32::from(with_resolver);
        let switch = &self.settings.switch;

        info!(switch = %switch, nodes = total, "Provisioning topology");
        self.platform.create_switch(switch).await?;

        let mut nodes = Vec::with_capacity(total as usize);
        for index in 1..=total {
            let name = node_name(&self.settings.host_prefix, index);
            let address = self
                .platform
                .create_host(&name, switch, &self.settings.link)
                .await?;
            nodes.push(Node {
                name,
                index,
                role: role_of(index, hosts),
                address,
            });
        }

        self.platform.install_forwarding(switch).await?;
        for node in &nodes {
            self.platform
                .add_default_route(&node.name, self.settings.gateway)
                .await?;
        }

        info!(switch = %switch, nodes = nodes.len(), "Topology ready");
        Ok(Topology {
            switch: switch.clone(),
            nodes,
        })
    }
}

//! Certificate issuance and trust wiring between publisher and subscribers.

use std::path::PathBuf;
use std::sync::Arc;

use testbed_net::{describe, NetworkPlatform};
use tracing::{debug, info};

use crate::domain::error::{Result, TestbedError};
use crate::domain::node::{Node, Role};
use crate::domain::variant::TrustWiring;
use crate::node_config::NodeConfigStore;
use crate::settings::CertificateSettings;
use crate::topology::Topology;

/// Certificate and key of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedIdentity {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// False when both files already existed and the tool was skipped.
    pub generated: bool,
}

pub struct IdentityProvisioner<'a> {
    platform: Arc<dyn NetworkPlatform>,
    store: &'a NodeConfigStore,
    settings: &'a CertificateSettings,
}

impl<'a> IdentityProvisioner<'a> {
    pub fn new(
        platform: Arc<dyn NetworkPlatform>,
        store: &'a NodeConfigStore,
        settings: &'a CertificateSettings,
    ) -> Self {
        Self {
            platform,
            store,
            settings,
        }
    }

    /// `(cert, key)` paths a node's certificate lives at. Resolvers have none.
    pub fn certificate_paths(&self, node: &Node) -> Option<(PathBuf, PathBuf)> {
        let kind = match node.role {
            Role::Publisher => "service",
            Role::Subscriber => "client",
            Role::DnsResolver => return None,
        };
        let dir = &self.settings.dir;
        Some((
            dir.join(format!("{}.{kind}.cert.pem", node.name)),
            dir.join(format!("{}.{kind}.key.pem", node.name)),
        ))
    }

    fn tool_command(&self, node: &Node) -> Vec<String> {
        let s = self.settings;
        match node.role {
            Role::Publisher => vec![
                s.service_tool.to_string_lossy().to_string(),
                s.service_id.to_string(),
                s.instance_id.to_string(),
                s.major_version.to_string(),
                s.minor_version.to_string(),
                node.address.to_string(),
                s.publisher_port.to_string(),
                s.protocol.clone(),
                node.name.clone(),
            ],
            _ => vec![
                s.client_tool.to_string_lossy().to_string(),
                node.index.to_string(),
                s.service_id.to_string(),
                s.instance_id.to_string(),
                s.major_version.to_string(),
                node.address.to_string(),
                s.subscriber_ports.clone(),
                s.protocol.clone(),
                node.name.clone(),
            ],
        }
    }

    /// Issue the node's certificate with the role's tool.
    ///
    /// The tool is skipped when both files already exist.
    pub async fn issue_certificate(&self, node: &Node) -> Result<IssuedIdentity> {
        let (cert_path, key_path) = self
            .certificate_paths(node)
            .ok_or(TestbedError::NoIdentity(node.role))?;

        if cert_path.is_file() && key_path.is_file() {
            debug!(node = %node.name, "Certificate already present");
            return Ok(IssuedIdentity {
                cert_path,
                key_path,
                generated: false,
            });
        }

        std::fs::create_dir_all(&self.settings.dir)?;
        let argv = self.tool_command(node);
        debug!(node = %node.name, command = %describe(&argv), "Running certificate tool");
        let output = self.platform.exec(Some(&node.name), &argv).await?;
        if !output.success() {
            return Err(TestbedError::CertificateTool {
                node: node.name.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        Ok(IssuedIdentity {
            cert_path,
            key_path,
            generated: true,
        })
    }

    /// Issue the publisher's service certificate and every subscriber's
    /// client certificate, then record in the node configs what `trust`
    /// asks for.
    pub async fn provision(&self, topology: &Topology, trust: &TrustWiring) -> Result<()> {
        let publisher = topology
            .publisher()
            .ok_or_else(|| TestbedError::ConfigNotFound("publisher".to_string()))?;

        let service = self.issue_certificate(publisher).await?;
        let mut clients = Vec::new();
        for subscriber in topology.subscribers() {
            clients.push((subscriber, self.issue_certificate(subscriber).await?));
        }

        if trust.service_certificate {
            self.store.update(&publisher.name, |config| {
                config.set_certificate(&service.cert_path, &service.key_path)
            })?;
        }

        if trust.client_certificates {
            for (subscriber, identity) in &clients {
                self.store.update(&subscriber.name, |config| {
                    config.set_certificate(&identity.cert_path, &identity.key_path)
                })?;
            }
        }

        if trust.publisher_trusts_subscribers {
            let expected: Vec<PathBuf> = clients
                .iter()
                .map(|(_, identity)| identity.cert_path.clone())
                .collect();
            self.store
                .update(&publisher.name, |config| config.set_host_certificates(&expected))?;
        }

        if trust.subscribers_pin_publisher {
            for (subscriber, _) in &clients {
                self.store.update(&subscriber.name, |config| {
                    config.set_service_certificate(&service.cert_path)
                })?;
            }
        }

        info!(
            subscribers = clients.len(),
            generated = usize::from(service.generated)
                + clients.iter().filter(|(_, identity)| identity.generated).count(),
            "Identities provisioned"
        );
        Ok(())
    }
}

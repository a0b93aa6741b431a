//! Configuration synthesis from role templates.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::domain::error::{Result, TestbedError};
use crate::domain::node::{Node, Role};
use crate::node_config::{NodeConfig, NodeConfigStore};
use crate::settings::ConfigSettings;

/// Derives node configs from the publisher and subscriber templates.
pub struct ConfigSynthesizer<'a> {
    store: &'a NodeConfigStore,
    settings: &'a ConfigSettings,
}

impl<'a> ConfigSynthesizer<'a> {
    pub fn new(store: &'a NodeConfigStore, settings: &'a ConfigSettings) -> Self {
        Self { store, settings }
    }

    pub fn template_for(&self, role: Role) -> Result<&Path> {
        match role {
            Role::Publisher => Ok(&self.settings.publisher_template),
            Role::Subscriber => Ok(&self.settings.subscriber_template),
            Role::DnsResolver => Err(TestbedError::NoTemplate(role)),
        }
    }

    /// `<log_dir>/<node>.log`
    pub fn log_path(&self, node: &str) -> PathBuf {
        self.settings.log_dir.join(format!("{node}.log"))
    }

    /// Config of `node`, created from its role template on first need.
    ///
    /// An existing config is returned untouched unless `force_regenerate`.
    pub fn synthesize(&self, node: &Node, force_regenerate: bool) -> Result<NodeConfig> {
        if !force_regenerate && self.store.exists(&node.name) {
            debug!(node = %node.name, "Reusing existing node config");
            return self.store.load(&node.name);
        }

        let template_path = self.template_for(node.role)?;
        let template = match std::fs::read_to_string(template_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TestbedError::TemplateMissing(template_path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_str(&template).map_err(|e| TestbedError::TemplateInvalid {
            path: template_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = NodeConfig::from_value(&node.name, value, template_path)?;
        config.set_network(&format!("-{}", node.name));
        config.set_unicast(&node.address.to_string());
        config.set_log_file(&self.log_path(&node.name));
        config.set_application(&node.name, &node.application_id()?);
        config.set_routing(&node.name);

        self.store.save(&config)?;
        info!(node = %node.name, role = %node.role, "Synthesized node config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn setup() -> (tempfile::TempDir, NodeConfigStore, ConfigSettings) {
        let dir = tempfile::tempdir().unwrap();
        let settings = ConfigSettings {
            dir: dir.path().to_path_buf(),
            publisher_template: dir.path().join("publisher.json"),
            subscriber_template: dir.path().join("subscriber.json"),
            log_dir: dir.path().join("logs"),
        };
        std::fs::write(
            &settings.publisher_template,
            r#"{ "unicast": "0.0.0.0", "applications": [{ "name": "x", "id": "0x0" }], "services": [] }"#,
        )
        .unwrap();
        std::fs::write(
            &settings.subscriber_template,
            r#"{ "unicast": "0.0.0.0", "applications": [{ "name": "x", "id": "0x0" }], "clients": [] }"#,
        )
        .unwrap();
        let store = NodeConfigStore::new(dir.path(), "h");
        (dir, store, settings)
    }

    fn node(index: u32, role: Role) -> Node {
        Node {
            name: format!("h{index}"),
            index,
            role,
            address: Ipv4Addr::new(10, 0, 0, index as u8),
        }
    }

    #[test]
    fn test_synthesize_publisher() {
        let (_dir, store, settings) = setup();
        let synth = ConfigSynthesizer::new(&store, &settings);

        let config = synth.synthesize(&node(1, Role::Publisher), false).unwrap();
        assert_eq!(config.network(), Some("-h1"));
        assert_eq!(config.unicast(), Some("10.0.0.1"));
        assert_eq!(config.application(), Some(("h1", "0x0001")));
        assert_eq!(config.routing(), Some("h1"));
        assert!(config.document().contains_key("services"));
        assert_eq!(
            config.log_path(),
            Some(settings.log_dir.join("h1.log").to_str().unwrap())
        );
    }

    #[test]
    fn test_synthesize_uses_role_template() {
        let (_dir, store, settings) = setup();
        let synth = ConfigSynthesizer::new(&store, &settings);

        let config = synth.synthesize(&node(2, Role::Subscriber), false).unwrap();
        assert!(config.document().contains_key("clients"));
        assert!(!config.document().contains_key("services"));
    }

    #[test]
    fn test_existing_config_is_reused() {
        let (_dir, store, settings) = setup();
        let synth = ConfigSynthesizer::new(&store, &settings);
        let sub = node(2, Role::Subscriber);

        synth.synthesize(&sub, false).unwrap();
        store.update("h2", |c| c.set_dns_server("0x0a000003")).unwrap();

        let reused = synth.synthesize(&sub, false).unwrap();
        assert_eq!(reused.dns_server(), Some("0x0a000003"));

        let regenerated = synth.synthesize(&sub, true).unwrap();
        assert_eq!(regenerated.dns_server(), None);
    }

    #[test]
    fn test_dns_node_has_no_template() {
        let (_dir, store, settings) = setup();
        let synth = ConfigSynthesizer::new(&store, &settings);
        let err = synth.synthesize(&node(3, Role::DnsResolver), false).unwrap_err();
        assert!(matches!(err, TestbedError::NoTemplate(Role::DnsResolver)));
    }

    #[test]
    fn test_missing_template() {
        let (_dir, store, mut settings) = setup();
        settings.subscriber_template = PathBuf::from("/nonexistent/sub.json");
        let synth = ConfigSynthesizer::new(&store, &settings);
        let err = synth.synthesize(&node(2, Role::Subscriber), false).unwrap_err();
        assert!(matches!(err, TestbedError::TemplateMissing(_)));
    }

    #[test]
    fn test_suffix_out_of_range_rejected() {
        let (_dir, store, settings) = setup();
        let synth = ConfigSynthesizer::new(&store, &settings);
        let mut big = node(2, Role::Subscriber);
        big.index = 70_000;
        big.name = "h70000".to_string();
        let err = synth.synthesize(&big, false).unwrap_err();
        assert!(matches!(err, TestbedError::InvalidNodeName(_)));
    }
}

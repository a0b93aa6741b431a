//! Per-node workload configuration and its on-disk store.
//!
//! A [`NodeConfig`] is the role template with the node's identity written
//! into it. The [`NodeConfigStore`] owns the files: every mutation after
//! synthesis goes through [`NodeConfigStore::update`], which reads the
//! current record, applies the change and atomically replaces the file.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::domain::error::{Result, TestbedError};
use crate::domain::node::parse_suffix;

pub const NETWORK: &str = "network";
pub const UNICAST: &str = "unicast";
pub const LOGGING: &str = "logging";
pub const APPLICATIONS: &str = "applications";
pub const ROUTING: &str = "routing";
pub const CERTIFICATE_PATH: &str = "certificate-path";
pub const PRIVATE_KEY_PATH: &str = "private-key-path";
pub const HOST_CERTIFICATES: &str = "host-certificates";
pub const SERVICE_CERTIFICATE_PATH: &str = "service-certificate-path";
pub const DNS_SERVER: &str = "dns-server";

/// Workload configuration of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    node: String,
    document: Map<String, Value>,
}

impl NodeConfig {
    /// Wrap a parsed template. Only JSON objects are valid configs.
    pub fn from_value(node: impl Into<String>, value: Value, source: &Path) -> Result<Self> {
        match value {
            Value::Object(document) => Ok(Self {
                node: node.into(),
                document,
            }),
            other => Err(TestbedError::TemplateInvalid {
                path: source.to_path_buf(),
                reason: format!("expected a JSON object, found {}", kind_of(&other)),
            }),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(&self.document)?;
        text.push('\n');
        Ok(text)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.document.get(key).and_then(Value::as_str)
    }

    fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.document.insert(key.to_string(), value.into());
    }

    pub fn network(&self) -> Option<&str> {
        self.str_field(NETWORK)
    }

    pub fn unicast(&self) -> Option<&str> {
        self.str_field(UNICAST)
    }

    pub fn routing(&self) -> Option<&str> {
        self.str_field(ROUTING)
    }

    pub fn certificate_path(&self) -> Option<&str> {
        self.str_field(CERTIFICATE_PATH)
    }

    pub fn private_key_path(&self) -> Option<&str> {
        self.str_field(PRIVATE_KEY_PATH)
    }

    pub fn service_certificate_path(&self) -> Option<&str> {
        self.str_field(SERVICE_CERTIFICATE_PATH)
    }

    pub fn dns_server(&self) -> Option<&str> {
        self.str_field(DNS_SERVER)
    }

    pub fn log_path(&self) -> Option<&str> {
        self.document
            .get(LOGGING)
            .and_then(|logging| logging.get("file"))
            .and_then(|file| file.get("path"))
            .and_then(Value::as_str)
    }

    /// `(name, id)` of the first application entry.
    pub fn application(&self) -> Option<(&str, &str)> {
        let app = self.document.get(APPLICATIONS)?.as_array()?.first()?;
        Some((app.get("name")?.as_str()?, app.get("id")?.as_str()?))
    }

    pub fn host_certificates(&self) -> Vec<String> {
        self.document
            .get(HOST_CERTIFICATES)
            .and_then(Value::as_array)
            .map(|certs| {
                certs
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_network(&mut self, tag: &str) {
        self.set(NETWORK, tag);
    }

    pub fn set_unicast(&mut self, address: &str) {
        self.set(UNICAST, address);
    }

    pub fn set_routing(&mut self, host: &str) {
        self.set(ROUTING, host);
    }

    /// Disable console and file logging, keeping the log path for the workload.
    pub fn set_log_file(&mut self, path: &Path) {
        let logging = self
            .document
            .entry(LOGGING.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !logging.is_object() {
            *logging = Value::Object(Map::new());
        }
        if let Some(logging) = logging.as_object_mut() {
            logging.insert("console".to_string(), json!("false"));
            logging.insert(
                "file".to_string(),
                json!({ "enable": "false", "path": path.to_string_lossy() }),
            );
        }
    }

    /// Name and id of the first application entry, creating it if absent.
    pub fn set_application(&mut self, name: &str, id: &str) {
        let apps = self
            .document
            .entry(APPLICATIONS.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !apps.is_array() {
            *apps = Value::Array(Vec::new());
        }
        if let Some(apps) = apps.as_array_mut() {
            match apps.first_mut().and_then(Value::as_object_mut) {
                Some(app) => {
                    app.insert("name".to_string(), json!(name));
                    app.insert("id".to_string(), json!(id));
                }
                None => {
                    apps.clear();
                    apps.push(json!({ "name": name, "id": id }));
                }
            }
        }
    }

    pub fn set_certificate(&mut self, cert: &Path, key: &Path) {
        self.set(CERTIFICATE_PATH, cert.to_string_lossy().to_string());
        self.set(PRIVATE_KEY_PATH, key.to_string_lossy().to_string());
    }

    pub fn set_host_certificates(&mut self, certs: &[PathBuf]) {
        let certs: Vec<Value> = certs
            .iter()
            .map(|c| Value::String(c.to_string_lossy().to_string()))
            .collect();
        self.set(HOST_CERTIFICATES, certs);
    }

    pub fn set_service_certificate(&mut self, cert: &Path) {
        self.set(SERVICE_CERTIFICATE_PATH, cert.to_string_lossy().to_string());
    }

    pub fn set_dns_server(&mut self, literal: &str) {
        self.set(DNS_SERVER, literal);
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Directory of node configs, keyed by node name.
#[derive(Debug, Clone)]
pub struct NodeConfigStore {
    dir: PathBuf,
    host_prefix: String,
}

impl NodeConfigStore {
    pub fn new(dir: impl Into<PathBuf>, host_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            host_prefix: host_prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<node>.json`
    pub fn path_for(&self, node: &str) -> PathBuf {
        self.dir.join(format!("{node}.json"))
    }

    pub fn exists(&self, node: &str) -> bool {
        self.path_for(node).is_file()
    }

    pub fn load(&self, node: &str) -> Result<NodeConfig> {
        let path = self.path_for(node);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TestbedError::ConfigNotFound(node.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        NodeConfig::from_value(node, serde_json::from_str(&content)?, &path)
    }

    /// Write `config` through a temporary file and a rename.
    pub fn save(&self, config: &NodeConfig) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(config.node());
        let tmp = self.dir.join(format!(".{}.json.tmp", config.node()));
        std::fs::write(&tmp, config.to_json_pretty()?)?;
        std::fs::rename(&tmp, &path)?;
        debug!(node = %config.node(), path = ?path, "Saved node config");
        Ok(path)
    }

    /// Read-modify-write of an existing config. The file is only rewritten
    /// when `mutate` changed something.
    pub fn update<F>(&self, node: &str, mutate: F) -> Result<NodeConfig>
    where
        F: FnOnce(&mut NodeConfig),
    {
        let mut config = self.load(node)?;
        let before = config.clone();
        mutate(&mut config);
        if config != before {
            self.save(&config)?;
        }
        Ok(config)
    }

    /// Names of the nodes with a config in the store, sorted by suffix.
    pub fn nodes(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut nodes = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(suffix) = parse_suffix(&self.host_prefix, stem) {
                nodes.push((suffix, stem.to_string()));
            }
        }
        nodes.sort();
        Ok(nodes.into_iter().map(|(_, name)| name).collect())
    }

    /// Delete every node config. Templates in the same directory are kept.
    pub fn remove_all(&self) -> Result<usize> {
        let nodes = self.nodes()?;
        for node in &nodes {
            std::fs::remove_file(self.path_for(node))?;
        }
        Ok(nodes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Value {
        json!({
            "unicast": "127.0.0.1",
            "network": "-template",
            "logging": { "level": "info", "console": "true" },
            "applications": [{ "name": "template", "id": "0x0000" }],
            "routing": "template"
        })
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        let err = NodeConfig::from_value("h1", json!([1, 2]), Path::new("t.json")).unwrap_err();
        assert!(matches!(err, TestbedError::TemplateInvalid { .. }));
    }

    #[test]
    fn test_setters_write_expected_fields() {
        let mut config = NodeConfig::from_value("h3", template(), Path::new("t.json")).unwrap();
        config.set_network("-h3");
        config.set_unicast("10.0.0.3");
        config.set_log_file(Path::new("/var/log/h3.log"));
        config.set_application("h3", "0x0003");
        config.set_routing("h3");

        assert_eq!(config.network(), Some("-h3"));
        assert_eq!(config.unicast(), Some("10.0.0.3"));
        assert_eq!(config.log_path(), Some("/var/log/h3.log"));
        assert_eq!(config.application(), Some(("h3", "0x0003")));
        assert_eq!(config.routing(), Some("h3"));

        let logging = &config.document()[LOGGING];
        assert_eq!(logging["file"]["enable"], "false");
        assert_eq!(logging["console"], "false");
        assert_eq!(logging["level"], "info");
    }

    #[test]
    fn test_set_application_without_entries() {
        let mut config = NodeConfig::from_value("h2", json!({}), Path::new("t.json")).unwrap();
        config.set_application("h2", "0x0002");
        assert_eq!(config.application(), Some(("h2", "0x0002")));
    }

    #[test]
    fn test_store_roundtrip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = NodeConfigStore::new(dir.path(), "h");

        assert!(matches!(
            store.load("h1"),
            Err(TestbedError::ConfigNotFound(_))
        ));

        let config = NodeConfig::from_value("h1", template(), Path::new("t.json")).unwrap();
        let path = store.save(&config).unwrap();
        assert_eq!(path, dir.path().join("h1.json"));
        assert_eq!(store.load("h1").unwrap(), config);
    }

    #[test]
    fn test_update_is_read_modify_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = NodeConfigStore::new(dir.path(), "h");
        let config = NodeConfig::from_value("h2", template(), Path::new("t.json")).unwrap();
        store.save(&config).unwrap();

        store
            .update("h2", |c| c.set_dns_server("0x0a000004"))
            .unwrap();
        store
            .update("h2", |c| c.set_service_certificate(Path::new("/c/h1.service.cert.pem")))
            .unwrap();

        let loaded = store.load("h2").unwrap();
        assert_eq!(loaded.dns_server(), Some("0x0a000004"));
        assert_eq!(
            loaded.service_certificate_path(),
            Some("/c/h1.service.cert.pem")
        );
        assert_eq!(loaded.routing(), Some("template"));
    }

    #[test]
    fn test_update_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = NodeConfigStore::new(dir.path(), "h");
        let err = store.update("h9", |c| c.set_routing("h9")).unwrap_err();
        assert!(matches!(err, TestbedError::ConfigNotFound(ref n) if n == "h9"));
    }

    #[test]
    fn test_remove_all_keeps_templates() {
        let dir = tempfile::tempdir().unwrap();
        let store = NodeConfigStore::new(dir.path(), "h");
        std::fs::write(dir.path().join("vsomeip-udp-mininet-publisher.json"), "{}").unwrap();
        for node in ["h1", "h2", "h10"] {
            let config = NodeConfig::from_value(node, json!({}), Path::new("t.json")).unwrap();
            store.save(&config).unwrap();
        }

        assert_eq!(store.nodes().unwrap(), vec!["h1", "h2", "h10"]);
        assert_eq!(store.remove_all().unwrap(), 3);
        assert!(store.nodes().unwrap().is_empty());
        assert!(dir.path().join("vsomeip-udp-mininet-publisher.json").exists());
    }

    #[test]
    fn test_host_certificates_roundtrip() {
        let mut config = NodeConfig::from_value("h1", json!({}), Path::new("t.json")).unwrap();
        config.set_host_certificates(&[
            PathBuf::from("/c/h2.client.cert.pem"),
            PathBuf::from("/c/h3.client.cert.pem"),
        ]);
        assert_eq!(
            config.host_certificates(),
            vec!["/c/h2.client.cert.pem", "/c/h3.client.cert.pem"]
        );
    }
}

//! Build specification and identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Everything the external build pipeline needs to produce one variant.
///
/// Built by a pure function of the variant; no repository state is read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildSpec {
    /// Branch or configuration selector of the workload sources.
    pub target: String,

    /// Compile definitions in catalog order.
    pub definitions: Vec<String>,

    /// Number of subscriber contributions the workload records per run.
    pub subscriber_count: u32,

    /// SHA-256 over target, definitions and subscriber count.
    pub digest: String,
}

impl BuildSpec {
    pub fn new(target: impl Into<String>, definitions: Vec<String>, subscriber_count: u32) -> Self {
        let target = target.into();
        let digest = compute_spec_digest(&target, &definitions, subscriber_count);
        Self {
            target,
            definitions,
            subscriber_count,
            digest,
        }
    }

    /// Definitions as one space-separated string, the form build scripts take.
    pub fn definitions_string(&self) -> String {
        self.definitions.join(" ")
    }

    /// First 12 characters of the digest.
    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }

    /// Environment handed to every build step.
    pub fn step_env(&self, description: &Path) -> Vec<(String, String)> {
        vec![
            ("TESTBED_BUILD_TARGET".to_string(), self.target.clone()),
            (
                "TESTBED_COMPILE_DEFINITIONS".to_string(),
                self.definitions_string(),
            ),
            (
                "TESTBED_SUBSCRIBER_COUNT".to_string(),
                self.subscriber_count.to_string(),
            ),
            (
                "TESTBED_BUILD_DESCRIPTION".to_string(),
                description.to_string_lossy().to_string(),
            ),
        ]
    }
}

/// Deterministic digest of the build inputs. Definition order matters.
fn compute_spec_digest(target: &str, definitions: &[String], subscriber_count: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(target.as_bytes());
    hasher.update(b"\0");
    for definition in definitions {
        hasher.update(definition.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(subscriber_count.to_be_bytes());
    hex::encode(hasher.finalize())
}

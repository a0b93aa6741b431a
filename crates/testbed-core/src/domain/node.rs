//! Nodes of the emulated network and their identities.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, TestbedError};

/// Largest numeric suffix the 16-bit application id can encode.
pub const MAX_NODE_SUFFIX: u32 = 0xffff;

/// What a node runs during an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Publisher,
    Subscriber,
    DnsResolver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Publisher => write!(f, "publisher"),
            Role::Subscriber => write!(f, "subscriber"),
            Role::DnsResolver => write!(f, "dns-resolver"),
        }
    }
}

/// One host of the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Sequential numeric suffix of the name, starting at 1.
    pub index: u32,
    pub role: Role,
    /// Assigned by the platform at creation.
    pub address: Ipv4Addr,
}

impl Node {
    /// Application id of this node in the workload's addressing scheme.
    pub fn application_id(&self) -> Result<String> {
        application_id(self.index)
    }

    pub fn is_workload(&self) -> bool {
        matches!(self.role, Role::Publisher | Role::Subscriber)
    }
}

/// Name of the `index`-th node.
pub fn node_name(prefix: &str, index: u32) -> String {
    format!("{prefix}{index}")
}

/// Numeric suffix of a node name such as `h7`.
pub fn parse_suffix(prefix: &str, name: &str) -> Result<u32> {
    name.strip_prefix(prefix)
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .and_then(|rest| rest.parse::<u32>().ok())
        .filter(|suffix| *suffix > 0)
        .ok_or_else(|| TestbedError::InvalidNodeName(name.to_string()))
}

/// Zero-padded 4-hex-digit application id, e.g. `7 -> "0x0007"`.
///
/// Injective over `1..=MAX_NODE_SUFFIX`; anything outside is rejected.
pub fn application_id(suffix: u32) -> Result<String> {
    if suffix == 0 || suffix > MAX_NODE_SUFFIX {
        return Err(TestbedError::InvalidNodeName(suffix.to_string()));
    }
    Ok(format!("0x{suffix:04x}"))
}

/// Big-endian packed hex literal of an IPv4 address, e.g. `10.0.0.4 -> "0x0a000004"`.
pub fn packed_ipv4_literal(address: Ipv4Addr) -> String {
    let octets = address.octets();
    format!(
        "0x{:02x}{:02x}{:02x}{:02x}",
        octets[0], octets[1], octets[2], octets[3]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_application_id_padding() {
        assert_eq!(application_id(7).unwrap(), "0x0007");
        assert_eq!(application_id(0x1234).unwrap(), "0x1234");
        assert_eq!(application_id(MAX_NODE_SUFFIX).unwrap(), "0xffff");
    }

    #[test]
    fn test_application_id_out_of_range() {
        assert!(application_id(0).is_err());
        assert!(application_id(MAX_NODE_SUFFIX + 1).is_err());
    }

    #[test]
    fn test_application_id_injective() {
        let ids: HashSet<String> = (1..=MAX_NODE_SUFFIX)
            .map(|s| application_id(s).unwrap())
            .collect();
        assert_eq!(ids.len(), MAX_NODE_SUFFIX as usize);
    }

    #[test]
    fn test_parse_suffix() {
        assert_eq!(parse_suffix("h", "h1").unwrap(), 1);
        assert_eq!(parse_suffix("h", "h65535").unwrap(), 65535);
        assert!(parse_suffix("h", "h").is_err());
        assert!(parse_suffix("h", "h0").is_err());
        assert!(parse_suffix("h", "x1").is_err());
        assert!(parse_suffix("h", "h1a").is_err());
    }

    #[test]
    fn test_packed_ipv4_literal() {
        assert_eq!(
            packed_ipv4_literal(Ipv4Addr::new(10, 0, 0, 4)),
            "0x0a000004"
        );
        assert_eq!(
            packed_ipv4_literal(Ipv4Addr::new(192, 168, 255, 1)),
            "0xc0a8ff01"
        );
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Publisher.to_string(), "publisher");
        assert_eq!(Role::DnsResolver.to_string(), "dns-resolver");
    }
}

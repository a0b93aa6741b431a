//! The fixed catalog of security variants.
//!
//! Each variant names a combination of security features, the source branch
//! that implements them and how certificates are wired between the publisher
//! and its subscribers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use testbed_build::BuildSpec;

use crate::domain::error::{Result, TestbedError};

/// Source branch without resolver support.
pub const VANILLA_TARGET: &str = "multiple_services/vanilla";

/// Source branch with resolver and DANE support.
pub const DNS_AND_DANE_TARGET: &str = "multiple_services/dns_and_dane";

/// A security feature a variant may enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFlag {
    ServiceAuthentication,
    ClientAuthentication,
    Encryption,
    SomeipSd,
    Dane,
    Dnssec,
}

impl FeatureFlag {
    /// Compile-time definition enabling this feature, if it has one.
    ///
    /// DNSSEC lives on the resolver side and has no definition of its own.
    pub fn compile_definition(&self) -> Option<&'static str> {
        match self {
            FeatureFlag::ServiceAuthentication => Some("WITH_SERVICE_AUTHENTICATION"),
            FeatureFlag::ClientAuthentication => Some("WITH_CLIENT_AUTHENTICATION"),
            FeatureFlag::Encryption => Some("WITH_ENCRYPTION"),
            FeatureFlag::SomeipSd => Some("WITH_SOMEIP_SD"),
            FeatureFlag::Dane => Some("WITH_DANE"),
            FeatureFlag::Dnssec => None,
        }
    }
}

/// Which certificate paths a variant writes into node configs.
///
/// Certificates are issued for every workload node regardless; the issuing
/// tools also publish the SVCB and TLSA records the resolver serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrustWiring {
    /// The publisher's config carries its service certificate and key.
    pub service_certificate: bool,
    /// Every subscriber's config carries its client certificate and key.
    pub client_certificates: bool,
    /// The publisher's config lists every subscriber certificate.
    pub publisher_trusts_subscribers: bool,
    /// Every subscriber's config points at the publisher certificate.
    pub subscribers_pin_publisher: bool,
}

impl TrustWiring {
    pub const NONE: TrustWiring = TrustWiring {
        service_certificate: false,
        client_certificates: false,
        publisher_trusts_subscribers: false,
        subscribers_pin_publisher: false,
    };

    const SERVICE: TrustWiring = TrustWiring {
        service_certificate: true,
        ..TrustWiring::NONE
    };

    const MUTUAL: TrustWiring = TrustWiring {
        service_certificate: true,
        client_certificates: true,
        publisher_trusts_subscribers: true,
        subscribers_pin_publisher: false,
    };

    const PINNED: TrustWiring = TrustWiring {
        service_certificate: true,
        subscribers_pin_publisher: true,
        ..TrustWiring::NONE
    };

    const MUTUAL_PINNED: TrustWiring = TrustWiring {
        service_certificate: true,
        client_certificates: true,
        publisher_trusts_subscribers: true,
        subscribers_pin_publisher: true,
    };
}

/// Identifier of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantId {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
}

impl VariantId {
    pub const ALL: [VariantId; 10] = [
        VariantId::A,
        VariantId::B,
        VariantId::C,
        VariantId::D,
        VariantId::E,
        VariantId::F,
        VariantId::G,
        VariantId::H,
        VariantId::I,
        VariantId::J,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            VariantId::A => "A",
            VariantId::B => "B",
            VariantId::C => "C",
            VariantId::D => "D",
            VariantId::E => "E",
            VariantId::F => "F",
            VariantId::G => "G",
            VariantId::H => "H",
            VariantId::I => "I",
            VariantId::J => "J",
        }
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for VariantId {
    type Err = TestbedError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        VariantId::ALL
            .iter()
            .copied()
            .find(|id| id.token().eq_ignore_ascii_case(token))
            .ok_or_else(|| TestbedError::UnknownVariant(s.to_string()))
    }
}

/// One entry of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variant {
    pub id: VariantId,
    pub description: &'static str,
    pub flags: &'static [FeatureFlag],
    pub build_target: &'static str,
    pub trust: TrustWiring,
}

impl Variant {
    pub fn has(&self, flag: FeatureFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Variants with DNSSEC add a resolver node to the topology.
    pub fn requires_dns(&self) -> bool {
        self.has(FeatureFlag::Dnssec)
    }

    /// Compile definitions in flag order.
    pub fn compile_definitions(&self) -> Vec<String> {
        self.flags
            .iter()
            .filter_map(FeatureFlag::compile_definition)
            .map(str::to_string)
            .collect()
    }

    /// Explicit build inputs for this variant. Pure: nothing is touched on disk.
    pub fn build_spec(&self, subscriber_count: u32) -> BuildSpec {
        BuildSpec::new(self.build_target, self.compile_definitions(), subscriber_count)
    }
}

use FeatureFlag::*;

static CATALOG: [Variant; 10] = [
    Variant {
        id: VariantId::A,
        description: "SOME/IP baseline without security features",
        flags: &[],
        build_target: VANILLA_TARGET,
        trust: TrustWiring::NONE,
    },
    Variant {
        id: VariantId::B,
        description: "service authentication",
        flags: &[ServiceAuthentication],
        build_target: VANILLA_TARGET,
        trust: TrustWiring::SERVICE,
    },
    Variant {
        id: VariantId::C,
        description: "service and client authentication",
        flags: &[ServiceAuthentication, ClientAuthentication],
        build_target: VANILLA_TARGET,
        trust: TrustWiring::MUTUAL,
    },
    Variant {
        id: VariantId::D,
        description: "mutual authentication with encryption",
        flags: &[ServiceAuthentication, ClientAuthentication, Encryption],
        build_target: VANILLA_TARGET,
        trust: TrustWiring::MUTUAL,
    },
    Variant {
        id: VariantId::E,
        description: "DNSSEC without SOME/IP-SD",
        flags: &[Dnssec],
        build_target: DNS_AND_DANE_TARGET,
        trust: TrustWiring::NONE,
    },
    Variant {
        id: VariantId::F,
        description: "DNSSEC with SOME/IP-SD",
        flags: &[Dnssec, SomeipSd],
        build_target: DNS_AND_DANE_TARGET,
        trust: TrustWiring::NONE,
    },
    Variant {
        id: VariantId::G,
        description: "DNSSEC with DANE, without SOME/IP-SD",
        flags: &[Dnssec, Dane],
        build_target: DNS_AND_DANE_TARGET,
        trust: TrustWiring::PINNED,
    },
    Variant {
        id: VariantId::H,
        description: "DNSSEC with DANE and SOME/IP-SD",
        flags: &[Dnssec, Dane, SomeipSd],
        build_target: DNS_AND_DANE_TARGET,
        trust: TrustWiring::PINNED,
    },
    Variant {
        id: VariantId::I,
        description: "DNSSEC with DANE, SOME/IP-SD and client authentication",
        flags: &[Dnssec, Dane, SomeipSd, ClientAuthentication],
        build_target: DNS_AND_DANE_TARGET,
        trust: TrustWiring::MUTUAL_PINNED,
    },
    Variant {
        id: VariantId::J,
        description: "DNSSEC with DANE, SOME/IP-SD, client authentication and encryption",
        flags: &[Dnssec, Dane, SomeipSd, ClientAuthentication, Encryption],
        build_target: DNS_AND_DANE_TARGET,
        trust: TrustWiring::MUTUAL_PINNED,
    },
];

/// All variants in catalog order.
pub fn catalog() -> &'static [Variant] {
    &CATALOG
}

/// Look up a variant by its token. Unknown tokens are a fatal setup error.
pub fn select_variant(token: &str) -> Result<&'static Variant> {
    let id: VariantId = token.parse()?;
    Ok(&CATALOG[id as usize])
}

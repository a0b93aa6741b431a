//! Domain model: variants, nodes, run records and the error taxonomy.

pub mod error;
pub mod node;
pub mod run;
pub mod variant;

pub use error::{Result, TestbedError};
pub use node::{application_id, node_name, packed_ipv4_literal, parse_suffix, Node, Role};
pub use run::{AttemptRecord, FailureReason, RunOutcome, RunReport, RunState};
pub use variant::{
    catalog, select_variant, FeatureFlag, TrustWiring, Variant, VariantId, DNS_AND_DANE_TARGET,
    VANILLA_TARGET,
};

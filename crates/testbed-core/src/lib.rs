//! testbed-core: orchestration of pub/sub security evaluations
//!
//! An evaluation builds the workload for one security variant, provisions an
//! emulated network with one publisher and N-1 subscribers (plus a resolver
//! node for DNS variants), writes every node's configuration and identity,
//! then runs the workload a fixed number of times. Each run is gated by the
//! publisher's readiness marker and judged solely by the statistics
//! collector's exit code; failed runs are retried in place.
//!
//! ## Modules
//!
//! - [`domain`]: variants, nodes, run records, errors
//! - [`settings`]: paths, commands and timing of an evaluation
//! - [`node_config`] / [`synthesizer`]: per-node configuration
//! - [`identity`]: certificates and trust wiring
//! - [`dns`]: resolver coordination
//! - [`run_loop`]: the synchronised run loop
//! - [`teardown`]: teardown and clean start
//! - [`evaluation`]: the end-to-end sequence

pub mod artifacts;
pub mod dns;
pub mod domain;
pub mod evaluation;
pub mod identity;
pub mod metrics;
pub mod node_config;
pub mod obs;
pub mod registry;
pub mod run_loop;
pub mod settings;
pub mod synthesizer;
pub mod teardown;
pub mod telemetry;
pub mod topology;

pub use dns::DnsCoordinator;
pub use domain::{
    catalog, select_variant, AttemptRecord, FailureReason, FeatureFlag, Node, Result, Role,
    RunOutcome, RunReport, RunState, TestbedError, TrustWiring, Variant, VariantId,
};
pub use evaluation::{Evaluation, EvaluationRequest, EvaluationSummary};
pub use identity::{IdentityProvisioner, IssuedIdentity};
pub use metrics::METRICS;
pub use node_config::{NodeConfig, NodeConfigStore};
pub use registry::ProcessRegistry;
pub use run_loop::RunLoop;
pub use settings::Settings;
pub use synthesizer::ConfigSynthesizer;
pub use teardown::{Teardown, TeardownSummary};
pub use telemetry::init_tracing;
pub use topology::{node_count, validate_hosts, Topology, TopologyProvisioner};

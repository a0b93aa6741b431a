//! One complete evaluation: build, provision, configure, run, tear down.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use testbed_net::NetworkPlatform;
use tracing::{info, Instrument};

use crate::dns::DnsCoordinator;
use crate::domain::error::{Result, TestbedError};
use crate::domain::run::RunReport;
use crate::domain::variant::{select_variant, Variant, VariantId};
use crate::identity::IdentityProvisioner;
use crate::metrics::METRICS;
use crate::node_config::NodeConfigStore;
use crate::obs;
use crate::run_loop::RunLoop;
use crate::settings::Settings;
use crate::synthesizer::ConfigSynthesizer;
use crate::teardown::Teardown;
use crate::topology::{validate_hosts, Topology, TopologyProvisioner};

/// What to evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRequest {
    /// Workload hosts: one publisher plus `hosts - 1` subscribers.
    pub hosts: u32,
    /// Variant token, `A` to `J`.
    pub variant: String,
    pub runs: u32,
    pub clean_start: bool,
    /// Rewrite node configs even when they already exist.
    pub force_regenerate: bool,
}

impl EvaluationRequest {
    pub fn new(hosts: u32, variant: impl Into<String>, runs: u32) -> Self {
        Self {
            hosts,
            variant: variant.into(),
            runs,
            clean_start: false,
            force_regenerate: false,
        }
    }
}

/// Result of a finished evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub variant: VariantId,
    pub hosts: u32,
    pub node_count: usize,
    pub subscriber_count: u32,
    pub build_digest: Option<String>,
    pub report: RunReport,
    pub duration_ms: u64,
}

/// Drives an evaluation on a [`NetworkPlatform`].
pub struct Evaluation {
    platform: Arc<dyn NetworkPlatform>,
    settings: Settings,
}

impl Evaluation {
    pub fn new(platform: Arc<dyn NetworkPlatform>, settings: Settings) -> Self {
        Self { platform, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn store(&self) -> NodeConfigStore {
        NodeConfigStore::new(
            &self.settings.configs.dir,
            &self.settings.network.host_prefix,
        )
    }

    /// Run the whole sequence. Setup errors abort before anything is
    /// provisioned; once the network exists it is always torn down.
    pub async fn run(&self, request: &EvaluationRequest) -> Result<EvaluationSummary> {
        let start = Instant::now();
        validate_hosts(request.hosts)?;
        if request.runs == 0 {
            return Err(TestbedError::InvalidRunCount(request.runs));
        }
        let variant = select_variant(&request.variant)?;
        let subscriber_count = request.hosts - 1;
        let store = self.store();

        obs::emit_run_started(variant.id, request.hosts, request.runs);

        if request.clean_start {
            Teardown::new(self.platform.clone(), &store, &self.settings)
                .clean_start()
                .await?;
        }

        let build_digest = self.build(variant, subscriber_count).await?;

        let provisioned = TopologyProvisioner::new(self.platform.clone(), self.settings.network.clone())
            .provision(request.hosts, variant.requires_dns())
            .await;
        let topology = match provisioned {
            Ok(topology) => topology,
            Err(e) => {
                if let Err(destroy_err) = self.platform.destroy().await {
                    obs::emit_best_effort_failure("teardown", &destroy_err);
                }
                return Err(e);
            }
        };

        let mut dns = topology.resolver().map(|node| {
            DnsCoordinator::new(
                self.platform.clone(),
                self.settings.resolver.clone(),
                node.clone(),
            )
        });

        let outcome = self
            .run_provisioned(request, variant, &store, &topology, dns.as_mut())
            .instrument(obs::evaluation_span(variant.id, request.hosts))
            .await;

        let teardown = Teardown::new(self.platform.clone(), &store, &self.settings)
            .run(topology.len(), dns.as_mut())
            .await;

        METRICS.flush();
        let report = match (outcome, teardown) {
            (Ok(report), Ok(_)) => report,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), teardown) => {
                if let Err(teardown_err) = teardown {
                    obs::emit_best_effort_failure("teardown", &teardown_err);
                }
                return Err(e);
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(variant.id, request.runs, report.attempts.len(), duration_ms);

        Ok(EvaluationSummary {
            variant: variant.id,
            hosts: request.hosts,
            node_count: topology.len(),
            subscriber_count,
            build_digest,
            report,
            duration_ms,
        })
    }

    async fn build(&self, variant: &Variant, subscriber_count: u32) -> Result<Option<String>> {
        if !self.settings.build.enabled {
            info!("Build disabled, using existing build tree");
            return Ok(None);
        }
        let spec = variant.build_spec(subscriber_count);
        let report = self.settings.build_pipeline().apply_and_build(&spec).await?;
        Ok(Some(report.spec_digest))
    }

    async fn run_provisioned(
        &self,
        request: &EvaluationRequest,
        variant: &'static Variant,
        store: &NodeConfigStore,
        topology: &Topology,
        dns: Option<&mut DnsCoordinator>,
    ) -> Result<RunReport> {
        // The certificate tools publish records into the zone files, so the
        // zones are reset before any certificate is issued.
        if let Some(dns) = dns.as_deref() {
            dns.reset_zones().await?;
        }

        let synthesizer = ConfigSynthesizer::new(store, &self.settings.configs);
        for node in topology.workload_nodes() {
            synthesizer.synthesize(node, request.force_regenerate)?;
        }

        IdentityProvisioner::new(self.platform.clone(), store, &self.settings.certificates)
            .provision(topology, &variant.trust)
            .await?;

        let run_loop = RunLoop::new(self.platform.clone(), store, topology, variant, &self.settings);
        let mut run_loop = match dns {
            Some(dns) => {
                dns.inject_address(store, topology)?;
                run_loop.with_dns(dns)
            }
            None => run_loop,
        };

        run_loop.run(request.runs).await
    }
}


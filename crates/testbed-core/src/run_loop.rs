//! The run loop: repeated, synchronised executions of the workload.
//!
//! Each attempt walks the states of [`RunState`]: collector, optional
//! resolver, publisher, readiness wait, subscribers, collector exit. The
//! collector's exit code is the only success signal. Every attempt ends in
//! exactly one cleanup, whatever its outcome, and a failed attempt is
//! retried under the same run index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use testbed_net::{LaunchSpec, NetworkPlatform};
use tokio::time::Instant;
use tracing::{info, warn, Instrument};

use crate::artifacts::{remove_file_if_exists, remove_prefixed};
use crate::dns::DnsCoordinator;
use crate::domain::error::{Result, TestbedError};
use crate::domain::node::Node;
use crate::domain::run::{AttemptRecord, FailureReason, RunOutcome, RunReport, RunState};
use crate::domain::variant::Variant;
use crate::metrics::METRICS;
use crate::node_config::NodeConfigStore;
use crate::obs;
use crate::registry::ProcessRegistry;
use crate::settings::{Settings, TimingSettings, WorkloadSettings};
use crate::topology::Topology;

/// Process name of the statistics collector.
pub const COLLECTOR_NAME: &str = "statistics-collector";

pub struct RunLoop<'a> {
    platform: Arc<dyn NetworkPlatform>,
    store: &'a NodeConfigStore,
    topology: &'a Topology,
    variant: &'static Variant,
    workload: &'a WorkloadSettings,
    timing: &'a TimingSettings,
    log_dir: &'a Path,
    dns: Option<&'a mut DnsCoordinator>,
}

impl<'a> RunLoop<'a> {
    pub fn new(
        platform: Arc<dyn NetworkPlatform>,
        store: &'a NodeConfigStore,
        topology: &'a Topology,
        variant: &'static Variant,
        settings: &'a Settings,
    ) -> Self {
        Self {
            platform,
            store,
            topology,
            variant,
            workload: &settings.workload,
            timing: &settings.timing,
            log_dir: &settings.configs.log_dir,
            dns: None,
        }
    }

    /// Start and stop `dns` around every attempt.
    pub fn with_dns(mut self, dns: &'a mut DnsCoordinator) -> Self {
        self.dns = Some(dns);
        self
    }

    /// Execute `runs` successful runs, retrying failed attempts in place.
    ///
    /// Fatal errors abort the loop after the current attempt is cleaned up.
    pub async fn run(&mut self, runs: u32) -> Result<RunReport> {
        let mut report = RunReport::new(self.variant.id, runs);
        let mut run_index = 1;
        let mut attempt = 0;

        while run_index <= runs {
            attempt += 1;
            let record = self
                .attempt(run_index, attempt)
                .instrument(obs::attempt_span(run_index, attempt))
                .await?;
            let succeeded = record.outcome.is_success();
            report.attempts.push(record);

            if succeeded {
                info!(run_index, attempts = attempt, "Run completed");
                run_index += 1;
                attempt = 0;
                continue;
            }

            if let Some(max) = self.timing.max_attempts_per_run {
                if attempt >= max {
                    return Err(TestbedError::RetriesExhausted {
                        run_index,
                        attempts: attempt,
                    });
                }
            }
            info!(run_index, attempt, "Retrying run");
        }

        Ok(report)
    }

    async fn attempt(&mut self, run_index: u32, attempt: u32) -> Result<AttemptRecord> {
        METRICS.inc_attempts();
        obs::emit_attempt_started(run_index, attempt);
        let started_at = Utc::now();

        let mut registry = ProcessRegistry::new();
        let mut states = vec![RunState::Init];
        let result = self.drive(&mut registry, &mut states).await;

        states.push(RunState::Cleanup);
        self.cleanup(&mut registry, run_index, attempt).await;

        let outcome = result?;
        if !outcome.is_success() {
            METRICS.inc_failed_attempts();
        }
        let record = AttemptRecord {
            run_index,
            attempt,
            started_at,
            finished_at: Utc::now(),
            outcome,
            states,
        };
        obs::emit_attempt(run_index, attempt, &record.outcome, record.duration_ms());
        Ok(record)
    }

    async fn drive(
        &mut self,
        registry: &mut ProcessRegistry,
        states: &mut Vec<RunState>,
    ) -> Result<RunOutcome> {
        let topology = self.topology;

        let collector = LaunchSpec::new(COLLECTOR_NAME, &self.workload.collector_binary)
            .arg(topology.subscriber_count().to_string())
            .arg(self.workload.statistics_dir.to_string_lossy())
            .arg(self.variant.id.token());
        registry.set_collector(self.platform.spawn(None, &collector).await?);
        METRICS.inc_processes_spawned();
        states.push(RunState::CollectorStarted);

        if let Some(dns) = self.dns.as_deref_mut() {
            dns.start().await?;
            states.push(RunState::DnsStarted);
        }

        let publisher = topology
            .publisher()
            .ok_or_else(|| TestbedError::ConfigNotFound("publisher".to_string()))?;
        // A marker left by an interrupted evaluation must not gate this run.
        if remove_file_if_exists(&self.workload.readiness_marker)? {
            warn!(marker = ?self.workload.readiness_marker, "Removed stale readiness marker");
        }
        self.launch(registry, publisher, &self.workload.publisher_binary)
            .await;
        states.push(RunState::PublisherStarted);

        states.push(RunState::AwaitingReady);
        match self.await_readiness().await {
            Ok(()) => {}
            Err(TestbedError::ReadinessTimeout { marker, waited_secs }) => {
                warn!(marker = ?marker, waited_secs, "Publisher never became ready");
                states.push(RunState::RunFailed);
                return Ok(RunOutcome::failure(FailureReason::ReadinessTimeout {
                    waited_secs,
                }));
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(self.timing.settle_delay()).await;

        for subscriber in topology.subscribers() {
            self.launch(registry, subscriber, &self.workload.subscriber_binary)
                .await;
        }
        states.push(RunState::SubscribersStarted);

        states.push(RunState::AwaitingCompletion);
        let outcome = self.await_collector(registry).await?;
        states.push(if outcome.is_success() {
            RunState::RunSucceeded
        } else {
            RunState::RunFailed
        });
        Ok(outcome)
    }

    /// `<log_dir>/<node>.out`, where a workload process's stdout and stderr go.
    fn output_path(&self, node: &str) -> PathBuf {
        self.log_dir.join(format!("{node}.out"))
    }

    /// Start a workload process on `node`. A failed spawn is only logged:
    /// the collector then never completes and the attempt fails.
    async fn launch(&self, registry: &mut ProcessRegistry, node: &Node, program: &Path) {
        let spec = LaunchSpec::new(&node.name, program)
            .env(
                &self.workload.config_env,
                self.store.path_for(&node.name).to_string_lossy(),
            )
            .env(&self.workload.name_env, &node.name)
            .output_to(self.output_path(&node.name));

        match self.platform.spawn(Some(&node.name), &spec).await {
            Ok(handle) => {
                METRICS.inc_processes_spawned();
                registry.register(handle);
            }
            Err(e) => {
                METRICS.inc_spawn_failures();
                warn!(node = %node.name, role = %node.role, error = %e, "Workload failed to start");
            }
        }
    }

    /// Poll for the readiness marker until it appears or the timeout elapses.
    async fn await_readiness(&self) -> Result<()> {
        let marker = &self.workload.readiness_marker;
        let timeout = self.timing.readiness_timeout();
        let deadline = Instant::now() + timeout;

        loop {
            if marker.exists() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TestbedError::ReadinessTimeout {
                    marker: marker.clone(),
                    waited_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.timing.poll_interval()).await;
        }
    }

    async fn await_collector(&self, registry: &mut ProcessRegistry) -> Result<RunOutcome> {
        let timeout = self.timing.collector_timeout();
        let collector = registry
            .collector_mut()
            .ok_or_else(|| TestbedError::ConfigNotFound(COLLECTOR_NAME.to_string()))?;

        match tokio::time::timeout(timeout, collector.wait()).await {
            Ok(Ok(0)) => Ok(RunOutcome::Success),
            Ok(Ok(code)) => Ok(RunOutcome::failure(FailureReason::CollectorExit { code })),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Collector timed out");
                Ok(RunOutcome::failure(FailureReason::CollectorTimeout {
                    waited_secs: timeout.as_secs(),
                }))
            }
        }
    }

    /// Return to a clean slate after an attempt. Idempotent and infallible:
    /// anything that cannot be removed is logged.
    async fn cleanup(&mut self, registry: &mut ProcessRegistry, run_index: u32, attempt: u32) {
        let terminated = registry.terminate_all().await;

        if let Some(dns) = self.dns.as_deref_mut() {
            if dns.needs_stop() {
                dns.stop().await;
            }
        }

        let mut removed = 0;
        match remove_file_if_exists(&self.workload.readiness_marker) {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => obs::emit_best_effort_failure("cleanup.marker", &e),
        }
        for node in self.topology.workload_nodes() {
            let log = self.log_dir.join(format!("{}.log", node.name));
            for file in [log, self.output_path(&node.name)] {
                match remove_file_if_exists(&file) {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(e) => obs::emit_best_effort_failure("cleanup.log", &e),
                }
            }
        }
        match remove_prefixed(
            &self.workload.runtime_dir,
            &self.workload.runtime_artifact_prefix,
        ) {
            Ok(count) => removed += count,
            Err(e) => obs::emit_best_effort_failure("cleanup.runtime", &e),
        }

        METRICS.inc_cleanups();
        obs::emit_cleanup(run_index, attempt, terminated, removed);
    }
}

//! Structured lifecycle events of an evaluation.
//!
//! Every event is an `info!` (or `warn!`) line carrying an `event` field,
//! e.g. `event=run.attempt run_index=1 attempt=2 success=true`.

use tracing::{info, warn};

use crate::domain::{RunOutcome, VariantId};

/// Span covering a whole evaluation.
pub fn evaluation_span(variant: VariantId, hosts: u32) -> tracing::Span {
    tracing::info_span!("testbed.evaluation", variant = %variant, hosts = hosts)
}

/// Span covering one attempt of one run.
pub fn attempt_span(run_index: u32, attempt: u32) -> tracing::Span {
    tracing::info_span!("testbed.attempt", run_index = run_index, attempt = attempt)
}

pub fn emit_run_started(variant: VariantId, hosts: u32, runs: u32) {
    info!(event = "run.started", variant = %variant, hosts = hosts, runs = runs);
}

pub fn emit_run_finished(variant: VariantId, runs: u32, attempts: usize, duration_ms: u64) {
    info!(
        event = "run.finished",
        variant = %variant,
        runs = runs,
        attempts = attempts,
        duration_ms = duration_ms,
    );
}

pub fn emit_attempt_started(run_index: u32, attempt: u32) {
    info!(event = "run.attempt_started", run_index = run_index, attempt = attempt);
}

pub fn emit_attempt(run_index: u32, attempt: u32, outcome: &RunOutcome, duration_ms: i64) {
    match outcome {
        RunOutcome::Success => info!(
            event = "run.attempt",
            run_index = run_index,
            attempt = attempt,
            success = true,
            duration_ms = duration_ms,
        ),
        RunOutcome::Failure { reason } => warn!(
            event = "run.attempt",
            run_index = run_index,
            attempt = attempt,
            success = false,
            reason = %reason,
            duration_ms = duration_ms,
        ),
    }
}

pub fn emit_cleanup(run_index: u32, attempt: u32, terminated: usize, removed_files: usize) {
    info!(
        event = "run.cleanup",
        run_index = run_index,
        attempt = attempt,
        terminated = terminated,
        removed_files = removed_files,
    );
}

pub fn emit_teardown(hosts_removed: usize, artifacts_removed: usize) {
    info!(
        event = "evaluation.teardown",
        hosts_removed = hosts_removed,
        artifacts_removed = artifacts_removed,
    );
}

/// Warning for a best-effort step that failed without aborting anything.
pub fn emit_best_effort_failure(step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "best_effort.failed", step = %step, error = %error);
}

//! Evaluation run records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::variant::VariantId;

/// States an attempt moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    CollectorStarted,
    DnsStarted,
    PublisherStarted,
    AwaitingReady,
    SubscribersStarted,
    AwaitingCompletion,
    RunSucceeded,
    RunFailed,
    Cleanup,
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The collector exited with a non-zero code.
    CollectorExit { code: i32 },
    /// The collector did not exit within its timeout.
    CollectorTimeout { waited_secs: u64 },
    /// The publisher never signalled readiness.
    ReadinessTimeout { waited_secs: u64 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::CollectorExit { code } => write!(f, "collector exited with {code}"),
            FailureReason::CollectorTimeout { waited_secs } => {
                write!(f, "collector still running after {waited_secs}s")
            }
            FailureReason::ReadinessTimeout { waited_secs } => {
                write!(f, "publisher not ready after {waited_secs}s")
            }
        }
    }
}

/// Outcome of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure { reason: FailureReason },
}

impl RunOutcome {
    pub fn failure(reason: FailureReason) -> Self {
        RunOutcome::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }
}

/// Record of one attempt at one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based index of the run this attempt belongs to.
    pub run_index: u32,
    /// 1-based attempt number within the run.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    /// States visited, ending in `Cleanup`.
    pub states: Vec<RunState>,
}

impl AttemptRecord {
    pub fn cleaned_up(&self) -> bool {
        self.states.last() == Some(&RunState::Cleanup)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Everything the run loop did for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub variant: VariantId,
    pub runs_requested: u32,
    pub attempts: Vec<AttemptRecord>,
}

impl RunReport {
    pub fn new(variant: VariantId, runs_requested: u32) -> Self {
        Self {
            variant,
            runs_requested,
            attempts: Vec::new(),
        }
    }

    /// Runs that ended in a successful attempt.
    pub fn completed_runs(&self) -> u32 {
        self.attempts
            .iter()
            .filter(|a| a.outcome.is_success())
            .count() as u32
    }

    pub fn attempts_for(&self, run_index: u32) -> Vec<&AttemptRecord> {
        self.attempts
            .iter()
            .filter(|a| a.run_index == run_index)
            .collect()
    }

    pub fn failed_attempts(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| !a.outcome.is_success())
            .count()
    }

    pub fn cleanup_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.cleaned_up()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_runs() == self.runs_requested
    }
}

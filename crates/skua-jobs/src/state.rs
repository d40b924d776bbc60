//! Job lifecycle states and the transition table.
//!
//! The transition table is an immutable value injected into the
//! orchestrator rather than a process-wide constant, so tests can
//! substitute a different table without touching global state.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Job state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Verified and persisted, waiting for file staging.
    Validated,
    /// Input files staged, backend notified.
    Prepared,
    /// Queued at the backend's scheduler.
    Scheduled,
    /// Actively executing.
    Running,
    /// Output files transferred back, result folder materialized.
    TransferSuccess,
    /// Completed successfully.
    Success,
    /// Completed unsuccessfully or failed mid-flight.
    Failure,
}

impl JobState {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validated => write!(f, "VALIDATED"),
            Self::Prepared => write!(f, "PREPARED"),
            Self::Scheduled => write!(f, "SCHEDULED"),
            Self::Running => write!(f, "RUNNING"),
            Self::TransferSuccess => write!(f, "TRANSFER_SUCCESS"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

/// The set of transitions the orchestrator accepts.
///
/// The default table is the production contract shared by all compute
/// backends. `FAILURE -> FAILURE` is the single self-loop: re-failing an
/// already failed job must stay idempotent.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    allowed: HashMap<JobState, HashSet<JobState>>,
}

impl Default for TransitionTable {
    fn default() -> Self {
        use JobState::{Failure, Prepared, Running, Scheduled, Success, TransferSuccess, Validated};

        let terminal: HashSet<JobState> = [Success, Failure].into();
        let with_terminal = |states: &[JobState]| -> HashSet<JobState> {
            states.iter().copied().chain(terminal.iter().copied()).collect()
        };

        let mut allowed = HashMap::new();
        allowed.insert(Validated, with_terminal(&[Prepared]));
        allowed.insert(Prepared, with_terminal(&[Scheduled, Running, TransferSuccess]));
        // Scheduling may skip straight to running for quick jobs.
        allowed.insert(Scheduled, with_terminal(&[Running, TransferSuccess]));
        allowed.insert(Running, [TransferSuccess, Failure].into());
        allowed.insert(TransferSuccess, [Success, Failure].into());
        allowed.insert(Failure, [Failure].into());
        allowed.insert(Success, HashSet::new());

        Self { allowed }
    }
}

impl TransitionTable {
    /// Returns true if the table permits moving from `from` to `to`.
    #[must_use]
    pub fn allows(&self, from: JobState, to: JobState) -> bool {
        self.allowed.get(&from).is_some_and(|targets| targets.contains(&to))
    }

    /// Returns the allowed targets for a state.
    #[must_use]
    pub fn targets(&self, from: JobState) -> HashSet<JobState> {
        self.allowed.get(&from).cloned().unwrap_or_default()
    }
}

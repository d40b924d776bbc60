//! Pluggable storage for job records.
//!
//! The [`JobStore`] trait defines the persistence layer for jobs. It is the
//! single source of truth and the only shared mutable resource in the
//! orchestration domain.
//!
//! ## Design Principles
//!
//! - **CAS semantics**: State transitions use compare-and-swap keyed on
//!   `(id, expected_state)` to prevent read-decide-write races
//! - **Atomic side effects**: `started_at` stamping and `modified_at`
//!   bumping happen inside the same write as the transition
//! - **Testability**: In-memory implementation for testing, SQL for
//!   production

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use skua_core::JobId;

use crate::error::Result;
use crate::job::{Job, JobWithToken};
use crate::state::JobState;

/// Result of a compare-and-swap state update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// Operation succeeded.
    Success,
    /// No job row matched the id.
    NotFound,
    /// The job's current state didn't match the expected value.
    StateMismatch {
        /// The actual state that was found.
        actual: JobState,
    },
}

impl CasResult {
    /// Returns true if the operation succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if no row matched.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Cursor-less pagination request.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Number of items per page.
    pub items_per_page: usize,
    /// Zero-indexed page number.
    pub page: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            items_per_page: 25,
            page: 0,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Total number of matching items across all pages.
    pub items_in_total: usize,
    /// The items on this page.
    pub items: Vec<T>,
}

/// Storage abstraction for job records.
///
/// ## CAS Semantics
///
/// [`JobStore::update_state_and_status`] is the core primitive for
/// transition correctness: two concurrent proposals validated against the
/// same snapshot cannot both win, because the second write observes a
/// mismatching `expected_state` and reports it instead of clobbering.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new job row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Conflict`] if the id already exists.
    async fn create(&self, job: &JobWithToken) -> Result<()>;

    /// Atomically transitions the job's state if the current state matches
    /// `expected_state`.
    ///
    /// On success, in the same write:
    /// - `status` replaces the status message when provided
    /// - `failed_state` is recorded when provided
    /// - `modified_at` is bumped
    /// - `started_at` is stamped exactly when `new_state` is `RUNNING` and
    ///   it was previously unset
    ///
    /// # Errors
    ///
    /// Returns an error only for storage-level failures; contention and
    /// missing rows are reported through [`CasResult`].
    async fn update_state_and_status(
        &self,
        id: JobId,
        expected_state: JobState,
        new_state: JobState,
        status: Option<&str>,
        failed_state: Option<JobState>,
    ) -> Result<CasResult>;

    /// Updates only the status message, bumping `modified_at`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::NotFound`] if no row matched.
    async fn update_status(&self, id: JobId, status: &str) -> Result<()>;

    /// Attaches a working-directory handle to the job record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::NotFound`] if no row matched.
    async fn update_workspace(&self, id: JobId, workspace: &str) -> Result<()>;

    /// Gets a job by id.
    ///
    /// Returns `None` if the job does not exist.
    async fn find_by_id(&self, id: JobId) -> Result<Option<JobWithToken>>;

    /// Gets all jobs matching the given ids; missing ids are skipped.
    async fn find_many(&self, ids: &[JobId]) -> Result<Vec<JobWithToken>>;

    /// Lists a user's jobs, newest first.
    async fn list(&self, owner: &str, pagination: Pagination) -> Result<Page<Job>>;

    /// Gets all non-terminal jobs created before the cutoff.
    ///
    /// Used by the reaper; terminal jobs are excluded because they need no
    /// further lifecycle progress.
    async fn list_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<JobWithToken>>;
}

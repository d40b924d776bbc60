//! In-memory store implementation for testing.
//!
//! This module provides [`InMemoryJobStore`], a simple in-memory
//! implementation of the [`JobStore`] trait suitable for testing and
//! development.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, no cross-process
//!   coordination
//! - **Single-process only**: State is not shared across process boundaries

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use skua_core::JobId;

use super::{CasResult, JobStore, Page, Pagination};
use crate::error::{Error, Result};
use crate::job::{Job, JobWithToken};
use crate::state::JobState;

/// In-memory job store for testing.
///
/// Thread-safe via `RwLock`; the lock is held across the full
/// compare-and-swap body, which gives the atomicity the trait requires.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobWithToken>>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryJobStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of jobs currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn job_count(&self) -> Result<usize> {
        let jobs = self.jobs.read().map_err(poison_err)?;
        Ok(jobs.len())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &JobWithToken) -> Result<()> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        if jobs.contains_key(&job.job.id) {
            return Err(Error::Conflict { job_id: job.job.id });
        }
        jobs.insert(job.job.id, job.clone());
        Ok(())
    }

    async fn update_state_and_status(
        &self,
        id: JobId,
        expected_state: JobState,
        new_state: JobState,
        status: Option<&str>,
        failed_state: Option<JobState>,
    ) -> Result<CasResult> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;

        let Some(entry) = jobs.get_mut(&id) else {
            return Ok(CasResult::NotFound);
        };

        if entry.job.current_state != expected_state {
            return Ok(CasResult::StateMismatch {
                actual: entry.job.current_state,
            });
        }

        let now = Utc::now();
        entry.job.current_state = new_state;
        if let Some(status) = status {
            entry.job.status = status.to_string();
        }
        if let Some(failed_state) = failed_state {
            entry.job.failed_state = Some(failed_state);
        }
        if new_state == JobState::Running && entry.job.started_at.is_none() {
            entry.job.started_at = Some(now);
        }
        entry.job.modified_at = now;

        Ok(CasResult::Success)
    }

    async fn update_status(&self, id: JobId, status: &str) -> Result<()> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        let Some(entry) = jobs.get_mut(&id) else {
            return Err(Error::NotFound { job_id: id });
        };
        entry.job.status = status.to_string();
        entry.job.modified_at = Utc::now();
        Ok(())
    }

    async fn update_workspace(&self, id: JobId, workspace: &str) -> Result<()> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        let Some(entry) = jobs.get_mut(&id) else {
            return Err(Error::NotFound { job_id: id });
        };
        entry.job.workspace = Some(workspace.to_string());
        entry.job.modified_at = Utc::now();
        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<JobWithToken>> {
        let jobs = self.jobs.read().map_err(poison_err)?;
        Ok(jobs.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[JobId]) -> Result<Vec<JobWithToken>> {
        let jobs = self.jobs.read().map_err(poison_err)?;
        Ok(ids.iter().filter_map(|id| jobs.get(id).cloned()).collect())
    }

    async fn list(&self, owner: &str, pagination: Pagination) -> Result<Page<Job>> {
        let jobs = self.jobs.read().map_err(poison_err)?;

        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|entry| entry.job.owner == owner)
            .map(|entry| entry.job.clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let items_in_total = matching.len();
        let items = matching
            .into_iter()
            .skip(pagination.page * pagination.items_per_page)
            .take(pagination.items_per_page)
            .collect();

        Ok(Page {
            items_in_total,
            items,
        })
    }

    async fn list_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<JobWithToken>> {
        let jobs = self.jobs.read().map_err(poison_err)?;
        let mut matching: Vec<JobWithToken> = jobs
            .values()
            .filter(|entry| !entry.job.is_terminal() && entry.job.created_at < cutoff)
            .cloned()
            .collect();
        matching.sort_by_key(|entry| entry.job.created_at);
        Ok(matching)
    }
}

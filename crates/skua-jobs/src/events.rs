//! Outgoing event streams for state changes and accounting.
//!
//! The orchestrator produces two append-only streams:
//!
//! - **State changes**: one [`JobStateChange`] per accepted transition,
//!   emitted once the transition is judged valid and before it is durably
//!   applied. Ordered per job id.
//! - **Accounting**: one [`JobCompletedEvent`] per completion report, the
//!   record billing/usage downstream consumes.
//!
//! The [`EventChannel`] trait is the seam between the orchestrator and the
//! concrete streaming system; callers decide how events are persisted.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skua_core::{JobId, SimpleDuration};

use crate::error::{Error, Result};
use crate::job::ApplicationRef;
use crate::state::JobState;

/// A state-change notification for a single job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStateChange {
    /// The job the change applies to.
    pub job_id: JobId,
    /// The state the job is moving to.
    pub new_state: JobState,
}

/// The accounting record emitted when a job is told it completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletedEvent {
    /// The completed job.
    pub job_id: JobId,
    /// Username of the job owner, for billing attribution.
    pub owner: String,
    /// Wall-clock duration the job ran for, as reported by the backend.
    pub wall_duration: SimpleDuration,
    /// Number of nodes the job occupied.
    pub nodes: u32,
    /// When the completion was recorded.
    pub timestamp: DateTime<Utc>,
    /// The application the job ran.
    pub application: ApplicationRef,
    /// Whether the job completed successfully.
    pub success: bool,
}

/// A sink for events emitted by orchestration operations.
///
/// Implementations must preserve emission order per job id on the
/// state-change stream; events for different jobs carry no relative
/// ordering guarantee.
#[async_trait]
pub trait EventChannel<E: Send + 'static>: Send + Sync {
    /// Appends an event to the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Channel`] if the event could not be appended.
    async fn emit(&self, event: E) -> Result<()>;
}

/// In-memory channel collecting events for tests and local development.
#[derive(Debug)]
pub struct InMemoryChannel<E> {
    events: Mutex<Vec<E>>,
}

impl<E> Default for InMemoryChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Channel {
        message: "channel lock poisoned".into(),
    }
}

impl<E> InMemoryChannel<E> {
    /// Creates a new empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Drains the channel, returning all events in emission order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn drain(&self) -> Result<Vec<E>> {
        let mut events = self.events.lock().map_err(poison_err)?;
        Ok(std::mem::take(&mut *events))
    }

    /// Returns the number of collected events.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        let events = self.events.lock().map_err(poison_err)?;
        Ok(events.len())
    }

    /// Returns true if no events have been collected.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<E: Clone> InMemoryChannel<E> {
    /// Returns a copy of all collected events in emission order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn emitted(&self) -> Result<Vec<E>> {
        let events = self.events.lock().map_err(poison_err)?;
        Ok(events.clone())
    }
}

#[async_trait]
impl<E: Clone + Send + 'static> EventChannel<E> for InMemoryChannel<E> {
    async fn emit(&self, event: E) -> Result<()> {
        let mut events = self.events.lock().map_err(poison_err)?;
        events.push(event);
        Ok(())
    }
}

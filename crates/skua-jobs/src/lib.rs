//! # skua-jobs
//!
//! Job orchestration engine for the skua compute platform.
//!
//! This crate owns the authoritative lifecycle of a job from submission to
//! termination:
//!
//! - **State Machine**: A strict transition contract shared by all compute
//!   backends, enforced with compare-and-swap persistence
//! - **File Staging**: Concurrent input transfers into a backend's working
//!   directory and result uploads back out
//! - **Recovery**: Any step can fail and the job still ends up in a
//!   terminal, auditable state
//! - **Reaping**: Jobs stuck non-terminal past their time-to-live are
//!   force-failed through the normal path
//!
//! ## Core Concepts
//!
//! - **Job**: One submitted unit of computational work, stored as a single
//!   row keyed by a [`skua_core::JobId`]
//! - **Backend**: An external scheduler/runtime addressed by name through a
//!   fixed capability interface
//! - **Events**: Two append-only streams — state changes (ordered per job)
//!   and accounting records
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use skua_jobs::config::OrchestratorConfig;
//! use skua_jobs::events::InMemoryChannel;
//! use skua_jobs::orchestrator::JobOrchestrator;
//! use skua_jobs::staging::{JobFileService, StagingMode};
//! use skua_jobs::state::TransitionTable;
//! use skua_jobs::store::memory::InMemoryJobStore;
//!
//! # fn demo(
//! #     registry: Arc<skua_jobs::backend::BackendRegistry>,
//! #     verifier: Arc<dyn skua_jobs::verify::JobVerifier>,
//! #     storage: Arc<dyn skua_jobs::staging::UserStorage>,
//! # ) {
//! let store = Arc::new(InMemoryJobStore::new());
//! let files = Arc::new(JobFileService::new(
//!     storage,
//!     registry.clone(),
//!     StagingMode::LetFinish,
//! ));
//! let orchestrator = JobOrchestrator::new(
//!     store,
//!     registry,
//!     verifier,
//!     files,
//!     Arc::new(InMemoryChannel::new()),
//!     Arc::new(InMemoryChannel::new()),
//!     TransitionTable::default(),
//!     OrchestratorConfig::default(),
//! );
//! # let _ = orchestrator;
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod follow;
pub mod job;
pub mod orchestrator;
pub mod reaper;
pub mod staging;
pub mod state;
pub mod store;
pub mod verify;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::backend::{BackendRegistry, ComputeBackend, StagedFile};
    pub use crate::config::OrchestratorConfig;
    pub use crate::error::{Error, Result};
    pub use crate::events::{EventChannel, InMemoryChannel, JobCompletedEvent, JobStateChange};
    pub use crate::follow::{FollowStreamsRequest, FollowStreamsResponse, StreamFollowService};
    pub use crate::job::{ApplicationRef, Job, JobWithToken};
    pub use crate::orchestrator::{CallOrigin, JobOrchestrator, RecoveryOutcome};
    pub use crate::staging::{JobFileService, StagingMode, UserStorage};
    pub use crate::state::{JobState, TransitionTable};
    pub use crate::store::{CasResult, JobStore, Page, Pagination};
    pub use crate::verify::{JobSubmission, JobVerifier};
}

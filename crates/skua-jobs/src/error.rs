//! Error types for the job orchestration domain.

use skua_core::JobId;

use crate::state::JobState;

/// The result type used throughout skua-jobs.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in orchestration operations.
///
/// The variants split into two classes:
///
/// - **Validation errors** never mutate state and are always surfaced to the
///   immediate caller ([`Error::is_validation`]).
/// - **Execution errors** pass through the orchestrator's recovery policy,
///   which records a failure outcome on the job before deciding whether to
///   re-raise.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The referenced job does not exist.
    #[error("job not found: {job_id}")]
    NotFound {
        /// The job ID that was looked up.
        job_id: JobId,
    },

    /// A proposed transition was rejected by the state table.
    #[error("invalid state transition: {from} -> {to}")]
    BadStateTransition {
        /// The job's current state.
        from: JobState,
        /// The proposed target state.
        to: JobState,
    },

    /// The caller is not the registered backend for the job's backend.
    #[error("'{principal}' is not authorized to act as backend '{backend}'")]
    Unauthorized {
        /// The caller's username.
        principal: String,
        /// The backend the caller attempted to act as.
        backend: String,
    },

    /// No backend is registered under the given name.
    #[error("compute backend not found: {name}")]
    BackendNotFound {
        /// The name that failed to resolve.
        name: String,
    },

    /// A job with this ID already exists.
    #[error("job already exists: {job_id}")]
    Conflict {
        /// The conflicting job ID.
        job_id: JobId,
    },

    /// A submission failed a pre-verification guard.
    #[error("invalid submission: {message}")]
    InvalidSubmission {
        /// Description of the rejected field.
        message: String,
    },

    /// One or more input-file transfers failed during staging.
    #[error("file transfer failed: {message}")]
    TransferError {
        /// Description of the first observed transfer failure.
        message: String,
    },

    /// A backend refused a job notification.
    #[error("backend '{backend}' rejected the job: {message}")]
    BackendRejected {
        /// The backend that rejected the job.
        backend: String,
        /// The backend's stated reason.
        message: String,
    },

    /// A job record store operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An event could not be published to its channel.
    #[error("event channel error: {message}")]
    Channel {
        /// Description of the channel failure.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },

    /// An error from skua-core.
    #[error("core error: {0}")]
    Core(#[from] skua_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a new transfer error.
    #[must_use]
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::TransferError {
            message: message.into(),
        }
    }

    /// Returns true for validation-class errors.
    ///
    /// Validation errors are pure: they never mutate job state and bypass
    /// the recovery policy entirely.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::BadStateTransition { .. }
                | Self::Unauthorized { .. }
                | Self::BackendNotFound { .. }
                | Self::Conflict { .. }
                | Self::InvalidSubmission { .. }
        )
    }

    /// Returns the message safe to record on the job and show to callers.
    ///
    /// Well-known, client-meaningful failures yield their own message;
    /// anything else is sanitized to a generic message so internals never
    /// leak into job records.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Storage { .. } | Self::Channel { .. } | Self::Internal { .. } | Self::Core(_) => {
                "Internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

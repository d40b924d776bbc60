//! Compute backend capability interface and registry.
//!
//! A backend is an external system (batch scheduler, container runtime)
//! that actually executes jobs. The orchestrator is backend-agnostic: it
//! talks to every backend through the same fixed capability interface and
//! resolves backends by name from a table built at startup.
//!
//! ## Authorization Boundary
//!
//! [`BackendRegistry::resolve_and_authorize`] is the sole check preventing
//! backend A from mutating backend B's jobs: a caller must either be a
//! privileged system principal or the service principal registered under
//! the backend's own name.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use skua_core::{Principal, Role};

use crate::error::{Error, Result};
use crate::job::Job;

/// A line-offset request against a job's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowLogsRequest {
    /// First stdout line to return.
    pub stdout_line_start: u64,
    /// Maximum number of stdout lines to return.
    pub stdout_max_lines: u64,
    /// First stderr line to return.
    pub stderr_line_start: u64,
    /// Maximum number of stderr lines to return.
    pub stderr_max_lines: u64,
}

/// The backend's raw answer to a [`FollowLogsRequest`].
///
/// Offsets are backend-interpreted; the orchestrator performs no local
/// buffering or caching of log content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendLogChunk {
    /// Stdout lines, newline-joined.
    pub stdout: String,
    /// The offset a follow-up request should pass as `stdout_line_start`.
    pub stdout_next_line: u64,
    /// Stderr lines, newline-joined.
    pub stderr: String,
    /// The offset a follow-up request should pass as `stderr_line_start`.
    pub stderr_next_line: u64,
}

/// An input file streamed to a backend's working directory.
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// Stable identifier of the file within the job.
    pub file_id: String,
    /// Path inside the job's working directory to write to.
    pub destination_path: String,
    /// Content length in bytes.
    pub length: u64,
    /// The file content.
    pub data: Bytes,
}

/// The capability interface every compute backend implements.
///
/// Exactly four outbound operations plus one inbound streamed operation;
/// one concrete adapter exists per backend kind, registered by name in the
/// [`BackendRegistry`].
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// The name this backend registers under.
    fn name(&self) -> &str;

    /// Notifies the backend that a job was verified and accepted.
    ///
    /// # Errors
    ///
    /// A backend may reject the job here, aborting submission before any
    /// persistence ([`Error::BackendRejected`]).
    async fn notify_verified(&self, job: &Job) -> Result<()>;

    /// Notifies the backend that the job's input files are staged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendRejected`] if the backend refuses the job.
    async fn notify_prepared(&self, job: &Job) -> Result<()>;

    /// Tells the backend to release all resources held for the job.
    ///
    /// # Errors
    ///
    /// Cleanup failures are logged by the orchestrator and never escalated.
    async fn cleanup(&self, job: &Job) -> Result<()>;

    /// Forwards a line-offset request against the job's standard streams.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot serve the request.
    async fn follow_logs(&self, job: &Job, request: &FollowLogsRequest)
        -> Result<BackendLogChunk>;

    /// Streams an input file into the job's working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot accept the file.
    async fn submit_file(&self, job: &Job, file: StagedFile) -> Result<()>;
}

/// Name-keyed table of compute backends, built at startup.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn ComputeBackend>>,
}

impl BackendRegistry {
    /// Builds a registry from the configured backends.
    #[must_use]
    pub fn new(backends: impl IntoIterator<Item = Arc<dyn ComputeBackend>>) -> Self {
        let backends = backends
            .into_iter()
            .map(|backend| (backend.name().to_string(), backend))
            .collect();
        Self { backends }
    }

    /// Resolves a backend by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendNotFound`] if no backend registered under
    /// the name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ComputeBackend>> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| Error::BackendNotFound {
                name: name.to_string(),
            })
    }

    /// Resolves a backend and verifies the caller may act as it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendNotFound`] if the name does not resolve and
    /// [`Error::Unauthorized`] unless the caller is a privileged principal
    /// or the service principal registered under `name`.
    pub fn resolve_and_authorize(
        &self,
        name: &str,
        principal: &Principal,
    ) -> Result<Arc<dyn ComputeBackend>> {
        let backend = self.resolve(name)?;
        let is_own_backend = principal.role == Role::Service && principal.username == name;
        if principal.is_privileged() || is_own_backend {
            Ok(backend)
        } else {
            Err(Error::Unauthorized {
                principal: principal.username.clone(),
                backend: name.to_string(),
            })
        }
    }

    /// Returns the registered backend names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

//! Following a running job's standard streams through its backend.
//!
//! No log content is buffered or cached locally: offsets are
//! caller-supplied and backend-interpreted, and the backend's raw output is
//! merged with job metadata before being returned.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use skua_core::{JobId, Principal, Role};

use crate::backend::{BackendRegistry, FollowLogsRequest};
use crate::error::{Error, Result};
use crate::job::ApplicationRef;
use crate::staging::JobFileService;
use crate::state::JobState;
use crate::store::JobStore;

/// A request to follow a job's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowStreamsRequest {
    /// The job to follow.
    pub job_id: JobId,
    /// First stdout line to return.
    pub stdout_line_start: u64,
    /// Maximum number of stdout lines to return.
    pub stdout_max_lines: u64,
    /// First stderr line to return.
    pub stderr_line_start: u64,
    /// Maximum number of stderr lines to return.
    pub stderr_max_lines: u64,
}

/// The backend's output merged with job metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowStreamsResponse {
    /// The followed job.
    pub job_id: JobId,
    /// Stdout lines, newline-joined.
    pub stdout: String,
    /// The offset a follow-up request should pass as `stdout_line_start`.
    pub stdout_next_line: u64,
    /// Stderr lines, newline-joined.
    pub stderr: String,
    /// The offset a follow-up request should pass as `stderr_line_start`.
    pub stderr_next_line: u64,
    /// The application the job runs.
    pub application: ApplicationRef,
    /// The job's current state.
    pub state: JobState,
    /// Whether the state is terminal.
    pub is_terminal: bool,
    /// The job's current status message.
    pub status: String,
    /// Path of the job's result folder.
    pub result_folder: String,
}

/// Tails a job's standard output/error through the owning backend.
pub struct StreamFollowService {
    store: Arc<dyn JobStore>,
    registry: Arc<BackendRegistry>,
    files: Arc<JobFileService>,
}

impl StreamFollowService {
    /// Creates a follow service over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<BackendRegistry>,
        files: Arc<JobFileService>,
    ) -> Self {
        Self {
            store,
            registry,
            files,
        }
    }

    /// Forwards the line-offset request to the job's backend.
    ///
    /// The caller must be the job's owner, a privileged principal, or the
    /// service principal of the job's backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown job,
    /// [`Error::Unauthorized`] for a disallowed caller, and whatever the
    /// backend surfaces for the follow call itself.
    #[tracing::instrument(skip(self, principal), fields(job_id = %request.job_id))]
    pub async fn follow_streams(
        &self,
        request: &FollowStreamsRequest,
        principal: &Principal,
    ) -> Result<FollowStreamsResponse> {
        let jwt = self
            .store
            .find_by_id(request.job_id)
            .await?
            .ok_or(Error::NotFound {
                job_id: request.job_id,
            })?;
        let job = &jwt.job;

        let is_owner = principal.role == Role::User && principal.username == job.owner;
        let backend = if is_owner {
            self.registry.resolve(&job.backend)?
        } else {
            self.registry.resolve_and_authorize(&job.backend, principal)?
        };

        let chunk = backend
            .follow_logs(
                job,
                &FollowLogsRequest {
                    stdout_line_start: request.stdout_line_start,
                    stdout_max_lines: request.stdout_max_lines,
                    stderr_line_start: request.stderr_line_start,
                    stderr_max_lines: request.stderr_max_lines,
                },
            )
            .await?;

        Ok(FollowStreamsResponse {
            job_id: job.id,
            stdout: chunk.stdout,
            stdout_next_line: chunk.stdout_next_line,
            stderr: chunk.stderr,
            stderr_next_line: chunk.stderr_next_line,
            application: job.application.clone(),
            state: job.current_state,
            is_terminal: job.current_state.is_terminal(),
            status: job.status.clone(),
            result_folder: self.files.result_folder(job),
        })
    }
}

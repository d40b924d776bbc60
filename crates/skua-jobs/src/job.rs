//! The job record: the central entity tracked by the orchestrator.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skua_core::{JobId, Redacted, SimpleDuration};

use crate::state::JobState;

/// A name+version reference to an application in the application store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRef {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
}

impl std::fmt::Display for ApplicationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Application store metadata resolved at verification time.
///
/// Resolution may legitimately fail after the fact (the application can be
/// removed from the store while the job record lives on), so the job record
/// carries this as an optional snapshot and lookups never depend on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedApplication {
    /// Human-readable title.
    pub title: String,
    /// The tool (container image / module) the application runs.
    pub tool: String,
}

/// One input file to stage into the backend's working environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFile {
    /// Stable identifier of this file within the job.
    pub id: String,
    /// Path in the owner's storage to read from.
    pub source_path: String,
    /// Path inside the job's working directory to write to.
    pub destination_path: String,
}

/// A shared file system to be mounted inside the job's environment.
///
/// A backend is allowed to reject a mount it does not support; this should
/// happen early, in `notify_verified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedFileSystemMount {
    /// Identifier of the shared file system.
    pub file_system_id: String,
    /// Mount point inside the job's environment.
    pub mount_path: String,
}

/// A networking link to another job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPeer {
    /// Hostname the peer should be reachable under.
    pub name: String,
    /// The peer job.
    pub job_id: JobId,
}

/// The verified job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job identifier, assigned at creation and immutable.
    pub id: JobId,
    /// Optional human-assigned name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Username of the job owner.
    pub owner: String,
    /// Project the job belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Name of the compute backend that owns this job.
    pub backend: String,
    /// The application this job runs.
    pub application: ApplicationRef,
    /// Resolved application metadata, absent when the application was
    /// removed from the store after submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_application: Option<ResolvedApplication>,
    /// Number of nodes requested.
    pub nodes: u32,
    /// Number of tasks per node requested.
    pub tasks_per_node: u32,
    /// Maximum wall-clock time the job may run for.
    pub max_time: SimpleDuration,
    /// Opaque name→value input parameters.
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    /// Input files staged before the backend prepares the job.
    #[serde(default)]
    pub files: Vec<InputFile>,
    /// Additional directories mounted into the working environment.
    #[serde(default)]
    pub mounts: Vec<InputFile>,
    /// Shared file systems mounted inside the environment.
    #[serde(default)]
    pub shared_file_system_mounts: Vec<SharedFileSystemMount>,
    /// Networking links to other jobs.
    #[serde(default)]
    pub peers: Vec<JobPeer>,
    /// Working-directory handle, attached once the backend allocates one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Collection the results are archived into.
    pub archive_in_collection: String,
    /// Current lifecycle state.
    pub current_state: JobState,
    /// The state the job was in when it transitioned to `FAILURE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_state: Option<JobState>,
    /// Free-text, human-readable status message.
    pub status: String,
    /// When the job record was created.
    pub created_at: DateTime<Utc>,
    /// When the job record was last updated.
    pub modified_at: DateTime<Utc>,
    /// When the job first entered `RUNNING`; set at most once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Returns true if the job is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }

    /// Returns the wall-clock time remaining before the job hits its limit.
    ///
    /// `None` until the job has started; floored at zero afterwards.
    #[must_use]
    pub fn time_left(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started_at = self.started_at?;
        let deadline = started_at + chrono::Duration::milliseconds(self.max_time.to_millis() as i64);
        let left = (deadline - now).num_milliseconds().max(0);
        Some(Duration::from_millis(left.unsigned_abs()))
    }
}

/// A job record paired with the access token used to act on the owner's
/// behalf during file operations.
///
/// The token never leaves the staging flow; its `Debug` output is redacted.
#[derive(Debug, Clone)]
pub struct JobWithToken {
    /// The job record.
    pub job: Job,
    /// Access token authenticating file operations as the job owner.
    pub access_token: Redacted<String>,
}

impl JobWithToken {
    /// Pairs a job with its access token.
    #[must_use]
    pub fn new(job: Job, access_token: impl Into<String>) -> Self {
        Self {
            job,
            access_token: Redacted::new(access_token.into()),
        }
    }
}

/// Builds a minimal valid job record for unit tests.
#[cfg(test)]
pub(crate) fn test_job(id: JobId) -> Job {
    Job {
        id,
        name: None,
        owner: "alice".into(),
        project: None,
        backend: "slurm".into(),
        application: ApplicationRef {
            name: "blast".into(),
            version: "2.9.0".into(),
        },
        resolved_application: Some(ResolvedApplication {
            title: "BLAST".into(),
            tool: "blast-container".into(),
        }),
        nodes: 2,
        tasks_per_node: 4,
        max_time: SimpleDuration::new(1, 0, 0).expect("static duration is valid"),
        parameters: HashMap::new(),
        files: Vec::new(),
        mounts: Vec::new(),
        shared_file_system_mounts: Vec::new(),
        peers: Vec::new(),
        workspace: None,
        archive_in_collection: "BLAST".into(),
        current_state: JobState::Validated,
        failed_state: None,
        status: "Validated".into(),
        created_at: Utc::now(),
        modified_at: Utc::now(),
        started_at: None,
    }
}

//! The verification seam between raw submissions and verified jobs.
//!
//! Verification is an external collaborator: it resolves the application,
//! validates parameters and mounts, mints the owner-scoped access token and
//! assigns the job its identity. The orchestrator treats all of that as
//! opaque and only consumes the resulting [`JobWithToken`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use skua_core::{Principal, SimpleDuration};

use crate::error::Result;
use crate::job::{ApplicationRef, JobWithToken};

/// A raw job submission, before verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    /// The application to run.
    pub application: ApplicationRef,
    /// Optional human-assigned name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Backend to run on; the configured default is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Number of nodes requested.
    pub nodes: u32,
    /// Number of tasks per node requested.
    pub tasks_per_node: u32,
    /// Maximum wall-clock time requested.
    pub max_time: SimpleDuration,
    /// Opaque name→value input parameters.
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    /// Source paths of directories to mount into the environment.
    #[serde(default)]
    pub mounts: Vec<String>,
    /// Shared file systems to mount, by id.
    #[serde(default)]
    pub shared_file_system_mounts: Vec<String>,
    /// Names of peer jobs to link up with.
    #[serde(default)]
    pub peers: Vec<String>,
}

/// Turns a raw submission into a verified job.
#[async_trait]
pub trait JobVerifier: Send + Sync {
    /// Verifies the submission on behalf of the principal.
    ///
    /// The returned job carries the resolved backend name from
    /// `submission.backend`, a fresh id, state `VALIDATED` and the
    /// owner-scoped access token.
    ///
    /// # Errors
    ///
    /// Fails with a client-safe error if the submission is invalid.
    async fn verify(&self, submission: JobSubmission, principal: &Principal)
        -> Result<JobWithToken>;
}

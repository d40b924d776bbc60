//! File staging between the owner's storage and a backend's working
//! directory.
//!
//! Staging always authenticates as the job owner via the access token
//! stored on the job record, never as the caller. Transfers for distinct
//! files run concurrently; the two available join semantics are explicit
//! configuration ([`StagingMode`]).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};

use skua_core::Redacted;

use crate::backend::{BackendRegistry, StagedFile};
use crate::error::{Error, Result};
use crate::job::{InputFile, Job, JobWithToken};

/// Upper bound on simultaneously in-flight transfers per job.
const MAX_IN_FLIGHT_TRANSFERS: usize = 16;

/// File primitives of the owner's storage, consumed opaquely.
///
/// Every operation authenticates with the supplied token; staging never
/// uses the orchestrator's own credentials against user storage.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Downloads a file from the owner's storage.
    async fn download(&self, path: &str, token: &Redacted<String>) -> Result<Bytes>;

    /// Uploads a file into the owner's storage.
    async fn upload(
        &self,
        path: &str,
        length: u64,
        data: Bytes,
        token: &Redacted<String>,
    ) -> Result<()>;

    /// Extracts an uploaded archive in place.
    async fn extract(&self, path: &str, token: &Redacted<String>) -> Result<()>;

    /// Ensures a folder exists; succeeds if it already does.
    async fn create_folder(&self, path: &str, token: &Redacted<String>) -> Result<()>;
}

/// Join semantics for concurrent input transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StagingMode {
    /// All transfers are started; siblings of a failed transfer finish or
    /// fail on their own, and the first observed failure surfaces.
    #[default]
    LetFinish,
    /// Stop scheduling new transfers after the first failure.
    AbortOnFirstFailure,
}

/// Moves files between the owner's storage and the backend's working
/// directory, and manages the job's result folder.
pub struct JobFileService {
    storage: Arc<dyn UserStorage>,
    registry: Arc<BackendRegistry>,
    mode: StagingMode,
}

impl JobFileService {
    /// Creates a staging service over the given storage and backends.
    #[must_use]
    pub fn new(
        storage: Arc<dyn UserStorage>,
        registry: Arc<BackendRegistry>,
        mode: StagingMode,
    ) -> Self {
        Self {
            storage,
            registry,
            mode,
        }
    }

    /// Stages every declared input file into the backend's working
    /// directory.
    ///
    /// Fans out one transfer per input file and mount, bounded at
    /// [`MAX_IN_FLIGHT_TRANSFERS`]. Failures surface as
    /// [`Error::TransferError`] carrying the first observed failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferError`] if any transfer failed and
    /// [`Error::BackendNotFound`] if the job's backend does not resolve.
    #[tracing::instrument(skip(self, job_with_token), fields(job_id = %job_with_token.job.id))]
    pub async fn stage_inputs(&self, job_with_token: &JobWithToken) -> Result<()> {
        let job = &job_with_token.job;
        let backend = self.registry.resolve(&job.backend)?;
        let inputs: Vec<&InputFile> = job.files.iter().chain(job.mounts.iter()).collect();

        if inputs.is_empty() {
            return Ok(());
        }
        tracing::debug!(transfers = inputs.len(), "staging input files");

        match self.mode {
            StagingMode::LetFinish => {
                let results = stream::iter(inputs)
                    .map(|file| self.transfer(job, &job_with_token.access_token, &*backend, file))
                    .buffer_unordered(MAX_IN_FLIGHT_TRANSFERS)
                    .collect::<Vec<Result<()>>>()
                    .await;

                // Every transfer ran to its own conclusion; surface the
                // first observed failure.
                results.into_iter().collect()
            }
            StagingMode::AbortOnFirstFailure => {
                stream::iter(inputs.into_iter().map(Ok))
                    .try_for_each_concurrent(MAX_IN_FLIGHT_TRANSFERS, |file| {
                        self.transfer(job, &job_with_token.access_token, &*backend, file)
                    })
                    .await
            }
        }
    }

    async fn transfer(
        &self,
        job: &Job,
        token: &Redacted<String>,
        backend: &dyn crate::backend::ComputeBackend,
        file: &InputFile,
    ) -> Result<()> {
        let data = self
            .storage
            .download(&file.source_path, token)
            .await
            .map_err(|err| Error::TransferError {
                message: format!("{}: {}", file.source_path, err.client_message()),
            })?;

        let length = data.len() as u64;
        backend
            .submit_file(
                job,
                StagedFile {
                    file_id: file.id.clone(),
                    destination_path: file.destination_path.clone(),
                    length,
                    data,
                },
            )
            .await
            .map_err(|err| Error::TransferError {
                message: format!("{}: {}", file.destination_path, err.client_message()),
            })
    }

    /// Accepts a result file pushed back by the backend.
    ///
    /// The file lands under the job's result folder; archives are extracted
    /// in place when requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload or extraction fails.
    #[tracing::instrument(
        skip(self, job_with_token, data),
        fields(job_id = %job_with_token.job.id, path, length)
    )]
    pub async fn accept_incoming_file(
        &self,
        job_with_token: &JobWithToken,
        path: &str,
        length: u64,
        data: Bytes,
        needs_extraction: bool,
    ) -> Result<()> {
        let token = &job_with_token.access_token;
        let destination = format!(
            "{}/{}",
            self.result_folder(&job_with_token.job),
            path.trim_start_matches('/')
        );

        self.storage.upload(&destination, length, data, token).await?;
        if needs_extraction {
            self.storage.extract(&destination, token).await?;
        }
        Ok(())
    }

    /// Idempotently ensures the job's result folder exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder could not be created.
    #[tracing::instrument(skip(self, job_with_token), fields(job_id = %job_with_token.job.id))]
    pub async fn materialize_result_folder(&self, job_with_token: &JobWithToken) -> Result<()> {
        let folder = self.result_folder(&job_with_token.job);
        self.storage
            .create_folder(&folder, &job_with_token.access_token)
            .await
    }

    /// The path results for this job are archived under.
    #[must_use]
    pub fn result_folder(&self, job: &Job) -> String {
        let leaf = job.name.as_deref().map_or_else(
            || job.id.to_string(),
            |name| format!("{name}-{}", job.id),
        );
        format!(
            "/home/{}/Jobs/{}/{}",
            job.owner, job.archive_in_collection, leaf
        )
    }
}

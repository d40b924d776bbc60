//! The job orchestrator: the authoritative owner of the job lifecycle.
//!
//! Every state change flows through here. A proposal is validated against
//! the transition table, published to the state-change stream, persisted
//! via compare-and-swap, and followed by its side effects — staging on
//! entry into `PREPARED`, result-folder materialization on
//! `TRANSFER_SUCCESS`, backend cleanup on the terminal states.
//!
//! ## Recovery
//!
//! Execution failures in any entry point pass through a shared recovery
//! policy: record a client-safe status message and drive the job to
//! `FAILURE` through the normal transition path, unless it is already
//! failed. Recovery itself never throws. Whether the original error is
//! re-raised depends on the [`CallOrigin`]: synchronous callers get it
//! back, background reactions log and move on so a single bad job cannot
//! stall the event-consumption loop.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use skua_core::{JobId, Principal, SimpleDuration};

use crate::backend::BackendRegistry;
use crate::config::OrchestratorConfig;
use crate::error::{Error, Result};
use crate::events::{EventChannel, JobCompletedEvent, JobStateChange};
use crate::follow::{FollowStreamsRequest, FollowStreamsResponse, StreamFollowService};
use crate::job::{Job, JobWithToken};
use crate::staging::JobFileService;
use crate::state::{JobState, TransitionTable};
use crate::store::{CasResult, JobStore};
use crate::verify::{JobSubmission, JobVerifier};

/// How an entry point was invoked.
///
/// Synchronous invocations re-raise the original error after recovery;
/// background reactions swallow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOrigin {
    /// Invoked on behalf of an external request.
    Synchronous,
    /// Invoked as a reaction to an already-asynchronous event.
    Background,
}

/// Result of one recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The job was driven to `FAILURE` through the normal transition path.
    Recovered,
    /// The job was already in `FAILURE`; left untouched to prevent failure
    /// loops.
    AlreadyFailed,
    /// Recovery itself failed (e.g. the job no longer exists).
    RecoveryFailed,
}

/// Whether a proposal changed anything.
enum Applied {
    /// The transition was persisted and its side effects ran.
    Transitioned,
    /// The proposal equalled the current state and was absorbed.
    NoOp,
}

/// The state machine, recovery wrapper and reaper over the job stores,
/// backends and staging collaborators.
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    registry: Arc<BackendRegistry>,
    verifier: Arc<dyn JobVerifier>,
    files: Arc<JobFileService>,
    follow: StreamFollowService,
    state_changes: Arc<dyn EventChannel<JobStateChange>>,
    accounting: Arc<dyn EventChannel<JobCompletedEvent>>,
    table: TransitionTable,
    config: OrchestratorConfig,
}

impl JobOrchestrator {
    /// Composes the orchestrator from its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<BackendRegistry>,
        verifier: Arc<dyn JobVerifier>,
        files: Arc<JobFileService>,
        state_changes: Arc<dyn EventChannel<JobStateChange>>,
        accounting: Arc<dyn EventChannel<JobCompletedEvent>>,
        table: TransitionTable,
        config: OrchestratorConfig,
    ) -> Self {
        let follow = StreamFollowService::new(store.clone(), registry.clone(), files.clone());
        Self {
            store,
            registry,
            verifier,
            files,
            follow,
            state_changes,
            accounting,
            table,
            config,
        }
    }

    /// Submits a new job.
    ///
    /// Resolves the backend, verifies the submission, notifies the backend
    /// (which may reject, aborting before any persistence), persists the
    /// job in `VALIDATED` and publishes the initial state-change event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubmission`] for guard violations,
    /// [`Error::BackendNotFound`] for an unknown backend,
    /// [`Error::BackendRejected`] if the backend refuses the job, and
    /// whatever verification surfaces.
    #[tracing::instrument(
        skip(self, submission, principal),
        fields(owner = %principal.username, application = %submission.application)
    )]
    pub async fn start_job(
        &self,
        mut submission: JobSubmission,
        principal: &Principal,
    ) -> Result<JobId> {
        let max_millis = self.config.max_time_hours * 3_600_000;
        if submission.max_time.to_millis() > max_millis {
            return Err(Error::InvalidSubmission {
                message: format!(
                    "requested time exceeds the {} hour maximum",
                    self.config.max_time_hours
                ),
            });
        }
        if let Some(name) = &submission.name {
            if name.contains(['/', '\\', '\n', '.']) {
                return Err(Error::InvalidSubmission {
                    message: "job names may not contain path separators or newlines".into(),
                });
            }
        }

        let backend_name = submission
            .backend
            .clone()
            .unwrap_or_else(|| self.config.default_backend.clone());
        let backend = self.registry.resolve(&backend_name)?;
        submission.backend = Some(backend_name);

        let jwt = self.verifier.verify(submission, principal).await?;
        backend.notify_verified(&jwt.job).await?;

        self.store.create(&jwt).await?;
        self.state_changes
            .emit(JobStateChange {
                job_id: jwt.job.id,
                new_state: JobState::Validated,
            })
            .await?;

        tracing::info!(job_id = %jwt.job.id, "job submitted");
        Ok(jwt.job.id)
    }

    /// Proposes a state change on behalf of a backend.
    ///
    /// On success the state-change event is published and the transition's
    /// side effects run before this returns. An invalid proposal has no
    /// observable effect; proposing the current state is silently absorbed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`], [`Error::Unauthorized`] or
    /// [`Error::BadStateTransition`] without mutating anything. Execution
    /// failures re-raise after the job has been driven to `FAILURE`.
    #[tracing::instrument(skip(self, status, principal), fields(caller = %principal.username))]
    pub async fn propose_state_change(
        &self,
        job_id: JobId,
        proposed: JobState,
        status: Option<&str>,
        principal: &Principal,
    ) -> Result<()> {
        let result = self.propose_inner(job_id, proposed, status, principal).await;
        self.finish(job_id, CallOrigin::Synchronous, result).await
    }

    async fn propose_inner(
        &self,
        job_id: JobId,
        proposed: JobState,
        status: Option<&str>,
        principal: &Principal,
    ) -> Result<()> {
        let jwt = self.find_job(job_id).await?;
        self.registry
            .resolve_and_authorize(&jwt.job.backend, principal)?;
        self.apply_transition(jwt, proposed, status).await.map(|_| ())
    }

    /// Applies a state change arriving from the state-change stream.
    ///
    /// The same validation and side-effect core as
    /// [`JobOrchestrator::propose_state_change`], minus the caller
    /// authorization (the stream is internal). Errors are logged and
    /// swallowed so one bad job never stalls the consumption loop;
    /// re-delivery of an already-applied event is absorbed as a no-op.
    #[tracing::instrument(skip(self, event), fields(job_id = %event.job_id, new_state = %event.new_state))]
    pub async fn process_state_change(&self, event: &JobStateChange) {
        let result = self.process_inner(event).await;
        if let Err(err) = self.finish(event.job_id, CallOrigin::Background, result).await {
            tracing::debug!(job_id = %event.job_id, error = %err, "state-change event dropped");
        }
    }

    async fn process_inner(&self, event: &JobStateChange) -> Result<()> {
        let jwt = self.find_job(event.job_id).await?;
        self.apply_transition(jwt, event.new_state, None)
            .await
            .map(|_| ())
    }

    /// Records a status message without touching the lifecycle.
    ///
    /// Purely observational: no state change, no side effects, no failure
    /// handling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] or [`Error::Unauthorized`].
    pub async fn add_status_message(
        &self,
        job_id: JobId,
        message: &str,
        principal: &Principal,
    ) -> Result<()> {
        let jwt = self.find_job(job_id).await?;
        self.registry
            .resolve_and_authorize(&jwt.job.backend, principal)?;
        self.store.update_status(job_id, message).await
    }

    /// Handles a backend's completion report.
    ///
    /// Proposes `SUCCESS`/`FAILURE` per the `success` flag, then emits one
    /// accounting record for the invocation.
    ///
    /// # Errors
    ///
    /// As [`JobOrchestrator::propose_state_change`], plus channel failures
    /// from the accounting stream.
    #[tracing::instrument(skip(self, principal), fields(caller = %principal.username))]
    pub async fn report_completion(
        &self,
        job_id: JobId,
        wall_duration: SimpleDuration,
        success: bool,
        principal: &Principal,
    ) -> Result<()> {
        let result = self
            .report_completion_inner(job_id, wall_duration, success, principal)
            .await;
        self.finish(job_id, CallOrigin::Synchronous, result).await
    }

    async fn report_completion_inner(
        &self,
        job_id: JobId,
        wall_duration: SimpleDuration,
        success: bool,
        principal: &Principal,
    ) -> Result<()> {
        let jwt = self.find_job(job_id).await?;
        self.registry
            .resolve_and_authorize(&jwt.job.backend, principal)?;

        let owner = jwt.job.owner.clone();
        let nodes = jwt.job.nodes;
        let application = jwt.job.application.clone();

        let target = if success {
            JobState::Success
        } else {
            JobState::Failure
        };
        self.apply_transition(jwt, target, None).await?;

        self.accounting
            .emit(JobCompletedEvent {
                job_id,
                owner,
                wall_duration,
                nodes,
                timestamp: Utc::now(),
                application,
                success,
            })
            .await
    }

    /// Accepts a result file pushed back by the job's backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] or [`Error::Unauthorized`] untouched;
    /// upload failures re-raise after recovery.
    pub async fn accept_incoming_file(
        &self,
        job_id: JobId,
        principal: &Principal,
        file_path: &str,
        length: u64,
        data: Bytes,
        needs_extraction: bool,
    ) -> Result<()> {
        let result = self
            .accept_incoming_file_inner(job_id, principal, file_path, length, data, needs_extraction)
            .await;
        self.finish(job_id, CallOrigin::Synchronous, result).await
    }

    async fn accept_incoming_file_inner(
        &self,
        job_id: JobId,
        principal: &Principal,
        file_path: &str,
        length: u64,
        data: Bytes,
        needs_extraction: bool,
    ) -> Result<()> {
        let jwt = self.find_job(job_id).await?;
        self.registry
            .resolve_and_authorize(&jwt.job.backend, principal)?;
        self.files
            .accept_incoming_file(&jwt, file_path, length, data, needs_extraction)
            .await
    }

    /// Follows a job's standard streams through its backend.
    ///
    /// # Errors
    ///
    /// As [`StreamFollowService::follow_streams`]; execution failures
    /// re-raise after recovery.
    pub async fn follow_logs(
        &self,
        request: &FollowStreamsRequest,
        principal: &Principal,
    ) -> Result<FollowStreamsResponse> {
        let result = self.follow.follow_streams(request, principal).await;
        self.finish(request.job_id, CallOrigin::Synchronous, result)
            .await
    }

    /// Looks up a job, enforcing the backend authorization check.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] or [`Error::Unauthorized`].
    pub async fn get_job(&self, job_id: JobId, principal: &Principal) -> Result<Job> {
        let jwt = self.find_job(job_id).await?;
        self.registry
            .resolve_and_authorize(&jwt.job.backend, principal)?;
        Ok(jwt.job)
    }

    /// Force-fails every non-terminal job created before the cutoff.
    ///
    /// Each job goes through the normal failure path, so side effects and
    /// events fire exactly as if it had failed via the public API. Per-job
    /// failures are logged and never abort the sweep.
    ///
    /// # Errors
    ///
    /// Returns an error only if the expired-job query itself fails.
    #[tracing::instrument(skip(self))]
    pub async fn reap_expired_jobs(&self, cutoff: DateTime<Utc>) -> Result<()> {
        let expired = self.store.list_created_before(cutoff).await?;
        tracing::info!(count = expired.len(), "reaping expired jobs");

        for jwt in expired {
            let job_id = jwt.job.id;
            let result = self
                .apply_transition(
                    jwt,
                    JobState::Failure,
                    Some("Job did not complete before its deadline"),
                )
                .await
                .map(|_| ());
            if let Err(err) = self.finish(job_id, CallOrigin::Background, result).await {
                tracing::warn!(%job_id, error = %err, "failed to reap expired job");
            }
        }
        Ok(())
    }

    /// Re-publishes the current state of every non-terminal job.
    ///
    /// Run at startup so downstream consumers resume processing jobs that
    /// were in flight when the process last stopped. Per-job failures are
    /// logged and never fail startup.
    ///
    /// # Errors
    ///
    /// Returns an error only if the job query itself fails.
    #[tracing::instrument(skip(self))]
    pub async fn replay_lost_jobs(&self) -> Result<()> {
        let lost = self.store.list_created_before(Utc::now()).await?;
        tracing::info!(count = lost.len(), "replaying lost jobs");

        for jwt in lost {
            let event = JobStateChange {
                job_id: jwt.job.id,
                new_state: jwt.job.current_state,
            };
            if let Err(err) = self.state_changes.emit(event).await {
                tracing::warn!(job_id = %jwt.job.id, error = %err, "failed to replay job");
            }
        }
        Ok(())
    }

    /// Best-effort failure recording for a job that hit an execution error.
    ///
    /// Never throws; the three outcomes are reported for observability and
    /// tests. A job already in `FAILURE` is left untouched — failure
    /// handling that itself keeps throwing must not loop.
    pub async fn recover(&self, job_id: JobId, error: &Error) -> RecoveryOutcome {
        let message = error.client_message();

        let jwt = match self.store.find_by_id(job_id).await {
            Ok(Some(jwt)) => jwt,
            Ok(None) => {
                tracing::info!(%job_id, "job disappeared before recovery");
                return RecoveryOutcome::RecoveryFailed;
            }
            Err(err) => {
                tracing::warn!(%job_id, error = %err, "job lookup failed during recovery");
                return RecoveryOutcome::RecoveryFailed;
            }
        };

        if jwt.job.current_state == JobState::Failure {
            return RecoveryOutcome::AlreadyFailed;
        }

        match self
            .apply_transition(jwt, JobState::Failure, Some(message.as_str()))
            .await
        {
            Ok(_) => RecoveryOutcome::Recovered,
            Err(err) => {
                tracing::warn!(%job_id, error = %err, "driving job to FAILURE failed");
                RecoveryOutcome::RecoveryFailed
            }
        }
    }

    /// Shared exit path: validation errors surface untouched, execution
    /// errors run recovery first.
    async fn finish<T>(&self, job_id: JobId, origin: CallOrigin, result: Result<T>) -> Result<T> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if err.is_validation() {
            return Err(err);
        }

        let outcome = self.recover(job_id, &err).await;
        match origin {
            CallOrigin::Synchronous => {
                tracing::debug!(%job_id, ?outcome, error = %err, "operation failed, rethrowing");
            }
            CallOrigin::Background => {
                tracing::warn!(%job_id, ?outcome, error = %err, "background operation failed");
            }
        }
        Err(err)
    }

    /// Validates, publishes, persists and runs side effects for one
    /// proposal.
    ///
    /// The event is published once the transition is judged valid, before
    /// the durable write. A `StateMismatch` from the store means a
    /// concurrent writer won the race: the job is re-read and the proposal
    /// re-validated, up to the configured retry bound.
    async fn apply_transition(
        &self,
        mut jwt: JobWithToken,
        proposed: JobState,
        status: Option<&str>,
    ) -> Result<Applied> {
        let job_id = jwt.job.id;
        let mut attempts = 0;
        let mut event_emitted = false;

        loop {
            let current = jwt.job.current_state;

            if proposed == current {
                // Idempotent re-delivery: nothing persisted, nothing
                // re-emitted.
                return Ok(Applied::NoOp);
            }
            if !self.table.allows(current, proposed) {
                return Err(Error::BadStateTransition {
                    from: current,
                    to: proposed,
                });
            }

            tracing::info!(%job_id, from = %current, to = %proposed, "state transition accepted");
            if !event_emitted {
                self.state_changes
                    .emit(JobStateChange {
                        job_id,
                        new_state: proposed,
                    })
                    .await?;
                event_emitted = true;
            }

            let failed_state = (proposed == JobState::Failure).then_some(current);
            match self
                .store
                .update_state_and_status(job_id, current, proposed, status, failed_state)
                .await?
            {
                CasResult::Success => {
                    jwt.job.current_state = proposed;
                    if let Some(status) = status {
                        jwt.job.status = status.to_string();
                    }
                    if let Some(failed) = failed_state {
                        jwt.job.failed_state = Some(failed);
                    }
                    self.run_side_effects(&jwt, proposed).await?;
                    return Ok(Applied::Transitioned);
                }
                CasResult::NotFound => return Err(Error::NotFound { job_id }),
                CasResult::StateMismatch { actual } => {
                    attempts += 1;
                    if attempts > self.config.transition_retries {
                        return Err(Error::BadStateTransition {
                            from: actual,
                            to: proposed,
                        });
                    }
                    tracing::debug!(
                        %job_id, %actual, %proposed, attempts,
                        "lost transition race, revalidating"
                    );
                    jwt = self.find_job(job_id).await?;
                }
            }
        }
    }

    /// Side effects bound to entering a state.
    async fn run_side_effects(&self, jwt: &JobWithToken, entered: JobState) -> Result<()> {
        match entered {
            JobState::Prepared => {
                self.files.stage_inputs(jwt).await?;
                let backend = self.registry.resolve(&jwt.job.backend)?;
                backend.notify_prepared(&jwt.job).await?;
            }
            JobState::TransferSuccess => {
                self.files.materialize_result_folder(jwt).await?;
            }
            JobState::Success | JobState::Failure => {
                // Cleanup failures must never prevent a job from reaching
                // or staying terminal.
                match self.registry.resolve(&jwt.job.backend) {
                    Ok(backend) => {
                        if let Err(err) = backend.cleanup(&jwt.job).await {
                            tracing::info!(
                                job_id = %jwt.job.id, error = %err,
                                "backend cleanup failed"
                            );
                        }
                    }
                    Err(err) => {
                        tracing::info!(
                            job_id = %jwt.job.id, error = %err,
                            "backend unavailable for cleanup"
                        );
                    }
                }
            }
            JobState::Validated | JobState::Scheduled | JobState::Running => {}
        }
        Ok(())
    }

    async fn find_job(&self, job_id: JobId) -> Result<JobWithToken> {
        self.store
            .find_by_id(job_id)
            .await?
            .ok_or(Error::NotFound { job_id })
    }
}

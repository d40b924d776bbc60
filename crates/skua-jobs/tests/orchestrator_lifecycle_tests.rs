//! End-to-end lifecycle tests for the orchestrator's happy paths and
//! transition contract.

mod common;

use common::{
    backend_principal, harness, harness_with, input, other_backend_principal, owner, submission,
};

use skua_core::SimpleDuration;
use skua_jobs::error::{Error, Result};
use skua_jobs::follow::FollowStreamsRequest;
use skua_jobs::staging::StagingMode;
use skua_jobs::state::JobState;

#[tokio::test]
async fn start_job_persists_validated_and_emits_event() -> Result<()> {
    let h = harness();

    let id = h.submit().await?;

    let job = h.job(id).await;
    assert_eq!(job.current_state, JobState::Validated);
    assert_eq!(job.owner, "alice");
    assert_eq!(job.backend, "slurm");

    // The backend saw the job before anything was persisted.
    assert_eq!(h.backend.verified.lock().unwrap().as_slice(), &[id]);

    let events = h.state_changes.emitted()?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].job_id, id);
    assert_eq!(events[0].new_state, JobState::Validated);

    Ok(())
}

#[tokio::test]
async fn start_job_uses_default_backend_when_none_given() -> Result<()> {
    let h = harness();
    let mut request = submission();
    request.backend = None;

    let id = h.orchestrator.start_job(request, &owner()).await?;
    assert_eq!(h.job(id).await.backend, "slurm");

    Ok(())
}

#[tokio::test]
async fn start_job_rejects_unknown_backend() {
    let h = harness();
    let mut request = submission();
    request.backend = Some("pbs".into());

    let result = h.orchestrator.start_job(request, &owner()).await;
    assert!(matches!(result, Err(Error::BackendNotFound { .. })));
}

#[tokio::test]
async fn start_job_enforces_max_time_ceiling() {
    let h = harness();
    let mut request = submission();
    request.max_time = SimpleDuration {
        hours: 1000,
        minutes: 0,
        seconds: 0,
    };

    let result = h.orchestrator.start_job(request, &owner()).await;
    assert!(matches!(result, Err(Error::InvalidSubmission { .. })));
}

#[tokio::test]
async fn start_job_rejects_names_with_path_separators() {
    let h = harness();
    for bad in ["../escape", "a/b", "a\\b", "a\nb"] {
        let mut request = submission();
        request.name = Some(bad.into());
        let result = h.orchestrator.start_job(request, &owner()).await;
        assert!(
            matches!(result, Err(Error::InvalidSubmission { .. })),
            "name {bad:?} must be rejected"
        );
    }
}

#[tokio::test]
async fn backend_rejection_aborts_before_persistence() -> Result<()> {
    let h = harness();
    h.backend
        .reject_verified
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let result = h.submit().await;
    assert!(matches!(result, Err(Error::BackendRejected { .. })));

    // Nothing persisted, nothing emitted.
    assert_eq!(h.store.job_count()?, 0);
    assert!(h.state_changes.is_empty()?);

    Ok(())
}

#[tokio::test]
async fn entering_prepared_stages_files_then_notifies_backend() -> Result<()> {
    let h = harness_with(vec![input("a"), input("b")], StagingMode::LetFinish);
    let id = h.submit().await?;

    h.drive(id, &[JobState::Prepared]).await?;

    let job = h.job(id).await;
    assert_eq!(job.current_state, JobState::Prepared);

    let mut staged = h.backend.submitted_files.lock().unwrap().clone();
    staged.sort();
    assert_eq!(staged, vec!["a.dat", "b.dat"]);
    assert_eq!(h.backend.prepared.lock().unwrap().as_slice(), &[id]);

    Ok(())
}

#[tokio::test]
async fn invalid_transition_is_rejected_without_observable_effect() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;
    h.drive(id, &[JobState::Prepared]).await?;

    let before = h.job(id).await;
    let events_before = h.state_changes.len()?;

    let result = h
        .orchestrator
        .propose_state_change(id, JobState::Validated, Some("rewind"), &backend_principal())
        .await;
    assert!(matches!(
        result,
        Err(Error::BadStateTransition {
            from: JobState::Prepared,
            to: JobState::Validated,
        })
    ));

    let after = h.job(id).await;
    assert_eq!(after.current_state, JobState::Prepared);
    assert_eq!(after.modified_at, before.modified_at);
    assert_eq!(after.status, before.status);
    assert_eq!(h.state_changes.len()?, events_before);

    Ok(())
}

#[tokio::test]
async fn proposing_the_current_state_is_silently_absorbed() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;
    h.drive(id, &[JobState::Prepared]).await?;

    let before = h.job(id).await;
    let events_before = h.state_changes.len()?;

    h.drive(id, &[JobState::Prepared]).await?;

    let after = h.job(id).await;
    assert_eq!(after.modified_at, before.modified_at);
    assert_eq!(h.state_changes.len()?, events_before);

    Ok(())
}

#[tokio::test]
async fn started_at_is_set_exactly_once() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;

    assert!(h.job(id).await.started_at.is_none());
    h.drive(id, &[JobState::Prepared, JobState::Scheduled, JobState::Running])
        .await?;

    let started = h.job(id).await.started_at.expect("set on RUNNING");

    h.drive(id, &[JobState::TransferSuccess, JobState::Success])
        .await?;
    assert_eq!(h.job(id).await.started_at, Some(started));

    Ok(())
}

#[tokio::test]
async fn scheduled_may_skip_straight_past_running() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;

    h.drive(
        id,
        &[JobState::Prepared, JobState::Scheduled, JobState::TransferSuccess],
    )
    .await?;

    let job = h.job(id).await;
    assert_eq!(job.current_state, JobState::TransferSuccess);
    // The job never ran, so started_at stays unset.
    assert!(job.started_at.is_none());

    Ok(())
}

#[tokio::test]
async fn entering_transfer_success_materializes_result_folder() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;

    h.drive(
        id,
        &[
            JobState::Prepared,
            JobState::Scheduled,
            JobState::Running,
            JobState::TransferSuccess,
        ],
    )
    .await?;

    let folders = h.storage.folders.lock().unwrap().clone();
    assert_eq!(folders.len(), 1);
    assert!(folders[0].contains("/home/alice/Jobs/blast/"));

    Ok(())
}

#[tokio::test]
async fn terminal_success_is_immutable() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;
    h.drive(id, &[JobState::Prepared, JobState::TransferSuccess, JobState::Success])
        .await?;

    for proposed in [
        JobState::Validated,
        JobState::Prepared,
        JobState::Scheduled,
        JobState::Running,
        JobState::TransferSuccess,
        JobState::Failure,
    ] {
        let result = h
            .orchestrator
            .propose_state_change(id, proposed, None, &backend_principal())
            .await;
        assert!(
            matches!(result, Err(Error::BadStateTransition { .. })),
            "SUCCESS -> {proposed} must be rejected"
        );
    }

    let job = h
        .orchestrator
        .get_job(id, &backend_principal())
        .await?;
    assert_eq!(job.current_state, JobState::Success);

    Ok(())
}

#[tokio::test]
async fn refailing_a_failed_job_is_idempotent() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;

    h.drive(id, &[JobState::Failure]).await?;
    let events_after_first = h.state_changes.len()?;

    // FAILURE -> FAILURE is always accepted and does not throw.
    h.drive(id, &[JobState::Failure]).await?;

    assert_eq!(h.job(id).await.current_state, JobState::Failure);
    assert_eq!(h.state_changes.len()?, events_after_first);

    Ok(())
}

#[tokio::test]
async fn failure_records_the_state_it_failed_from() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;
    h.drive(id, &[JobState::Prepared, JobState::Running]).await?;

    h.orchestrator
        .propose_state_change(id, JobState::Failure, Some("node died"), &backend_principal())
        .await?;

    let job = h.job(id).await;
    assert_eq!(job.current_state, JobState::Failure);
    assert_eq!(job.failed_state, Some(JobState::Running));
    assert_eq!(job.status, "node died");

    Ok(())
}

#[tokio::test]
async fn terminal_entry_invokes_backend_cleanup_once() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;

    h.drive(id, &[JobState::Prepared, JobState::TransferSuccess, JobState::Success])
        .await?;

    assert_eq!(h.backend.cleaned_up.lock().unwrap().as_slice(), &[id]);

    Ok(())
}

#[tokio::test]
async fn cleanup_failure_never_unsettles_a_terminal_job() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;
    h.backend
        .fail_cleanup
        .store(true, std::sync::atomic::Ordering::SeqCst);

    // The transition must still succeed even though cleanup throws.
    h.drive(id, &[JobState::Failure]).await?;

    let job = h.job(id).await;
    assert_eq!(job.current_state, JobState::Failure);
    assert_eq!(h.backend.cleaned_up.lock().unwrap().len(), 1);

    Ok(())
}

#[tokio::test]
async fn proposals_from_another_backend_are_unauthorized() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;
    let events_before = h.state_changes.len()?;

    let result = h
        .orchestrator
        .propose_state_change(id, JobState::Prepared, None, &other_backend_principal())
        .await;
    assert!(matches!(result, Err(Error::Unauthorized { .. })));

    // No side effect of any kind.
    assert_eq!(h.job(id).await.current_state, JobState::Validated);
    assert_eq!(h.state_changes.len()?, events_before);
    assert!(h.backend.prepared.lock().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let h = harness();
    let result = h
        .orchestrator
        .propose_state_change(
            skua_core::JobId::generate(),
            JobState::Prepared,
            None,
            &backend_principal(),
        )
        .await;
    assert!(matches!(result, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn add_status_message_is_purely_observational() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;
    let events_before = h.state_changes.len()?;

    h.orchestrator
        .add_status_message(id, "queue position 7", &backend_principal())
        .await?;

    let job = h.job(id).await;
    assert_eq!(job.status, "queue position 7");
    assert_eq!(job.current_state, JobState::Validated);
    assert_eq!(h.state_changes.len()?, events_before);

    Ok(())
}

#[tokio::test]
async fn report_completion_success_emits_one_accounting_record() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;
    h.drive(id, &[JobState::Prepared, JobState::TransferSuccess])
        .await?;

    let duration = SimpleDuration::new(1, 0, 0)?;
    h.orchestrator
        .report_completion(id, duration, true, &backend_principal())
        .await?;

    assert_eq!(h.job(id).await.current_state, JobState::Success);

    let records = h.accounting.emitted()?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].job_id, id);
    assert_eq!(records[0].owner, "alice");
    assert_eq!(records[0].wall_duration, duration);
    assert_eq!(records[0].nodes, 2);
    assert!(records[0].success);

    Ok(())
}

#[tokio::test]
async fn report_completion_failure_from_running() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;
    h.drive(id, &[JobState::Prepared, JobState::Running]).await?;

    h.orchestrator
        .report_completion(id, SimpleDuration::new(0, 30, 0)?, false, &backend_principal())
        .await?;

    let job = h.job(id).await;
    assert_eq!(job.current_state, JobState::Failure);
    assert_eq!(job.failed_state, Some(JobState::Running));

    let records = h.accounting.emitted()?;
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);

    // Cleanup ran exactly once, on entry into FAILURE.
    assert_eq!(h.backend.cleaned_up.lock().unwrap().len(), 1);

    Ok(())
}

#[tokio::test]
async fn accept_incoming_file_lands_under_the_result_folder() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;

    h.orchestrator
        .accept_incoming_file(
            id,
            &backend_principal(),
            "output/result.tar",
            4,
            bytes::Bytes::from_static(b"data"),
            true,
        )
        .await?;

    let uploads = h.storage.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].ends_with("output/result.tar"));
    assert_eq!(h.storage.extracted.lock().unwrap().clone(), uploads);

    Ok(())
}

#[tokio::test]
async fn follow_logs_merges_backend_output_with_job_metadata() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;
    h.drive(id, &[JobState::Prepared, JobState::Running]).await?;

    let response = h
        .orchestrator
        .follow_logs(
            &FollowStreamsRequest {
                job_id: id,
                stdout_line_start: 5,
                stdout_max_lines: 100,
                stderr_line_start: 0,
                stderr_max_lines: 100,
            },
            &owner(),
        )
        .await?;

    assert_eq!(response.stdout, "stdout");
    assert_eq!(response.stdout_next_line, 15);
    assert_eq!(response.state, JobState::Running);
    assert!(!response.is_terminal);
    assert_eq!(response.application.name, "blast");
    assert!(response.result_folder.contains("/home/alice/Jobs/"));

    Ok(())
}

#[tokio::test]
async fn follow_logs_rejects_other_users() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;

    let result = h
        .orchestrator
        .follow_logs(
            &FollowStreamsRequest {
                job_id: id,
                stdout_line_start: 0,
                stdout_max_lines: 10,
                stderr_line_start: 0,
                stderr_max_lines: 10,
            },
            &skua_core::Principal::user("mallory"),
        )
        .await;

    assert!(matches!(result, Err(Error::Unauthorized { .. })));

    Ok(())
}

#[tokio::test]
async fn get_job_enforces_backend_authorization() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;

    assert!(h.orchestrator.get_job(id, &backend_principal()).await.is_ok());

    let result = h.orchestrator.get_job(id, &other_backend_principal()).await;
    assert!(matches!(result, Err(Error::Unauthorized { .. })));

    Ok(())
}

#[tokio::test]
async fn state_change_events_arrive_in_lifecycle_order() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;

    h.drive(
        id,
        &[
            JobState::Prepared,
            JobState::Scheduled,
            JobState::Running,
            JobState::TransferSuccess,
            JobState::Success,
        ],
    )
    .await?;

    let states: Vec<JobState> = h
        .state_changes
        .emitted()?
        .into_iter()
        .filter(|event| event.job_id == id)
        .map(|event| event.new_state)
        .collect();
    assert_eq!(
        states,
        vec![
            JobState::Validated,
            JobState::Prepared,
            JobState::Scheduled,
            JobState::Running,
            JobState::TransferSuccess,
            JobState::Success,
        ]
    );

    Ok(())
}

#[tokio::test]
async fn redelivered_events_are_absorbed_by_the_reaction_loop() -> Result<()> {
    let h = harness();
    let id = h.submit().await?;
    h.drive(id, &[JobState::Prepared]).await?;

    let before = h.job(id).await;
    let events_before = h.state_changes.len()?;

    // Re-deliver the PREPARED event as the consumption loop would.
    for event in h.state_changes.emitted()? {
        h.orchestrator.process_state_change(&event).await;
    }

    let after = h.job(id).await;
    assert_eq!(after.current_state, JobState::Prepared);
    assert_eq!(after.modified_at, before.modified_at);
    assert_eq!(h.state_changes.len()?, events_before);
    // The PREPARED side effects did not run a second time.
    assert_eq!(h.backend.prepared.lock().unwrap().len(), 1);

    Ok(())
}

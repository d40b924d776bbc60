//! Shared fakes and fixtures for the orchestrator test suites.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use skua_core::{JobId, Principal, Redacted, SimpleDuration};
use skua_jobs::backend::{
    BackendLogChunk, BackendRegistry, ComputeBackend, FollowLogsRequest, StagedFile,
};
use skua_jobs::config::OrchestratorConfig;
use skua_jobs::error::{Error, Result};
use skua_jobs::events::{InMemoryChannel, JobCompletedEvent, JobStateChange};
use skua_jobs::job::{ApplicationRef, InputFile, Job, JobWithToken, ResolvedApplication};
use skua_jobs::orchestrator::JobOrchestrator;
use skua_jobs::staging::{JobFileService, StagingMode, UserStorage};
use skua_jobs::state::{JobState, TransitionTable};
use skua_jobs::store::JobStore;
use skua_jobs::store::memory::InMemoryJobStore;
use skua_jobs::verify::{JobSubmission, JobVerifier};

pub const BACKEND_NAME: &str = "slurm";

/// Backend fake recording every call, with switchable failure injection.
#[derive(Default)]
pub struct RecordingBackend {
    pub verified: Mutex<Vec<JobId>>,
    pub prepared: Mutex<Vec<JobId>>,
    pub cleaned_up: Mutex<Vec<JobId>>,
    pub submitted_files: Mutex<Vec<String>>,
    pub reject_verified: AtomicBool,
    pub reject_prepared: AtomicBool,
    pub fail_cleanup: AtomicBool,
}

#[async_trait]
impl ComputeBackend for RecordingBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn notify_verified(&self, job: &Job) -> Result<()> {
        if self.reject_verified.load(Ordering::SeqCst) {
            return Err(Error::BackendRejected {
                backend: BACKEND_NAME.into(),
                message: "no capacity".into(),
            });
        }
        self.verified.lock().unwrap().push(job.id);
        Ok(())
    }

    async fn notify_prepared(&self, job: &Job) -> Result<()> {
        if self.reject_prepared.load(Ordering::SeqCst) {
            return Err(Error::BackendRejected {
                backend: BACKEND_NAME.into(),
                message: "scheduler unavailable".into(),
            });
        }
        self.prepared.lock().unwrap().push(job.id);
        Ok(())
    }

    async fn cleanup(&self, job: &Job) -> Result<()> {
        self.cleaned_up.lock().unwrap().push(job.id);
        if self.fail_cleanup.load(Ordering::SeqCst) {
            return Err(Error::internal("cleanup crashed"));
        }
        Ok(())
    }

    async fn follow_logs(
        &self,
        _job: &Job,
        request: &FollowLogsRequest,
    ) -> Result<BackendLogChunk> {
        Ok(BackendLogChunk {
            stdout: "stdout".into(),
            stdout_next_line: request.stdout_line_start + 10,
            stderr: "stderr".into(),
            stderr_next_line: request.stderr_line_start + 10,
        })
    }

    async fn submit_file(&self, _job: &Job, file: StagedFile) -> Result<()> {
        self.submitted_files
            .lock()
            .unwrap()
            .push(file.destination_path);
        Ok(())
    }
}

/// Storage fake that fails downloads for configured paths.
#[derive(Default)]
pub struct FakeStorage {
    pub failing_downloads: Mutex<Vec<String>>,
    pub downloads: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<String>>,
    pub extracted: Mutex<Vec<String>>,
    pub folders: Mutex<Vec<String>>,
}

#[async_trait]
impl UserStorage for FakeStorage {
    async fn download(&self, path: &str, _token: &Redacted<String>) -> Result<Bytes> {
        self.downloads.lock().unwrap().push(path.to_string());
        if self.failing_downloads.lock().unwrap().iter().any(|p| p == path) {
            return Err(Error::storage(format!("read failed for {path}")));
        }
        Ok(Bytes::from_static(b"content"))
    }

    async fn upload(
        &self,
        path: &str,
        _length: u64,
        _data: Bytes,
        _token: &Redacted<String>,
    ) -> Result<()> {
        self.uploads.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn extract(&self, path: &str, _token: &Redacted<String>) -> Result<()> {
        self.extracted.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn create_folder(&self, path: &str, _token: &Redacted<String>) -> Result<()> {
        self.folders.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

/// Verifier fake producing a fixed job shape from any submission.
pub struct StaticVerifier {
    pub files: Vec<InputFile>,
}

#[async_trait]
impl JobVerifier for StaticVerifier {
    async fn verify(
        &self,
        submission: JobSubmission,
        principal: &Principal,
    ) -> Result<JobWithToken> {
        let now = Utc::now();
        let backend = submission
            .backend
            .ok_or_else(|| Error::internal("verifier expects a resolved backend"))?;
        let job = Job {
            id: JobId::generate(),
            name: submission.name,
            owner: principal.username.clone(),
            project: None,
            backend,
            application: submission.application.clone(),
            resolved_application: Some(ResolvedApplication {
                title: submission.application.name.clone(),
                tool: format!("{}-container", submission.application.name),
            }),
            nodes: submission.nodes,
            tasks_per_node: submission.tasks_per_node,
            max_time: submission.max_time,
            parameters: submission.parameters,
            files: self.files.clone(),
            mounts: Vec::new(),
            shared_file_system_mounts: Vec::new(),
            peers: Vec::new(),
            workspace: None,
            archive_in_collection: submission.application.name.clone(),
            current_state: JobState::Validated,
            failed_state: None,
            status: "Validated".into(),
            created_at: now,
            modified_at: now,
            started_at: None,
        };
        Ok(JobWithToken::new(job, "access-token"))
    }
}

/// Fully wired orchestrator over in-memory fakes.
pub struct Harness {
    pub orchestrator: JobOrchestrator,
    pub store: Arc<InMemoryJobStore>,
    pub backend: Arc<RecordingBackend>,
    pub storage: Arc<FakeStorage>,
    pub state_changes: Arc<InMemoryChannel<JobStateChange>>,
    pub accounting: Arc<InMemoryChannel<JobCompletedEvent>>,
}

pub fn harness() -> Harness {
    harness_with(Vec::new(), StagingMode::LetFinish)
}

pub fn harness_with(files: Vec<InputFile>, mode: StagingMode) -> Harness {
    let store = Arc::new(InMemoryJobStore::new());
    let backend = Arc::new(RecordingBackend::default());
    let storage = Arc::new(FakeStorage::default());
    let registry = Arc::new(BackendRegistry::new([
        backend.clone() as Arc<dyn ComputeBackend>
    ]));
    let state_changes = Arc::new(InMemoryChannel::new());
    let accounting = Arc::new(InMemoryChannel::new());

    let orchestrator = JobOrchestrator::new(
        store.clone(),
        registry.clone(),
        Arc::new(StaticVerifier { files }),
        Arc::new(JobFileService::new(storage.clone(), registry, mode)),
        state_changes.clone(),
        accounting.clone(),
        TransitionTable::default(),
        OrchestratorConfig {
            default_backend: BACKEND_NAME.into(),
            ..OrchestratorConfig::default()
        },
    );

    Harness {
        orchestrator,
        store,
        backend,
        storage,
        state_changes,
        accounting,
    }
}

pub fn submission() -> JobSubmission {
    JobSubmission {
        application: ApplicationRef {
            name: "blast".into(),
            version: "2.9.0".into(),
        },
        name: None,
        backend: None,
        nodes: 2,
        tasks_per_node: 4,
        max_time: SimpleDuration::new(1, 0, 0).expect("static duration is valid"),
        parameters: HashMap::new(),
        mounts: Vec::new(),
        shared_file_system_mounts: Vec::new(),
        peers: Vec::new(),
    }
}

pub fn input(id: &str) -> InputFile {
    InputFile {
        id: id.to_string(),
        source_path: format!("/home/alice/{id}.dat"),
        destination_path: format!("{id}.dat"),
    }
}

pub fn owner() -> Principal {
    Principal::user("alice")
}

pub fn backend_principal() -> Principal {
    Principal::service(BACKEND_NAME)
}

pub fn other_backend_principal() -> Principal {
    Principal::service("kubernetes")
}

impl Harness {
    /// Submits a job and returns its id.
    pub async fn submit(&self) -> Result<JobId> {
        self.orchestrator.start_job(submission(), &owner()).await
    }

    /// Reads the job back from the store.
    pub async fn job(&self, id: JobId) -> Job {
        self.store
            .find_by_id(id)
            .await
            .expect("store is in-memory")
            .expect("job exists")
            .job
    }

    /// Drives a submitted job along the given states via the backend.
    pub async fn drive(&self, id: JobId, states: &[JobState]) -> Result<()> {
        for state in states {
            self.orchestrator
                .propose_state_change(id, *state, None, &backend_principal())
                .await?;
        }
        Ok(())
    }
}

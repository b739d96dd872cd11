//! Job lifecycle: submit, persist, poll to a terminal state, store the video.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use vidgen_core::image::DecodedImage;
use vidgen_core::{
    DomainError, GenerationParams, Job, JobId, JobOutcome, NewJob, RequestId, SourceImage,
};

use crate::artifacts::ArtifactStore;
use crate::generation::{
    GenerationApi, GenerationError, PollResult, REQUEST_EXPIRED, truncate_chars,
};

use super::policy::PollPolicy;
use super::store::{JobPage, JobStore, JobStoreError, Page};
use super::supervisor::TaskSupervisor;

pub const POLL_TIMEOUT_MESSAGE: &str = "polling timeout exceeded";

/// Raw creation input, validated by [`LifecycleManager::create_job`] before
/// anything is sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: Option<String>,
    pub duration: i64,
    pub aspect_ratio: String,
    pub resolution: String,
}

impl GenerationRequest {
    pub fn validate(self) -> Result<NewJob, DomainError> {
        let params = GenerationParams::parse(self.duration, &self.aspect_ratio, &self.resolution)?;
        let image = self.image.map(SourceImage::new).transpose()?;
        NewJob::new(self.prompt, image, params)
    }
}

/// Identifiers returned once a job is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedJob {
    pub job_id: JobId,
    pub request_id: RequestId,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("validation failed: {0}")]
    Validation(#[from] DomainError),
    #[error("upstream submission failed: {0}")]
    Upstream(#[source] GenerationError),
    #[error("job already exists for request {0}")]
    Conflict(RequestId),
    #[error(transparent)]
    Storage(JobStoreError),
}

impl From<JobStoreError> for LifecycleError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::Conflict(request_id) => LifecycleError::Conflict(request_id),
            other => LifecycleError::Storage(other),
        }
    }
}

/// Owns every job from submission to its terminal state.
///
/// Cheap to clone; clones share the client, store and task set.
#[derive(Clone)]
pub struct LifecycleManager {
    client: Arc<dyn GenerationApi>,
    store: Arc<dyn JobStore>,
    artifacts: ArtifactStore,
    policy: PollPolicy,
    supervisor: TaskSupervisor,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("artifacts", &self.artifacts)
            .field("policy", &self.policy)
            .field("active_tasks", &self.supervisor.active_count())
            .finish()
    }
}

impl LifecycleManager {
    pub fn new(
        client: Arc<dyn GenerationApi>,
        store: Arc<dyn JobStore>,
        artifacts: ArtifactStore,
        policy: PollPolicy,
    ) -> Self {
        Self {
            client,
            store,
            artifacts,
            policy,
            supervisor: TaskSupervisor::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// Validate, submit upstream, persist as `pending`, start polling.
    ///
    /// Nothing is persisted unless submission succeeded.
    #[instrument(skip(self, request), err)]
    pub async fn create_job(&self, request: GenerationRequest) -> Result<AcceptedJob, LifecycleError> {
        let job = request.validate()?;

        let request_id = self
            .client
            .submit(&job)
            .await
            .map_err(LifecycleError::Upstream)?;

        let job_id = self.store.create(&job, &request_id).await?;
        info!(job_id = %job_id, request_id = %request_id, "generation accepted");

        self.spawn_poller(request_id.clone());
        Ok(AcceptedJob { job_id, request_id })
    }

    /// Start the polling task for `request_id` unless one is already running.
    pub fn spawn_poller(&self, request_id: RequestId) -> bool {
        let this = self.clone();
        let key = request_id.clone();
        self.supervisor.spawn(key, async move {
            this.run_poll_loop(&request_id).await.map(|_| ())
        })
    }

    /// Poll `request_id` until it reaches a terminal outcome, record it, and
    /// return it. The clock starts at zero on every call.
    #[instrument(skip(self), fields(request_id = %request_id))]
    pub async fn run_poll_loop(&self, request_id: &RequestId) -> Result<JobOutcome, LifecycleError> {
        let started = Instant::now();
        let mut polls: u32 = 0;

        let outcome = loop {
            if !self.policy.within_ceiling(started.elapsed()) {
                error!(
                    elapsed_secs = started.elapsed().as_secs(),
                    polls, "polling timeout"
                );
                break JobOutcome::failed(POLL_TIMEOUT_MESSAGE);
            }

            tokio::time::sleep(self.policy.interval).await;
            polls += 1;

            let result = self.client.poll(request_id).await;
            let elapsed = started.elapsed();
            debug!(
                elapsed_secs = elapsed.as_secs(),
                outcome = result.kind(),
                "poll"
            );

            match result {
                PollResult::StillPending => continue,
                PollResult::Transient { status, body } => {
                    if self.policy.may_retry_transient(elapsed) {
                        warn!(
                            http_status = status,
                            elapsed_secs = elapsed.as_secs(),
                            "transient poll error; retrying"
                        );
                        continue;
                    }
                    break JobOutcome::failed(format!(
                        "API error {status}: {}",
                        truncate_chars(&body, 200)
                    ));
                }
                PollResult::Rejected { reason } => break JobOutcome::rejected(reason),
                PollResult::Expired => {
                    warn!("request expired upstream");
                    break JobOutcome::expired(REQUEST_EXPIRED);
                }
                PollResult::Fatal { detail } => break JobOutcome::failed(detail),
                PollResult::Ready { video_url } => break self.store_artifact(request_id, &video_url).await,
            }
        };

        self.store.transition(request_id, &outcome).await?;
        info!(
            status = %outcome.status(),
            elapsed_secs = started.elapsed().as_secs(),
            polls,
            "job finished"
        );
        Ok(outcome)
    }

    async fn store_artifact(&self, request_id: &RequestId, video_url: &str) -> JobOutcome {
        let file_name = request_id.artifact_file_name();

        let bytes = match self.client.fetch_artifact(video_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "video download failed");
                return JobOutcome::failed(format!("Download failed: {e}"));
            }
        };

        match self.artifacts.write(&file_name, &bytes).await {
            Ok(_) => {
                info!(file_name = %file_name, bytes = bytes.len(), "video saved");
                JobOutcome::done(file_name)
            }
            Err(e) => {
                error!(error = %e, "video could not be stored");
                JobOutcome::failed(format!("Download failed: {e}"))
            }
        }
    }

    pub async fn list_jobs(&self, page: Page) -> Result<JobPage, LifecycleError> {
        Ok(self.store.list(page).await?)
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, LifecycleError> {
        Ok(self.store.get(job_id).await?)
    }

    /// Decoded source image; `None` when the job has none or it is not a data URI.
    pub async fn get_job_image(&self, job_id: JobId) -> Result<Option<DecodedImage>, LifecycleError> {
        let Some(image) = self.store.get_source_image(job_id).await? else {
            return Ok(None);
        };
        match image.decode() {
            Ok(decoded) => Ok(Some(decoded)),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "stored source image is not decodable");
                Ok(None)
            }
        }
    }

    /// Stop launching pollers and release the store. In-flight pollers are
    /// abandoned; startup recovery resumes them.
    pub async fn shutdown(&self) {
        let abandoned = self.supervisor.active_count();
        self.supervisor.close();
        self.store.close().await;
        info!(abandoned, "lifecycle manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::generation::{MODERATION_REJECTED, ScriptedGenerationApi};
    use crate::jobs::store::InMemoryJobStore;
    use vidgen_core::JobStatus;

    struct Harness {
        api: Arc<ScriptedGenerationApi>,
        store: Arc<InMemoryJobStore>,
        manager: LifecycleManager,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(ScriptedGenerationApi::new());
        let store = Arc::new(InMemoryJobStore::new());
        let manager = LifecycleManager::new(
            api.clone(),
            store.clone(),
            ArtifactStore::new(dir.path().join("videos")),
            PollPolicy::default(),
        );
        Harness {
            api,
            store,
            manager,
            _dir: dir,
        }
    }

    fn rid(raw: &str) -> RequestId {
        RequestId::parse(raw).unwrap()
    }

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            image: None,
            duration: 15,
            aspect_ratio: "auto".to_string(),
            resolution: "720p".to_string(),
        }
    }

    async fn seed_pending(h: &Harness, raw: &str) -> (JobId, RequestId) {
        let request_id = rid(raw);
        let job = request("seeded").validate().unwrap();
        let id = h.store.create(&job, &request_id).await.unwrap();
        (id, request_id)
    }

    #[tokio::test(start_paused = true)]
    async fn cat_skateboarding_goes_pending_then_done() {
        let h = harness();
        let request_id = rid("abc123");
        h.api.push_submission(Ok(request_id.clone()));
        h.api.script_polls(
            &request_id,
            [
                PollResult::StillPending,
                PollResult::StillPending,
                PollResult::StillPending,
                PollResult::Ready {
                    video_url: "https://cdn/abc123.mp4".to_string(),
                },
            ],
        );
        h.api
            .set_download("https://cdn/abc123.mp4", Ok(b"mp4 bytes".to_vec()));

        let accepted = h.manager.create_job(request("a cat skateboarding")).await.unwrap();
        assert_eq!(accepted.request_id, request_id);

        let job = h.store.get(accepted.job_id).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.request_id, request_id);

        h.manager.supervisor().drain().await;

        let job = h.store.get(accepted.job_id).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Done);
        assert_eq!(job.video_filename(), Some("abc123.mp4"));
        assert!(h.manager.artifacts().exists("abc123.mp4").await);
        assert_eq!(h.api.poll_count(&request_id), 4);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_upstream() {
        let h = harness();
        let mut bad = request("a cat");
        bad.resolution = "1080p".to_string();

        let err = h.manager.create_job(bad).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));

        let err = h.manager.create_job(request("   ")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));

        assert!(h.api.submitted().is_empty());
        assert_eq!(h.store.list(Page::all()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn upstream_submit_failure_creates_no_row() {
        let h = harness();
        h.api.push_submission(Err(GenerationError::Upstream {
            status: 422,
            body: "invalid prompt".to_string(),
        }));

        let err = h.manager.create_job(request("a cat")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Upstream(GenerationError::Upstream { status: 422, .. })));
        assert_eq!(h.store.list(Page::all()).await.unwrap().total, 0);
        assert_eq!(h.manager.supervisor().active_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_request_id_is_a_conflict() {
        let h = harness();
        seed_pending(&h, "dup").await;
        h.api.push_submission(Ok(rid("dup")));

        let err = h.manager.create_job(request("again")).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict(_)));
        assert_eq!(h.store.list(Page::all()).await.unwrap().total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn moderation_rejects_after_a_single_poll() {
        let h = harness();
        let (id, request_id) = seed_pending(&h, "moderated").await;
        h.api.script_polls(
            &request_id,
            [PollResult::Rejected {
                reason: MODERATION_REJECTED.to_string(),
            }],
        );

        let outcome = h.manager.run_poll_loop(&request_id).await.unwrap();
        assert_eq!(outcome, JobOutcome::rejected(MODERATION_REJECTED));
        assert_eq!(h.api.poll_count(&request_id), 1);

        let job = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Rejected);
        assert_eq!(job.error_message(), Some("Content moderation rejected"));
        assert_eq!(job.video_filename(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_between_ceiling_and_one_interval_past_it() {
        let h = harness();
        let (id, request_id) = seed_pending(&h, "slow").await;

        let started = Instant::now();
        let outcome = h.manager.run_poll_loop(&request_id).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(outcome, JobOutcome::failed(POLL_TIMEOUT_MESSAGE));
        assert!(elapsed >= Duration::from_secs(600), "{elapsed:?}");
        assert!(elapsed <= Duration::from_secs(605), "{elapsed:?}");
        assert_eq!(h.api.poll_count(&request_id), 120);
        assert_eq!(
            h.store.get(id).await.unwrap().unwrap().status(),
            JobStatus::Failed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn short_transient_burst_then_ready_is_done() {
        let h = harness();
        let (id, request_id) = seed_pending(&h, "flaky").await;
        let transient = PollResult::Transient {
            status: 400,
            body: "try later".to_string(),
        };
        // Polls at 5..25 s fail transiently; the poll at 30 s is ready.
        h.api.script_polls(
            &request_id,
            std::iter::repeat(transient)
                .take(5)
                .chain([PollResult::Ready {
                    video_url: "https://cdn/flaky.mp4".to_string(),
                }]),
        );
        h.api.set_download("https://cdn/flaky.mp4", Ok(vec![1, 2, 3]));

        let outcome = h.manager.run_poll_loop(&request_id).await.unwrap();
        assert_eq!(outcome, JobOutcome::done("flaky.mp4"));
        assert_eq!(
            h.store.get(id).await.unwrap().unwrap().video_filename(),
            Some("flaky.mp4")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_past_the_window_fail_the_job() {
        let h = harness();
        let (_, request_id) = seed_pending(&h, "broken").await;
        h.api.script_polls(
            &request_id,
            std::iter::repeat(PollResult::Transient {
                status: 400,
                body: "x".repeat(300),
            })
            .take(20),
        );

        let started = Instant::now();
        let outcome = h.manager.run_poll_loop(&request_id).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(35));
        assert_eq!(h.api.poll_count(&request_id), 6);
        let expected = format!("API error 400: {}", "x".repeat(200));
        assert_eq!(outcome, JobOutcome::failed(expected));
    }

    #[tokio::test(start_paused = true)]
    async fn download_failure_fails_the_job_without_artifact() {
        let h = harness();
        let (id, request_id) = seed_pending(&h, "nodl").await;
        h.api.script_polls(
            &request_id,
            [PollResult::Ready {
                video_url: "https://cdn/missing.mp4".to_string(),
            }],
        );

        let outcome = h.manager.run_poll_loop(&request_id).await.unwrap();
        let message = outcome.error_message().unwrap();
        assert!(message.starts_with("Download failed: "), "{message}");

        let job = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.video_filename(), None);
        assert!(!h.manager.artifacts().exists("nodl.mp4").await);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_and_fatal_results_are_terminal() {
        let h = harness();
        let (_, expired) = seed_pending(&h, "old").await;
        let (_, fatal) = seed_pending(&h, "fatal").await;
        h.api.script_polls(&expired, [PollResult::StillPending, PollResult::Expired]);
        h.api.script_polls(
            &fatal,
            [PollResult::Fatal {
                detail: "connection reset".to_string(),
            }],
        );

        assert_eq!(
            h.manager.run_poll_loop(&expired).await.unwrap(),
            JobOutcome::expired("Request expired")
        );
        assert_eq!(
            h.manager.run_poll_loop(&fatal).await.unwrap(),
            JobOutcome::failed("connection reset")
        );
        assert!(h.store.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_poll_loop_cannot_overwrite_a_terminal_row() {
        let h = harness();
        let (_, request_id) = seed_pending(&h, "once").await;
        h.api.script_polls(&request_id, [PollResult::Expired]);
        h.manager.run_poll_loop(&request_id).await.unwrap();

        h.api.script_polls(&request_id, [PollResult::Fatal { detail: "late".into() }]);
        let err = h.manager.run_poll_loop(&request_id).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Storage(JobStoreError::AlreadyTerminal { .. })
        ));
    }

    #[tokio::test]
    async fn job_image_is_decoded_from_the_data_uri() {
        let h = harness();
        let job = GenerationRequest {
            image: Some("data:image/png;base64,aGVsbG8=".to_string()),
            ..request("with image")
        }
        .validate()
        .unwrap();
        let id = h.store.create(&job, &rid("img")).await.unwrap();
        let (plain, _) = seed_pending(&h, "plain").await;

        let image = h.manager.get_job_image(id).await.unwrap().unwrap();
        assert_eq!(image.media_type, "image/png");
        assert_eq!(image.bytes, b"hello");
        assert!(h.manager.get_job_image(plain).await.unwrap().is_none());
        assert!(h.manager.get_job_image(JobId::new(404)).await.unwrap().is_none());
    }
}

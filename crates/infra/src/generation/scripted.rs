//! Scripted generation API for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use vidgen_core::{NewJob, RequestId};

use super::client::{GenerationApi, GenerationError, PollResult};

/// Plays back pre-recorded responses.
///
/// Submissions are consumed in order. Polls are consumed per request id and
/// fall back to [`PollResult::StillPending`] once a script runs dry.
/// Downloads are looked up by URL.
#[derive(Debug, Default)]
pub struct ScriptedGenerationApi {
    state: Mutex<Script>,
}

#[derive(Debug, Default)]
struct Script {
    submissions: VecDeque<Result<RequestId, GenerationError>>,
    polls: HashMap<RequestId, VecDeque<PollResult>>,
    downloads: HashMap<String, Result<Vec<u8>, GenerationError>>,
    submitted: Vec<NewJob>,
    poll_counts: HashMap<RequestId, usize>,
}

impl ScriptedGenerationApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_submission(&self, result: Result<RequestId, GenerationError>) -> &Self {
        self.lock().submissions.push_back(result);
        self
    }

    pub fn script_polls(
        &self,
        request_id: &RequestId,
        results: impl IntoIterator<Item = PollResult>,
    ) -> &Self {
        self.lock()
            .polls
            .entry(request_id.clone())
            .or_default()
            .extend(results);
        self
    }

    pub fn set_download(&self, url: &str, result: Result<Vec<u8>, GenerationError>) -> &Self {
        self.lock().downloads.insert(url.to_string(), result);
        self
    }

    /// Jobs passed to `submit`, in order.
    pub fn submitted(&self) -> Vec<NewJob> {
        self.lock().submitted.clone()
    }

    pub fn poll_count(&self, request_id: &RequestId) -> usize {
        self.lock().poll_counts.get(request_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl GenerationApi for ScriptedGenerationApi {
    async fn submit(&self, job: &NewJob) -> Result<RequestId, GenerationError> {
        let mut script = self.lock();
        script.submitted.push(job.clone());
        script.submissions.pop_front().unwrap_or_else(|| {
            Err(GenerationError::InvalidResponse(
                "no scripted submission".to_string(),
            ))
        })
    }

    async fn poll(&self, request_id: &RequestId) -> PollResult {
        let mut script = self.lock();
        *script.poll_counts.entry(request_id.clone()).or_default() += 1;
        script
            .polls
            .get_mut(request_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(PollResult::StillPending)
    }

    async fn fetch_artifact(&self, video_url: &str) -> Result<Vec<u8>, GenerationError> {
        self.lock()
            .downloads
            .get(video_url)
            .cloned()
            .unwrap_or_else(|| {
                Err(GenerationError::Upstream {
                    status: 404,
                    body: "not found".to_string(),
                })
            })
    }
}

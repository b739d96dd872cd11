//! Job storage abstraction, shared helpers and the in-memory implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use vidgen_core::{Job, JobId, JobOutcome, JobStatus, NewJob, RequestId, SourceImage};

/// Durable record of generation jobs.
///
/// Every mutating call has committed when it returns. Implementations must be
/// safe to call from many polling tasks at once.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a `pending` row for an accepted upstream request.
    async fn create(&self, job: &NewJob, request_id: &RequestId) -> Result<JobId, JobStoreError>;

    /// Move a `pending` row to its terminal outcome.
    async fn transition(
        &self,
        request_id: &RequestId,
        outcome: &JobOutcome,
    ) -> Result<(), JobStoreError>;

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Newest-first listing with the (possibly cached) total row count.
    async fn list(&self, page: Page) -> Result<JobPage, JobStoreError>;

    /// Request ids of every job still `pending` (startup recovery only).
    async fn list_pending(&self) -> Result<Vec<RequestId>, JobStoreError>;

    async fn get_source_image(&self, job_id: JobId) -> Result<Option<SourceImage>, JobStoreError>;

    /// Release underlying resources. Further calls may fail.
    async fn close(&self) {}
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job already exists for request {0}")]
    Conflict(RequestId),
    #[error("no job for request {0}")]
    NotFound(RequestId),
    #[error("job for request {request_id} is already {status}")]
    AlreadyTerminal {
        request_id: RequestId,
        status: JobStatus,
    },
    #[error("corrupt job row: {0}")]
    Corrupt(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Listing window; `limit: None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: u32,
}

impl Page {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPage {
    pub items: Vec<Job>,
    pub total: u64,
}

/// Short-lived cache for the total row count.
///
/// `invalidate` bumps a generation counter so a count computed before an
/// insert can never be stored after it.
#[derive(Debug)]
pub struct CountCache {
    ttl: Duration,
    state: Mutex<CountState>,
}

#[derive(Debug, Default)]
struct CountState {
    cached: Option<(u64, Instant)>,
    generation: u64,
}

impl CountCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CountState::default()),
        }
    }

    /// Cached value if still fresh, plus the generation to store against.
    pub fn lookup(&self) -> (Option<u64>, u64) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = state
            .cached
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(value, _)| value);
        (fresh, state.generation)
    }

    pub fn store(&self, generation: u64, value: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation == generation {
            state.cached = Some((value, Instant::now()));
        }
    }

    pub fn invalidate(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation = state.generation.wrapping_add(1);
        state.cached = None;
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<JobId, StoredRow>,
    by_request: HashMap<RequestId, JobId>,
    last_id: i64,
}

#[derive(Debug, Clone)]
struct StoredRow {
    job: Job,
    source_image: Option<SourceImage>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &NewJob, request_id: &RequestId) -> Result<JobId, JobStoreError> {
        let mut inner = self.write();
        if inner.by_request.contains_key(request_id) {
            return Err(JobStoreError::Conflict(request_id.clone()));
        }

        inner.last_id += 1;
        let id = JobId::new(inner.last_id);
        let row = StoredRow {
            job: Job {
                id,
                request_id: request_id.clone(),
                prompt: job.prompt.clone(),
                has_source_image: job.source_image.is_some(),
                params: job.params,
                outcome: None,
                created_at: Utc::now(),
            },
            source_image: job.source_image.clone(),
        };
        inner.rows.insert(id, row);
        inner.by_request.insert(request_id.clone(), id);
        Ok(id)
    }

    async fn transition(
        &self,
        request_id: &RequestId,
        outcome: &JobOutcome,
    ) -> Result<(), JobStoreError> {
        let mut inner = self.write();
        let id = *inner
            .by_request
            .get(request_id)
            .ok_or_else(|| JobStoreError::NotFound(request_id.clone()))?;
        let row = inner
            .rows
            .get_mut(&id)
            .ok_or_else(|| JobStoreError::NotFound(request_id.clone()))?;

        if let Some(existing) = &row.job.outcome {
            return Err(JobStoreError::AlreadyTerminal {
                request_id: request_id.clone(),
                status: existing.status(),
            });
        }
        row.job.outcome = Some(outcome.clone());
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.read().rows.get(&job_id).map(|r| r.job.clone()))
    }

    async fn list(&self, page: Page) -> Result<JobPage, JobStoreError> {
        let inner = self.read();
        let mut jobs: Vec<&Job> = inner.rows.values().map(|r| &r.job).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let limit = page.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let items = jobs
            .into_iter()
            .skip(page.offset as usize)
            .take(limit)
            .cloned()
            .collect();

        Ok(JobPage {
            items,
            total: inner.rows.len() as u64,
        })
    }

    async fn list_pending(&self) -> Result<Vec<RequestId>, JobStoreError> {
        Ok(self
            .read()
            .rows
            .values()
            .filter(|r| !r.job.is_terminal())
            .map(|r| r.job.request_id.clone())
            .collect())
    }

    async fn get_source_image(&self, job_id: JobId) -> Result<Option<SourceImage>, JobStoreError> {
        Ok(self
            .read()
            .rows
            .get(&job_id)
            .and_then(|r| r.source_image.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidgen_core::GenerationParams;

    fn new_job(prompt: &str) -> NewJob {
        NewJob::new(prompt, None, GenerationParams::default()).unwrap()
    }

    fn rid(raw: &str) -> RequestId {
        RequestId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = InMemoryJobStore::new();
        let id = store.create(&new_job("a cat"), &rid("abc123")).await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.request_id, rid("abc123"));
        assert_eq!(job.status(), JobStatus::Pending);
        assert!(store.get(JobId::new(999)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_request_id_conflicts_without_a_row() {
        let store = InMemoryJobStore::new();
        store.create(&new_job("one"), &rid("dup")).await.unwrap();

        let err = store.create(&new_job("two"), &rid("dup")).await.unwrap_err();
        assert!(matches!(err, JobStoreError::Conflict(_)));
        assert_eq!(store.list(Page::all()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn terminal_rows_are_never_rewritten() {
        let store = InMemoryJobStore::new();
        let id = store.create(&new_job("x"), &rid("r1")).await.unwrap();

        store
            .transition(&rid("r1"), &JobOutcome::rejected("Content moderation rejected"))
            .await
            .unwrap();
        let err = store
            .transition(&rid("r1"), &JobOutcome::done("r1.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobStoreError::AlreadyTerminal {
                status: JobStatus::Rejected,
                ..
            }
        ));

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Rejected);
        assert_eq!(job.video_filename(), None);
        assert!(store.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn count_cache_expires_and_ignores_stale_writers() {
        let cache = CountCache::new(Duration::from_secs(5));
        let (value, generation) = cache.lookup();
        assert_eq!(value, None);

        cache.store(generation, 3);
        assert_eq!(cache.lookup().0, Some(3));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.lookup().0, None);

        // A count computed before an insert must not land after it.
        let (_, generation) = cache.lookup();
        cache.invalidate();
        cache.store(generation, 3);
        assert_eq!(cache.lookup().0, None);
    }
}

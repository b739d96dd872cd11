//! Generation API abstraction.

use async_trait::async_trait;

use vidgen_core::{NewJob, RequestId};

/// Message recorded when upstream moderation rejects a request.
pub const MODERATION_REJECTED: &str = "Content moderation rejected";

/// Message recorded when upstream reports the request as expired.
pub const REQUEST_EXPIRED: &str = "Request expired";

/// The external video generation API, reduced to the three calls the job
/// lifecycle needs.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    /// Submit a generation request; returns the upstream request id.
    async fn submit(&self, job: &NewJob) -> Result<RequestId, GenerationError>;

    /// Check a request once. Never fails: every outcome is a [`PollResult`].
    async fn poll(&self, request_id: &RequestId) -> PollResult;

    /// Download the finished media.
    async fn fetch_artifact(&self, video_url: &str) -> Result<Vec<u8>, GenerationError>;
}

/// Classified result of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    StillPending,
    Ready { video_url: String },
    Expired,
    Rejected { reason: String },
    /// Retryable while the transient window is open.
    Transient { status: u16, body: String },
    Fatal { detail: String },
}

impl PollResult {
    pub fn kind(&self) -> &'static str {
        match self {
            PollResult::StillPending => "still_pending",
            PollResult::Ready { .. } => "ready",
            PollResult::Expired => "expired",
            PollResult::Rejected { .. } => "rejected",
            PollResult::Transient { .. } => "transient_error",
            PollResult::Fatal { .. } => "fatal_error",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GenerationError {
    /// Non-success HTTP response.
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
}

/// First `max` characters of `text`, for diagnostics stored on job rows.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

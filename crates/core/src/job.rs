//! Generation job model and its status machine.
//!
//! A job starts `pending` and moves exactly once to a terminal outcome.
//! Terminal data (artifact or diagnostic) lives inside [`JobOutcome`] so a
//! `done` job always has an artifact and no other status can carry one.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{JobId, RequestId};
use crate::image::SourceImage;
use crate::params::GenerationParams;

/// Persisted status tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
    Rejected,
    Expired,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Rejected => "rejected",
            JobStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            "rejected" => Ok(JobStatus::Rejected),
            "expired" => Ok(JobStatus::Expired),
            other => Err(DomainError::invariant(format!("unknown job status: {other}"))),
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done { video_filename: String },
    Failed { reason: String },
    Rejected { reason: String },
    Expired { reason: String },
}

impl JobOutcome {
    pub fn done(video_filename: impl Into<String>) -> Self {
        Self::Done {
            video_filename: video_filename.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn expired(reason: impl Into<String>) -> Self {
        Self::Expired {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Done { .. } => JobStatus::Done,
            JobOutcome::Failed { .. } => JobStatus::Failed,
            JobOutcome::Rejected { .. } => JobStatus::Rejected,
            JobOutcome::Expired { .. } => JobStatus::Expired,
        }
    }

    pub fn video_filename(&self) -> Option<&str> {
        match self {
            JobOutcome::Done { video_filename } => Some(video_filename.as_str()),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            JobOutcome::Done { .. } => None,
            JobOutcome::Failed { reason }
            | JobOutcome::Rejected { reason }
            | JobOutcome::Expired { reason } => Some(reason.as_str()),
        }
    }

    /// Rebuild an outcome from stored columns; `Ok(None)` means still pending.
    pub fn from_columns(
        status: JobStatus,
        video_filename: Option<String>,
        error_message: Option<String>,
    ) -> Result<Option<Self>, DomainError> {
        match (status, video_filename) {
            (JobStatus::Pending, None) => Ok(None),
            (JobStatus::Done, Some(name)) => Ok(Some(Self::done(name))),
            (JobStatus::Done, None) => Err(DomainError::invariant("done job without artifact")),
            (_, Some(_)) => Err(DomainError::invariant(format!(
                "{status} job carries an artifact"
            ))),
            (JobStatus::Failed, None) => Ok(Some(Self::failed(error_message.unwrap_or_default()))),
            (JobStatus::Rejected, None) => {
                Ok(Some(Self::rejected(error_message.unwrap_or_default())))
            }
            (JobStatus::Expired, None) => Ok(Some(Self::expired(error_message.unwrap_or_default()))),
        }
    }
}

/// Validated input for a new job (before an upstream request id exists).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub prompt: String,
    pub source_image: Option<SourceImage>,
    pub params: GenerationParams,
}

impl NewJob {
    pub fn new(
        prompt: impl Into<String>,
        source_image: Option<SourceImage>,
        params: GenerationParams,
    ) -> Result<Self, DomainError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(DomainError::validation("prompt must not be empty"));
        }
        Ok(Self {
            prompt,
            source_image,
            params,
        })
    }
}

/// A stored generation job, without the (potentially large) source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub request_id: RequestId,
    pub prompt: String,
    pub has_source_image: bool,
    pub params: GenerationParams,
    pub outcome: Option<JobOutcome>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        self.outcome
            .as_ref()
            .map(JobOutcome::status)
            .unwrap_or(JobStatus::Pending)
    }

    pub fn video_filename(&self) -> Option<&str> {
        self.outcome.as_ref().and_then(JobOutcome::video_filename)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.outcome.as_ref().and_then(JobOutcome::error_message)
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }
}

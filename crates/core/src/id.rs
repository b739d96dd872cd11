//! Strongly-typed identifiers for generation jobs.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// File extension of downloaded artifacts.
pub const ARTIFACT_EXTENSION: &str = "mp4";

/// Whether `name` can be used as-is inside a flat artifact directory.
///
/// Empty names, hidden names (leading `.`), separators, NUL and `..` are
/// refused. Temporary files are dot-prefixed, so no accepted name collides
/// with one.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && !name.contains("..")
}

/// Process-local surrogate key of a job row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(i64);

impl JobId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Self)
            .map_err(|e| DomainError::invalid_id(format!("JobId: {e}")))
    }
}

/// Identifier assigned by the upstream generation API.
///
/// It keys every poll, transition and recovery scan, and names the stored
/// artifact (`{request_id}.mp4`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap an upstream identifier.
    ///
    /// Rejects empty values and anything that could escape the artifact
    /// directory once used as a file stem.
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(DomainError::invalid_id("RequestId: empty"));
        }
        if !is_plain_file_name(&raw) {
            return Err(DomainError::invalid_id(format!(
                "RequestId: not usable as a file name: {raw:?}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic artifact file name for this request.
    pub fn artifact_file_name(&self) -> String {
        format!("{}.{}", self.0, ARTIFACT_EXTENSION)
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RequestId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

//! Infrastructure layer: configuration, job persistence, the generation API
//! client, artifact storage, the job lifecycle and billing lookups.

pub mod artifacts;
pub mod billing;
pub mod config;
pub mod generation;
pub mod jobs;

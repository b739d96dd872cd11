//! `vidgen-core` — domain building blocks for video generation jobs.
//!
//! This crate contains **pure domain** types (no I/O): identifiers, validated
//! generation parameters, the job status machine and source image decoding.

pub mod error;
pub mod id;
pub mod image;
pub mod job;
pub mod params;

pub use error::{DomainError, DomainResult};
pub use id::{JobId, RequestId};
pub use image::SourceImage;
pub use job::{Job, JobOutcome, JobStatus, NewJob};
pub use params::{AspectRatio, GenerationParams, Resolution, VideoDuration};

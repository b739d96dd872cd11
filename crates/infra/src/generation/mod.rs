//! Client side of the external video generation API.
//!
//! - `GenerationApi`: submit / poll / fetch abstraction used by the lifecycle
//! - `XaiGenerationClient`: production implementation over HTTP
//! - `ScriptedGenerationApi`: canned responses for tests (`test-util` feature)

pub mod client;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;
pub mod xai;

pub use client::{
    GenerationApi, GenerationError, MODERATION_REJECTED, PollResult, REQUEST_EXPIRED,
    truncate_chars,
};
#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedGenerationApi;
pub use xai::XaiGenerationClient;

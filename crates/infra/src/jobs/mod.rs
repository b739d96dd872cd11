//! Generation job system.
//!
//! ## Design
//!
//! - Every accepted job is owned by exactly one polling task
//! - Polling runs on a fixed interval under an overall ceiling, tolerating
//!   transient upstream errors for a short window
//! - Terminal states are written once; rows never leave a terminal state
//! - Jobs still `pending` at startup are resumed with a fresh clock
//!
//! ## Components
//!
//! - `JobStore`: persistence (SQLite or in-memory)
//! - `PollPolicy`: interval / ceiling / transient window
//! - `TaskSupervisor`: per-request task set with mandatory failure logging
//! - `LifecycleManager`: submit → persist → poll → store video → transition
//! - `resume_pending`: startup recovery

pub mod lifecycle;
pub mod policy;
pub mod recovery;
pub mod sqlite;
pub mod store;
pub mod supervisor;

pub use lifecycle::{
    AcceptedJob, GenerationRequest, LifecycleError, LifecycleManager, POLL_TIMEOUT_MESSAGE,
};
pub use policy::PollPolicy;
pub use recovery::{RecoveryReport, resume_pending};
pub use sqlite::SqliteJobStore;
pub use store::{CountCache, InMemoryJobStore, JobPage, JobStore, JobStoreError, Page};
pub use supervisor::TaskSupervisor;

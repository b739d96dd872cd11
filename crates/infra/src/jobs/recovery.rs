//! Startup recovery of jobs left `pending` by a previous process.

use tracing::{info, instrument};

use super::lifecycle::{LifecycleError, LifecycleManager};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Pollers launched.
    pub resumed: usize,
    /// Pending jobs that already had a poller in this process.
    pub already_active: usize,
}

/// Launch one fresh poller per pending job. Run once, after the store is
/// ready and before the HTTP listener accepts traffic.
///
/// Elapsed time is not carried over: each resumed job gets a full polling
/// window again.
#[instrument(skip(manager), err)]
pub async fn resume_pending(manager: &LifecycleManager) -> Result<RecoveryReport, LifecycleError> {
    let pending = manager.store().list_pending().await?;
    let mut report = RecoveryReport::default();

    for request_id in pending {
        if manager.spawn_poller(request_id.clone()) {
            info!(request_id = %request_id, "resuming pending job");
            report.resumed += 1;
        } else {
            report.already_active += 1;
        }
    }

    info!(
        resumed = report.resumed,
        already_active = report.already_active,
        "recovery complete"
    );
    Ok(report)
}

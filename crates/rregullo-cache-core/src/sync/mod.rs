//! Background delivery of issue reports captured while offline.
//!
//! Reports are queued locally (`ReportQueue`) and delivered when the host
//! fires the `sync-reports` background sync event. A drain submits every
//! queued report once:
//! - delivered reports leave the queue
//! - permanently rejected reports leave the queue and are logged
//! - transient failures stay queued with an incremented attempt count,
//!   until the attempt limit is reached

pub mod queue;
pub mod report;
pub mod submit;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use queue::ReportQueue;
pub use report::{PendingReport, ReportSubmission};
pub use submit::{HttpReportSubmitter, ReportSubmitter, SubmitError, SubmitReceipt};

/// Background sync tag that drains the report queue.
pub const SYNC_REPORTS_TAG: &str = "sync-reports";

/// Result of one drain of the report queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub delivered: usize,
    /// Still queued after a transient failure.
    pub retained: usize,
    /// Dropped after a permanent rejection.
    pub rejected: usize,
    /// Dropped after reaching the attempt limit.
    pub abandoned: usize,
}

impl SyncSummary {
    /// Whether the host should fire the sync event again later.
    pub fn needs_retry(&self) -> bool {
        self.retained > 0
    }
}

/// Owns the report queue and drains it through a submitter.
pub struct ReportSync {
    queue: Mutex<ReportQueue>,
    submitter: Arc<dyn ReportSubmitter>,
    max_attempts: u32,
}

impl ReportSync {
    pub fn new(queue: ReportQueue, submitter: Arc<dyn ReportSubmitter>, max_attempts: u32) -> Self {
        Self {
            queue: Mutex::new(queue),
            submitter,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn enqueue(&self, report: PendingReport) -> Result<()> {
        self.queue.lock().await.enqueue(report)
    }

    pub async fn pending(&self) -> Vec<PendingReport> {
        self.queue.lock().await.reports().to_vec()
    }

    /// Submit every queued report once and reconcile the queue.
    ///
    /// The queue lock is held for the whole drain, so concurrent sync events
    /// never deliver the same report twice.
    pub async fn drain(&self) -> Result<SyncSummary> {
        let mut queue = self.queue.lock().await;
        let reports = queue.reports().to_vec();
        let mut summary = SyncSummary::default();
        let mut remaining = Vec::new();

        for mut report in reports {
            match self.submitter.submit(&report).await {
                Ok(receipt) => {
                    info!(report = %report.id, server_id = ?receipt.id, "Queued report delivered");
                    summary.delivered += 1;
                }
                Err(e) if !e.is_retryable() => {
                    warn!(report = %report.id, error = %e, "Queued report rejected, dropping");
                    summary.rejected += 1;
                }
                Err(e) => {
                    report.attempts += 1;
                    report.last_error = Some(e.to_string());
                    if report.attempts >= self.max_attempts {
                        warn!(
                            report = %report.id,
                            attempts = report.attempts,
                            error = %e,
                            "Queued report abandoned after repeated failures"
                        );
                        summary.abandoned += 1;
                    } else {
                        warn!(report = %report.id, attempts = report.attempts, error = %e, "Report delivery failed, keeping in queue");
                        summary.retained += 1;
                        remaining.push(report);
                    }
                }
            }
        }

        queue.replace(remaining);
        queue.save()?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSubmitter;
    use reqwest::StatusCode;
    use tempfile::TempDir;

    fn report(title: &str) -> PendingReport {
        PendingReport::new(title, "përshkrim", "roads")
    }

    #[tokio::test]
    async fn test_drain_empty_queue() {
        let sync = ReportSync::new(ReportQueue::in_memory(), Arc::new(ScriptedSubmitter::default()), 3);
        let summary = sync.drain().await.unwrap();
        assert_eq!(summary, SyncSummary::default());
        assert!(!summary.needs_retry());
    }

    #[tokio::test]
    async fn test_drain_reconciles_queue() {
        let dir = TempDir::new().unwrap();
        let mut queue = ReportQueue::open(dir.path().to_path_buf()).unwrap();
        let delivered = report("delivered");
        let flaky = report("flaky");
        let invalid = report("invalid");
        queue.enqueue(delivered.clone()).unwrap();
        queue.enqueue(flaky.clone()).unwrap();
        queue.enqueue(invalid.clone()).unwrap();

        let submitter = ScriptedSubmitter::default()
            .fail(&flaky.id, || SubmitError::from_status(StatusCode::SERVICE_UNAVAILABLE, ""))
            .fail(&invalid.id, || SubmitError::from_status(StatusCode::BAD_REQUEST, "no title"));
        let submitter = Arc::new(submitter);
        let sync = ReportSync::new(queue, submitter.clone(), 3);

        let summary = sync.drain().await.unwrap();
        assert_eq!(
            summary,
            SyncSummary {
                delivered: 1,
                retained: 1,
                rejected: 1,
                abandoned: 0,
            }
        );
        assert!(summary.needs_retry());
        assert_eq!(submitter.submitted(), vec![delivered.id.clone(), flaky.id.clone(), invalid.id.clone()]);

        let pending = sync.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, flaky.id);
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0].last_error.is_some());

        // Reconciled state is on disk
        let reopened = ReportQueue::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.reports(), pending.as_slice());
    }

    #[tokio::test]
    async fn test_drain_abandons_after_max_attempts() {
        let flaky = report("flaky");
        let mut queue = ReportQueue::in_memory();
        queue.enqueue(flaky.clone()).unwrap();

        let submitter = ScriptedSubmitter::default()
            .fail(&flaky.id, || SubmitError::from_status(StatusCode::BAD_GATEWAY, ""));
        let sync = ReportSync::new(queue, Arc::new(submitter), 2);

        let first = sync.drain().await.unwrap();
        assert_eq!(first.retained, 1);

        let second = sync.drain().await.unwrap();
        assert_eq!(second.abandoned, 1);
        assert_eq!(second.retained, 0);
        assert!(sync.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_then_drain_delivers() {
        let sync = ReportSync::new(ReportQueue::in_memory(), Arc::new(ScriptedSubmitter::default()), 3);
        sync.enqueue(report("a")).await.unwrap();
        sync.enqueue(report("b")).await.unwrap();

        let summary = sync.drain().await.unwrap();
        assert_eq!(summary.delivered, 2);
        assert!(sync.pending().await.is_empty());
    }
}

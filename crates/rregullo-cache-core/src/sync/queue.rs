use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::utils::write_atomic;

use super::PendingReport;

/// Queue file name in cache directory
const QUEUE_FILE: &str = "pending_reports.json";

/// Reports waiting for delivery, persisted as JSON.
pub struct ReportQueue {
    path: Option<PathBuf>,
    reports: Vec<PendingReport>,
}

impl ReportQueue {
    /// Open the queue stored in `cache_dir`, loading any saved reports.
    pub fn open(cache_dir: PathBuf) -> Result<Self> {
        let mut queue = Self {
            path: Some(cache_dir.join(QUEUE_FILE)),
            reports: Vec::new(),
        };
        queue.load()?;
        Ok(queue)
    }

    /// A queue that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            reports: Vec::new(),
        }
    }

    fn load(&mut self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("Failed to read report queue")?;
            self.reports =
                serde_json::from_str(&contents).context("Failed to parse report queue")?;
            debug!(count = self.reports.len(), "Loaded pending reports");
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.reports)?;
        write_atomic(path, contents).context("Failed to write report queue")?;
        Ok(())
    }

    /// Append a report and persist the queue.
    pub fn enqueue(&mut self, report: PendingReport) -> Result<()> {
        self.reports.push(report);
        self.save()
    }

    pub fn reports(&self) -> &[PendingReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Replace the queue contents without saving.
    pub(crate) fn replace(&mut self, reports: Vec<PendingReport>) {
        self.reports = reports;
    }
}

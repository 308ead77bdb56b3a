//! Sequencing of worker versions.
//!
//! A `Registration` holds at most one active and one waiting worker, the
//! way the browser holds them for a service worker scope. A newly
//! registered worker takes over immediately when nothing is active or when
//! it asked to skip waiting; otherwise it waits until the pages controlled
//! by the active version are released.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::WorkerError;
use crate::http::Request;
use crate::utils::write_atomic;

use super::manager::{ActivateReport, FetchOutcome, InstallReport, OfflineCacheWorker, SyncOutcome};
use super::message::{MessageEvent, MessageOutcome};
use super::WorkerState;

/// Registration file name in cache directory
const REGISTRATION_FILE: &str = "registration.json";

/// Outcome of registering a new worker version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Installed and took over.
    Activated {
        install: InstallReport,
        activate: ActivateReport,
    },
    /// Installed, waiting for the active version to release its pages.
    Waiting(InstallReport),
}

#[derive(Default)]
pub struct Registration {
    active: Option<Arc<OfflineCacheWorker>>,
    waiting: Option<Arc<OfflineCacheWorker>>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore an active worker, e.g. from a saved `RegistrationRecord`.
    pub fn with_active(mut self, worker: Arc<OfflineCacheWorker>) -> Self {
        self.active = Some(worker);
        self
    }

    /// Restore a waiting worker.
    pub fn with_waiting(mut self, worker: Arc<OfflineCacheWorker>) -> Self {
        self.waiting = Some(worker);
        self
    }

    pub fn active(&self) -> Option<&Arc<OfflineCacheWorker>> {
        self.active.as_ref()
    }

    pub fn waiting(&self) -> Option<&Arc<OfflineCacheWorker>> {
        self.waiting.as_ref()
    }

    /// Install a new version and activate it if nothing stands in its way.
    ///
    /// A failed install leaves the registration untouched: the previously
    /// active worker keeps serving. A version that installs but fails to
    /// activate is kept as the waiting version.
    pub async fn register(&mut self, worker: Arc<OfflineCacheWorker>) -> Result<RegisterOutcome, WorkerError> {
        let install = worker.install().await?;

        if self.active.is_none() || worker.skip_waiting_requested() {
            match self.promote(worker.clone()).await {
                Ok(activate) => {
                    if let Some(previous) = self.waiting.take() {
                        previous.mark_redundant();
                    }
                    Ok(RegisterOutcome::Activated { install, activate })
                }
                Err(e) => {
                    // Installed but not activated: keep it as the next version
                    self.replace_waiting(worker);
                    Err(e)
                }
            }
        } else {
            info!(bucket = %worker.bucket(), "New version waiting");
            self.replace_waiting(worker);
            Ok(RegisterOutcome::Waiting(install))
        }
    }

    /// Park `worker` as the waiting version. Any version it displaces is
    /// redundant.
    fn replace_waiting(&mut self, worker: Arc<OfflineCacheWorker>) {
        if let Some(previous) = self.waiting.replace(worker) {
            previous.mark_redundant();
        }
    }

    /// All pages controlled by the active version are gone: let the waiting
    /// version take over.
    pub async fn release_clients(&mut self) -> Result<Option<ActivateReport>, WorkerError> {
        let Some(worker) = self.waiting.take() else {
            return Ok(None);
        };
        match self.promote(worker.clone()).await {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                self.waiting = Some(worker);
                Err(e)
            }
        }
    }

    /// Make `worker` the active one, activating it first if it is still
    /// waiting. The previous active worker becomes redundant.
    async fn promote(&mut self, worker: Arc<OfflineCacheWorker>) -> Result<ActivateReport, WorkerError> {
        let report = match worker.state() {
            WorkerState::Activated => ActivateReport {
                bucket: worker.bucket().to_string(),
                deleted: Vec::new(),
            },
            _ => worker.activate().await?,
        };

        if let Some(previous) = self.active.replace(worker) {
            previous.mark_redundant();
        }
        Ok(report)
    }

    /// Deliver a page message. It goes to the waiting worker if there is
    /// one, so a trusted skip-waiting lets it take over at once.
    pub async fn handle_message(&mut self, event: &MessageEvent) -> Result<MessageOutcome, WorkerError> {
        let target = self
            .waiting
            .clone()
            .or_else(|| self.active.clone())
            .ok_or(WorkerError::NoActiveWorker)?;

        let outcome = target.handle_message(event).await?;

        let took_over = self
            .waiting
            .as_ref()
            .map(|w| w.state() == WorkerState::Activated)
            .unwrap_or(false);
        if took_over {
            if let Some(worker) = self.waiting.take() {
                self.promote(worker).await?;
            }
        }
        Ok(outcome)
    }

    /// Route an intercepted request to the active worker.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        match self.active {
            Some(ref worker) => worker.handle_fetch(request).await,
            None => FetchOutcome::Passthrough,
        }
    }

    pub async fn handle_sync(&self, tag: &str) -> Result<SyncOutcome, WorkerError> {
        let worker = self.active.as_ref().ok_or(WorkerError::NoActiveWorker)?;
        worker.handle_sync(tag).await
    }

    pub fn record(&self) -> RegistrationRecord {
        RegistrationRecord {
            active: self.active.as_ref().map(|w| w.bucket().to_string()),
            waiting: self.waiting.as_ref().map(|w| w.bucket().to_string()),
            updated_at: Utc::now(),
        }
    }
}

/// Bucket names of the active and waiting versions, persisted by hosts that
/// restart between lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub active: Option<String>,
    pub waiting: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for RegistrationRecord {
    fn default() -> Self {
        Self {
            active: None,
            waiting: None,
            updated_at: Utc::now(),
        }
    }
}

impl RegistrationRecord {
    pub fn path(cache_dir: &Path) -> PathBuf {
        cache_dir.join(REGISTRATION_FILE)
    }

    /// Load the record, or an empty one if none was saved.
    pub fn load(cache_dir: &Path) -> Result<Self> {
        let path = Self::path(cache_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read registration file")?;
        serde_json::from_str(&contents).context("Failed to parse registration file")
    }

    pub fn save(&self, cache_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(cache_dir)?;
        let contents = serde_json::to_string_pretty(self)?;
        write_atomic(&Self::path(cache_dir), contents).context("Failed to write registration file")?;
        Ok(())
    }
}

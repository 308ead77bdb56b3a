//! The offline asset cache manager.
//!
//! One `OfflineCacheWorker` is one deployed version of the cache: it owns a
//! single bucket named after that version, fills it from the Asset Manifest
//! on install, removes every other bucket on activation, and answers
//! intercepted requests cache-first once active.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use reqwest::Method;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheStorage, CachedEntry};
use crate::config::WorkerSettings;
use crate::error::WorkerError;
use crate::http::{CacheKey, Request, Response, ResponseSource};
use crate::manifest::AssetManifest;
use crate::net::Fetcher;
use crate::sync::{ReportSync, SyncSummary, SYNC_REPORTS_TAG};

use super::message::{ClientMessage, MessageEvent, MessageOutcome};
use super::WorkerState;

/// Result of a completed install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub bucket: String,
    pub cached: usize,
}

/// Result of a completed activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    pub bucket: String,
    /// Stale buckets removed.
    pub deleted: Vec<String>,
}

/// What to do with an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The worker answers with this response.
    Respond(Response),
    /// Not handled; the host should use its default network handling.
    Passthrough,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::Passthrough => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Tag not handled by this worker.
    Ignored,
    Drained(SyncSummary),
}

impl SyncOutcome {
    pub fn summary(&self) -> Option<&SyncSummary> {
        match self {
            SyncOutcome::Drained(summary) => Some(summary),
            SyncOutcome::Ignored => None,
        }
    }
}

pub struct OfflineCacheWorker {
    settings: WorkerSettings,
    manifest: AssetManifest,
    bucket: String,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    reports: Option<Arc<ReportSync>>,
    state: RwLock<WorkerState>,
    /// Serializes install and activate.
    lifecycle: Mutex<()>,
    skip_waiting: AtomicBool,
    controlling: AtomicBool,
}

impl OfflineCacheWorker {
    pub fn new(
        settings: WorkerSettings,
        manifest: AssetManifest,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let bucket = settings
            .cache_version
            .clone()
            .unwrap_or_else(|| manifest.bucket_name(&settings.cache_prefix));
        Self {
            settings,
            manifest,
            bucket,
            storage,
            fetcher,
            reports: None,
            state: RwLock::new(WorkerState::Installing),
            lifecycle: Mutex::new(()),
            skip_waiting: AtomicBool::new(false),
            controlling: AtomicBool::new(false),
        }
    }

    /// Serve an explicitly named bucket, e.g. one installed by an earlier
    /// manifest that this host no longer has.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_report_sync(mut self, reports: Arc<ReportSync>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Restore a lifecycle position saved by the host.
    pub fn resume(self, state: WorkerState) -> Self {
        *self.state.write() = state;
        self.controlling
            .store(state == WorkerState::Activated, Ordering::SeqCst);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Whether the worker has claimed the open pages.
    pub fn is_controlling(&self) -> bool {
        self.controlling.load(Ordering::SeqCst)
    }

    /// Request activation without waiting for the previous version to
    /// release its pages.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn mark_redundant(&self) {
        let mut state = self.state.write();
        let from = *state;
        if from != WorkerState::Redundant {
            info!(bucket = %self.bucket, from = %from, "Worker redundant");
            *state = WorkerState::Redundant;
        }
        self.controlling.store(false, Ordering::SeqCst);
    }

    fn transition(&self, expected: WorkerState, next: WorkerState) -> Result<(), WorkerError> {
        let mut state = self.state.write();
        if *state != expected {
            return Err(WorkerError::InvalidState {
                expected,
                actual: *state,
            });
        }
        *state = next;
        Ok(())
    }

    fn set_state(&self, next: WorkerState) {
        *self.state.write() = next;
    }

    fn require_state(&self, expected: WorkerState) -> Result<(), WorkerError> {
        self.transition(expected, expected)
    }

    // ===== Install =====

    /// Fetch every manifest asset and store them in the bucket.
    ///
    /// All-or-nothing: if any asset fails nothing is written and the worker
    /// becomes redundant, leaving the previous version in charge.
    pub async fn install(&self) -> Result<InstallReport, WorkerError> {
        let _guard = self.lifecycle.lock().await;
        self.require_state(WorkerState::Installing)?;

        info!(bucket = %self.bucket, assets = self.manifest.len(), "Installing");
        match self.install_assets().await {
            Ok(cached) => {
                if self.settings.skip_waiting_on_install {
                    self.skip_waiting();
                }
                self.set_state(WorkerState::Installed);
                info!(bucket = %self.bucket, cached, "Installed");
                Ok(InstallReport {
                    bucket: self.bucket.clone(),
                    cached,
                })
            }
            Err(e) => {
                warn!(bucket = %self.bucket, error = %e, "Install failed");
                self.mark_redundant();
                Err(e)
            }
        }
    }

    async fn install_assets(&self) -> Result<usize, WorkerError> {
        let urls = self.manifest.resolve(&self.settings.origin)?;
        let results = join_all(urls.iter().map(|url| self.fetch_asset(url))).await;
        let entries = results.into_iter().collect::<Result<Vec<_>, _>>()?;

        let existed = self.storage.has(&self.bucket)?;
        let written = self
            .storage
            .open(&self.bucket)
            .and_then(|_| self.storage.put_all(&self.bucket, &entries));

        if let Err(e) = written {
            if !existed {
                if let Err(cleanup) = self.storage.delete_bucket(&self.bucket) {
                    warn!(bucket = %self.bucket, error = %cleanup, "Failed to remove partial bucket");
                }
            }
            return Err(e.into());
        }
        Ok(entries.len())
    }

    async fn fetch_asset(&self, url: &Url) -> Result<(CacheKey, Response), WorkerError> {
        let request = Request::get(url.clone());
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| WorkerError::InstallFailure {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(WorkerError::InstallFailure {
                url: url.to_string(),
                reason: format!("status {}", response.status),
            });
        }
        debug!(url = %url, bytes = response.body.len(), "Fetched asset");
        Ok((request.cache_key(), response))
    }

    // ===== Activate =====

    /// Delete every bucket but this version's, then claim open pages.
    pub async fn activate(&self) -> Result<ActivateReport, WorkerError> {
        let _guard = self.lifecycle.lock().await;
        self.transition(WorkerState::Installed, WorkerState::Activating)?;
        info!(bucket = %self.bucket, "Activating");

        let deleted = match self.delete_stale_buckets() {
            Ok(deleted) => deleted,
            Err(e) => {
                // Stay waiting so activation can be retried
                warn!(bucket = %self.bucket, error = %e, "Activation failed");
                self.set_state(WorkerState::Installed);
                return Err(e);
            }
        };

        self.controlling.store(true, Ordering::SeqCst);
        self.set_state(WorkerState::Activated);
        info!(bucket = %self.bucket, deleted = deleted.len(), "Activated");

        Ok(ActivateReport {
            bucket: self.bucket.clone(),
            deleted,
        })
    }

    fn delete_stale_buckets(&self) -> Result<Vec<String>, WorkerError> {
        let mut deleted = Vec::new();
        for name in self.storage.bucket_names()? {
            if name == self.bucket {
                continue;
            }
            if self.storage.delete_bucket(&name)? {
                debug!(bucket = %name, "Deleted stale bucket");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    // ===== Fetch =====

    /// Answer an intercepted request.
    ///
    /// Handled requests always get a response: cache hit, network response,
    /// offline page for navigations, or a synthetic timeout.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if !self.state().can_intercept_fetch() {
            return FetchOutcome::Passthrough;
        }
        if !self.in_scope(&request.url) {
            debug!(url = %request.url, "Out of scope, passing through");
            return FetchOutcome::Passthrough;
        }
        FetchOutcome::Respond(self.respond(request).await)
    }

    /// Same-origin requests plus the allow-listed cross-origin hosts.
    fn in_scope(&self, url: &Url) -> bool {
        if url.origin() == self.settings.origin.origin() {
            return true;
        }
        url.host_str()
            .map(|host| {
                let host = host.to_ascii_lowercase();
                self.settings.cross_origin_hosts.iter().any(|h| *h == host)
            })
            .unwrap_or(false)
    }

    async fn respond(&self, request: &Request) -> Response {
        let key = request.cache_key();
        match self.storage.get(&self.bucket, &key) {
            Ok(Some(entry)) => {
                debug!(key = %key, "Cache hit");
                return entry.to_response();
            }
            Ok(None) => debug!(key = %key, "Cache miss"),
            Err(e) => warn!(key = %key, error = %e, "Cache lookup failed, going to network"),
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if self.should_store(request, &response) {
                    self.store(&key, &response);
                }
                response
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network request failed");
                self.fallback(request)
            }
        }
    }

    /// Best effort: a failed write still returns the response.
    ///
    /// A newer version may have activated while the request was in flight
    /// and deleted this bucket; the write must not bring it back.
    fn store(&self, key: &CacheKey, response: &Response) {
        if !self.state().can_intercept_fetch() {
            debug!(key = %key, state = %self.state(), "Superseded, not caching response");
            return;
        }
        match self.storage.put_existing(&self.bucket, key, response) {
            Ok(true) => {}
            Ok(false) => debug!(key = %key, bucket = %self.bucket, "Bucket deleted, not caching response"),
            Err(e) => warn!(key = %key, error = %e, "Failed to cache response"),
        }
    }

    fn should_store(&self, request: &Request, response: &Response) -> bool {
        let marker = &self.settings.api_marker;
        let is_api = !marker.is_empty() && request.url.as_str().contains(marker.as_str());
        request.method == Method::GET && !is_api && response.is_success()
    }

    fn fallback(&self, request: &Request) -> Response {
        if request.is_navigation() {
            let key = CacheKey::get(&self.settings.offline_page);
            match self.storage.get(&self.bucket, &key) {
                Ok(Some(entry)) => {
                    return entry
                        .response
                        .with_source(ResponseSource::OfflineFallback);
                }
                Ok(None) => warn!(key = %key, "Offline page not cached"),
                Err(e) => warn!(key = %key, error = %e, "Offline page lookup failed"),
            }
        }
        Response::timeout()
    }

    // ===== Message =====

    /// Handle a message posted by a page. Untrusted origins are ignored.
    pub async fn handle_message(&self, event: &MessageEvent) -> Result<MessageOutcome, WorkerError> {
        let trusted = event
            .parsed_origin()
            .map(|origin| self.settings.trusted_origins.contains(&origin))
            .unwrap_or(false);
        if !trusted {
            debug!(origin = %event.origin, "Ignoring message from untrusted origin");
            return Ok(MessageOutcome::Untrusted);
        }

        match ClientMessage::parse(&event.data) {
            Some(ClientMessage::SkipWaiting) => {
                self.skip_waiting();
                let activated = if self.state().is_waiting() {
                    self.activate().await?;
                    true
                } else {
                    false
                };
                info!(bucket = %self.bucket, activated, "Skip waiting requested");
                Ok(MessageOutcome::SkipWaiting { activated })
            }
            None => {
                debug!(origin = %event.origin, "Ignoring unrecognized message");
                Ok(MessageOutcome::Unrecognized)
            }
        }
    }

    // ===== Sync =====

    /// Handle a background sync event.
    pub async fn handle_sync(&self, tag: &str) -> Result<SyncOutcome, WorkerError> {
        if tag != SYNC_REPORTS_TAG {
            debug!(tag, "Ignoring sync tag");
            return Ok(SyncOutcome::Ignored);
        }
        let reports = self.reports.as_ref().ok_or(WorkerError::SyncUnavailable)?;
        let summary = reports.drain().await?;
        info!(
            delivered = summary.delivered,
            retained = summary.retained,
            rejected = summary.rejected,
            abandoned = summary.abandoned,
            "Report sync finished"
        );
        Ok(SyncOutcome::Drained(summary))
    }

    // ===== Inspection =====

    pub fn cached_entries(&self) -> Result<Vec<CachedEntry>, WorkerError> {
        Ok(self.storage.entries(&self.bucket)?)
    }
}

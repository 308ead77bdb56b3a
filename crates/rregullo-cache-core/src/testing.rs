//! Scripted network and storage doubles for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use url::Url;

use crate::cache::{CacheStorage, CachedEntry, MemoryCacheStorage};
use crate::http::{CacheKey, Request, Response};
use crate::net::{FetchError, Fetcher};
use crate::sync::{PendingReport, ReportSubmitter, SubmitError, SubmitReceipt};

/// Answers requests from a fixed URL → response table.
///
/// Unknown URLs, and every URL while offline, fail as unreachable.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: HashMap<String, Response>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn respond(mut self, url: Url, response: Response) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable(request.url.to_string()));
        }
        self.responses
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Unreachable(request.url.to_string()))
    }
}

/// Holds requests for one URL until released, so a test can interleave
/// other lifecycle events with a fetch that is in flight.
pub struct GatedFetcher {
    inner: ScriptedFetcher,
    gated: String,
    started: Notify,
    gate: Semaphore,
}

impl GatedFetcher {
    pub fn new(inner: ScriptedFetcher, gated: Url) -> Self {
        Self {
            inner,
            gated: gated.to_string(),
            started: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Resolves once a request for the gated URL is waiting.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        if request.url.as_str() == self.gated {
            self.started.notify_one();
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
        self.inner.fetch(request).await
    }
}

/// In-memory buckets whose listing can be made to fail.
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryCacheStorage,
    fail_listing: AtomicBool,
}

impl FlakyStorage {
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }
}

impl CacheStorage for FlakyStorage {
    fn open(&self, bucket: &str) -> Result<()> {
        self.inner.open(bucket)
    }

    fn has(&self, bucket: &str) -> Result<bool> {
        self.inner.has(bucket)
    }

    fn bucket_names(&self) -> Result<Vec<String>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            bail!("disk busy");
        }
        self.inner.bucket_names()
    }

    fn delete_bucket(&self, bucket: &str) -> Result<bool> {
        self.inner.delete_bucket(bucket)
    }

    fn get(&self, bucket: &str, key: &CacheKey) -> Result<Option<CachedEntry>> {
        self.inner.get(bucket, key)
    }

    fn put(&self, bucket: &str, key: &CacheKey, response: &Response) -> Result<()> {
        self.inner.put(bucket, key, response)
    }

    fn put_existing(&self, bucket: &str, key: &CacheKey, response: &Response) -> Result<bool> {
        self.inner.put_existing(bucket, key, response)
    }

    fn entries(&self, bucket: &str) -> Result<Vec<CachedEntry>> {
        self.inner.entries(bucket)
    }
}

type FailureFn = Arc<dyn Fn() -> SubmitError + Send + Sync>;

/// Accepts every report except the ones scripted to fail.
#[derive(Default)]
pub struct ScriptedSubmitter {
    failures: HashMap<String, FailureFn>,
    submitted: Mutex<Vec<String>>,
}

impl ScriptedSubmitter {
    pub fn fail(
        mut self,
        id: &str,
        error: impl Fn() -> SubmitError + Send + Sync + 'static,
    ) -> Self {
        self.failures.insert(id.to_string(), Arc::new(error));
        self
    }

    /// Ids of every report submitted, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl ReportSubmitter for ScriptedSubmitter {
    async fn submit(&self, report: &PendingReport) -> Result<SubmitReceipt, SubmitError> {
        self.submitted.lock().push(report.id.clone());
        match self.failures.get(&report.id) {
            Some(error) => Err(error()),
            None => Ok(SubmitReceipt {
                id: Some(format!("srv-{}", report.id)),
            }),
        }
    }
}

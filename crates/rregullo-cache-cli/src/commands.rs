//! Command handlers.
//!
//! Each run rebuilds the registration from the saved record, applies one
//! lifecycle event and saves the record again.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Method;
use rregullo_cache_core::cache::CacheStorage;
use rregullo_cache_core::net::Fetcher;
use rregullo_cache_core::{
    Config, DiskCacheStorage, FetchOutcome, HttpFetcher, HttpReportSubmitter, MessageEvent,
    OfflineCacheWorker, PendingReport, RegisterOutcome, Registration, RegistrationRecord,
    ReportQueue, ReportSync, Request, RequestMode, Response, SyncOutcome, WorkerSettings,
    WorkerState,
};
use tracing::{debug, info};
use url::Url;

use crate::cli::{Command, ReportCommand};

/// Everything a command needs, built once from the config.
pub struct Host {
    config: Config,
    settings: WorkerSettings,
    cache_dir: PathBuf,
    storage: Arc<DiskCacheStorage>,
    fetcher: Arc<HttpFetcher>,
    reports: Arc<ReportSync>,
}

impl Host {
    pub fn new(config: Config) -> Result<Self> {
        let settings = config.worker_settings()?;
        let cache_dir = config.cache_dir()?;
        let storage = Arc::new(DiskCacheStorage::new(cache_dir.clone())?);
        let fetcher = Arc::new(HttpFetcher::new(config.request_timeout())?);

        let submitter = HttpReportSubmitter::new(fetcher.client().clone(), settings.report_endpoint.clone());
        let queue = ReportQueue::open(cache_dir.clone())?;
        let reports = Arc::new(ReportSync::new(queue, Arc::new(submitter), settings.max_sync_attempts));

        Ok(Self {
            config,
            settings,
            cache_dir,
            storage,
            fetcher,
            reports,
        })
    }

    /// A worker for the configured manifest.
    fn new_worker(&self) -> OfflineCacheWorker {
        OfflineCacheWorker::new(
            self.settings.clone(),
            self.config.manifest(),
            self.storage.clone(),
            self.fetcher.clone(),
        )
        .with_report_sync(self.reports.clone())
    }

    /// A worker for a bucket installed by an earlier run.
    fn restored_worker(&self, bucket: &str, state: WorkerState) -> Arc<OfflineCacheWorker> {
        Arc::new(self.new_worker().with_bucket(bucket).resume(state))
    }

    fn load_registration(&self) -> Result<Registration> {
        let record = RegistrationRecord::load(&self.cache_dir)?;
        let mut registration = Registration::new();
        if let Some(ref bucket) = record.active {
            registration = registration.with_active(self.restored_worker(bucket, WorkerState::Activated));
        }
        if let Some(ref bucket) = record.waiting {
            registration = registration.with_waiting(self.restored_worker(bucket, WorkerState::Installed));
        }
        debug!(active = ?record.active, waiting = ?record.waiting, "Loaded registration");
        Ok(registration)
    }

    fn save_registration(&self, registration: &Registration) -> Result<()> {
        registration
            .record()
            .save(&self.cache_dir)
            .context("Failed to save registration")
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Install => self.install().await,
            Command::Activate => self.activate().await,
            Command::Message { origin, data } => self.message(origin, &data).await,
            Command::Fetch { url, navigate, method } => self.fetch(&url, navigate, &method).await,
            Command::Sync { tag } => self.sync(&tag).await,
            Command::Status => self.status().await,
            Command::Report(ReportCommand::Add {
                title,
                description,
                category,
                lat,
                lon,
                address,
            }) => {
                let mut report = PendingReport::new(title, description, category);
                if let (Some(lat), Some(lon)) = (lat, lon) {
                    report = report.with_location(lat, lon);
                }
                if let Some(address) = address {
                    report = report.with_address(address);
                }
                let id = report.id.clone();
                self.reports.enqueue(report).await?;
                println!("Queued report {}", id);
                Ok(())
            }
            Command::Report(ReportCommand::List) => {
                let pending = self.reports.pending().await;
                if pending.is_empty() {
                    println!("No pending reports");
                }
                for report in pending {
                    println!(
                        "{}  [{}] {}  attempts={}{}",
                        report.id,
                        report.category,
                        report.title,
                        report.attempts,
                        report
                            .last_error
                            .as_deref()
                            .map(|e| format!("  last error: {}", e))
                            .unwrap_or_default()
                    );
                }
                Ok(())
            }
        }
    }

    async fn install(&self) -> Result<()> {
        let mut registration = self.load_registration()?;
        let worker = Arc::new(self.new_worker());

        // Same manifest as the running version: nothing to update
        if registration.active().map(|w| w.bucket()) == Some(worker.bucket()) {
            println!("Version {} is already active", worker.bucket());
            return Ok(());
        }

        let outcome = registration.register(worker).await?;
        self.save_registration(&registration)?;

        match outcome {
            RegisterOutcome::Activated { install, activate } => {
                println!("Installed {} ({} assets)", install.bucket, install.cached);
                println!("Activated {}", activate.bucket);
                for bucket in activate.deleted {
                    println!("  deleted {}", bucket);
                }
            }
            RegisterOutcome::Waiting(install) => {
                println!("Installed {} ({} assets)", install.bucket, install.cached);
                println!("Waiting for open pages to close; run `activate` or send SKIP_WAITING");
            }
        }
        Ok(())
    }

    async fn activate(&self) -> Result<()> {
        let mut registration = self.load_registration()?;
        match registration.release_clients().await? {
            Some(report) => {
                self.save_registration(&registration)?;
                println!("Activated {}", report.bucket);
                for bucket in report.deleted {
                    println!("  deleted {}", bucket);
                }
            }
            None => println!("No waiting version"),
        }
        Ok(())
    }

    async fn message(&self, origin: String, data: &str) -> Result<()> {
        let data = serde_json::from_str(data).context("Message data is not valid JSON")?;
        let mut registration = self.load_registration()?;
        let outcome = registration.handle_message(&MessageEvent::new(origin, data)).await?;
        self.save_registration(&registration)?;
        println!("{:?}", outcome);
        Ok(())
    }

    async fn fetch(&self, url: &str, navigate: bool, method: &str) -> Result<()> {
        let url = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("Invalid method: {}", method))?;
        let mut request = Request::new(method, url);
        if navigate {
            request = request.with_mode(RequestMode::Navigate);
        }

        let registration = self.load_registration()?;
        let response = match registration.handle_fetch(&request).await {
            FetchOutcome::Respond(response) => response,
            FetchOutcome::Passthrough => {
                info!(url = %request.url, "Not handled by the cache, fetching directly");
                self.fetcher.fetch(&request).await?
            }
        };
        print_response(&response);
        Ok(())
    }

    async fn sync(&self, tag: &str) -> Result<()> {
        let registration = self.load_registration()?;
        match registration.handle_sync(tag).await? {
            SyncOutcome::Ignored => println!("Sync tag {} not handled", tag),
            SyncOutcome::Drained(summary) => {
                println!(
                    "Delivered {}, still pending {}, rejected {}, abandoned {}",
                    summary.delivered, summary.retained, summary.rejected, summary.abandoned
                );
                if summary.needs_retry() {
                    println!("Run sync again once the network is back");
                }
            }
        }
        Ok(())
    }

    async fn status(&self) -> Result<()> {
        let record = RegistrationRecord::load(&self.cache_dir)?;
        println!("Origin:  {}", self.settings.origin);
        println!("Active:  {}", record.active.as_deref().unwrap_or("-"));
        println!("Waiting: {}", record.waiting.as_deref().unwrap_or("-"));
        println!("Updated: {}", record.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));

        println!("Buckets:");
        for bucket in self.storage.bucket_names()? {
            let entries = self.storage.entries(&bucket)?;
            let newest = entries
                .iter()
                .min_by_key(|e| e.age_minutes())
                .map(|e| e.age_display())
                .unwrap_or_else(|| "-".to_string());
            println!("  {}  {} entries, newest {}", bucket, entries.len(), newest);
        }

        println!("Pending reports: {}", self.reports.pending().await.len());
        Ok(())
    }
}

fn print_response(response: &Response) {
    eprintln!("{} {} ({:?})", response.status, response.status_text, response.source);
    for (name, value) in &response.headers {
        eprintln!("{}: {}", name, value);
    }
    println!("{}", String::from_utf8_lossy(&response.body));
}

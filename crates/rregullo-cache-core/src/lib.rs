//! Core library for the Rregullo Tiranen offline asset cache.
//!
//! This crate provides the cache manager that keeps the application shell
//! available offline: versioned cache buckets filled from an asset
//! manifest, a cache-first fetch strategy with network fallback, the
//! install/activate lifecycle with trusted skip-waiting, and background
//! delivery of issue reports queued while offline.
//!
//! Hosts plug in the network (`net::Fetcher`) and the bucket store
//! (`cache::CacheStorage`); the CLI wires them to reqwest and the disk.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod manifest;
pub mod net;
pub mod sync;
pub mod utils;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export commonly used types at crate root
pub use cache::{CacheStorage, CachedEntry, DiskCacheStorage, MemoryCacheStorage};
pub use config::{Config, WorkerSettings};
pub use error::WorkerError;
pub use http::{CacheKey, Request, RequestMode, Response, ResponseSource};
pub use manifest::AssetManifest;
pub use net::{FetchError, Fetcher, HttpFetcher};
pub use sync::{HttpReportSubmitter, PendingReport, ReportQueue, ReportSync, SyncSummary, SYNC_REPORTS_TAG};
pub use worker::{
    ActivateReport, FetchOutcome, InstallReport, MessageEvent, MessageOutcome, OfflineCacheWorker,
    RegisterOutcome, Registration, RegistrationRecord, SyncOutcome, WorkerState,
};

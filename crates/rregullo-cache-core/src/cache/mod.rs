//! Cache buckets for offline access.
//!
//! A bucket maps a request key (method + URL) to a captured response. The
//! cache manager only ever writes to the bucket named after the current
//! version; older buckets are deleted on activation.
//!
//! Two backends implement `CacheStorage`:
//! - `MemoryCacheStorage`: process memory, used in tests and embedded hosts
//! - `DiskCacheStorage`: one JSON file per entry under the cache directory

pub mod disk;
pub mod entry;
pub mod storage;

pub use disk::DiskCacheStorage;
pub use entry::CachedEntry;
pub use storage::{CacheStorage, MemoryCacheStorage};

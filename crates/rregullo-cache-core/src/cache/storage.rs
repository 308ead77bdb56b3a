use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use parking_lot::RwLock;

use crate::http::{CacheKey, Response};

use super::CachedEntry;

/// Named cache buckets holding captured responses.
///
/// Readers and writers may run concurrently. Writes to the same key are
/// last-write-wins; there is no transaction across keys.
pub trait CacheStorage: Send + Sync {
    /// Create the bucket if it does not exist yet.
    fn open(&self, bucket: &str) -> Result<()>;

    fn has(&self, bucket: &str) -> Result<bool>;

    /// Names of every existing bucket, sorted.
    fn bucket_names(&self) -> Result<Vec<String>>;

    /// Remove a bucket and all of its entries. Returns false if it did not exist.
    fn delete_bucket(&self, bucket: &str) -> Result<bool>;

    fn get(&self, bucket: &str, key: &CacheKey) -> Result<Option<CachedEntry>>;

    /// Store a response, creating the bucket if needed.
    fn put(&self, bucket: &str, key: &CacheKey, response: &Response) -> Result<()>;

    /// Store a response only if the bucket still exists. Returns false, and
    /// writes nothing, if it was deleted.
    fn put_existing(&self, bucket: &str, key: &CacheKey, response: &Response) -> Result<bool>;

    /// Every entry in a bucket, sorted by key. Empty if the bucket is missing.
    fn entries(&self, bucket: &str) -> Result<Vec<CachedEntry>>;

    fn put_all(&self, bucket: &str, entries: &[(CacheKey, Response)]) -> Result<()> {
        for (key, response) in entries {
            self.put(bucket, key, response)?;
        }
        Ok(())
    }
}

/// Buckets kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    buckets: RwLock<HashMap<String, BTreeMap<CacheKey, CachedEntry>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn open(&self, bucket: &str) -> Result<()> {
        self.buckets.write().entry(bucket.to_string()).or_default();
        Ok(())
    }

    fn has(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.read().contains_key(bucket))
    }

    fn bucket_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.buckets.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn delete_bucket(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.write().remove(bucket).is_some())
    }

    fn get(&self, bucket: &str, key: &CacheKey) -> Result<Option<CachedEntry>> {
        Ok(self
            .buckets
            .read()
            .get(bucket)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn put(&self, bucket: &str, key: &CacheKey, response: &Response) -> Result<()> {
        let entry = CachedEntry::new(key.clone(), response.clone());
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.clone(), entry);
        Ok(())
    }

    fn put_existing(&self, bucket: &str, key: &CacheKey, response: &Response) -> Result<bool> {
        let mut buckets = self.buckets.write();
        let Some(entries) = buckets.get_mut(bucket) else {
            return Ok(false);
        };
        entries.insert(key.clone(), CachedEntry::new(key.clone(), response.clone()));
        Ok(true)
    }

    fn entries(&self, bucket: &str) -> Result<Vec<CachedEntry>> {
        Ok(self
            .buckets
            .read()
            .get(bucket)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }
}

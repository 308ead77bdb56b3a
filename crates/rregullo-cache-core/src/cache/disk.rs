use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::http::{CacheKey, Response};
use crate::utils::write_atomic;

use super::{CacheStorage, CachedEntry};

/// Directory under the cache root that holds one directory per bucket.
const BUCKETS_DIR: &str = "buckets";

/// Buckets persisted under a cache directory.
///
/// Layout: `<cache_dir>/buckets/<bucket>/<sha256(key)>.json`. Entries are
/// written to a temp file and renamed into place, so concurrent writers to
/// the same key never leave a torn file behind.
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        let root = cache_dir.join(BUCKETS_DIR);
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache directory: {}", root.display()))?;
        Ok(Self { root })
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        validate_bucket_name(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn entry_path(&self, bucket: &str, key: &CacheKey) -> Result<PathBuf> {
        Ok(self
            .bucket_path(bucket)?
            .join(format!("{}.json", entry_file_stem(key))))
    }

    /// Write one entry into an existing bucket directory.
    fn write_entry(&self, bucket: &str, key: &CacheKey, response: &Response) -> Result<()> {
        let path = self.entry_path(bucket, key)?;
        let entry = CachedEntry::new(key.clone(), response.clone());
        let contents = serde_json::to_string_pretty(&entry)?;
        write_atomic(&path, contents)
            .with_context(|| format!("Failed to store cache entry in {}", bucket))?;
        debug!(bucket, key = %key, "Stored cache entry");
        Ok(())
    }

    fn load(path: &Path) -> Result<CachedEntry> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache entry: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache entry: {}", path.display()))
    }
}

impl CacheStorage for DiskCacheStorage {
    fn open(&self, bucket: &str) -> Result<()> {
        let path = self.bucket_path(bucket)?;
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create bucket: {}", bucket))?;
        Ok(())
    }

    fn has(&self, bucket: &str) -> Result<bool> {
        Ok(self.bucket_path(bucket)?.is_dir())
    }

    fn bucket_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for dir_entry in std::fs::read_dir(&self.root).context("Failed to list buckets")? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = dir_entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete_bucket(&self, bucket: &str) -> Result<bool> {
        let path = self.bucket_path(bucket)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&path)
            .with_context(|| format!("Failed to delete bucket: {}", bucket))?;
        Ok(true)
    }

    fn get(&self, bucket: &str, key: &CacheKey) -> Result<Option<CachedEntry>> {
        let path = self.entry_path(bucket, key)?;
        if !path.exists() {
            return Ok(None);
        }
        let entry = Self::load(&path)?;
        // Different keys sharing a file name would need a sha256 collision,
        // but never serve the wrong entry.
        if entry.key != *key {
            warn!(bucket, key = %key, stored = %entry.key, "Cache entry key mismatch");
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn put(&self, bucket: &str, key: &CacheKey, response: &Response) -> Result<()> {
        self.open(bucket)?;
        self.write_entry(bucket, key, response)
    }

    fn put_existing(&self, bucket: &str, key: &CacheKey, response: &Response) -> Result<bool> {
        if !self.has(bucket)? {
            return Ok(false);
        }
        // The bucket may vanish between the check and the write; the write
        // then fails instead of recreating it
        match self.write_entry(bucket, key, response) {
            Ok(()) => Ok(true),
            Err(_) if !self.has(bucket)? => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn entries(&self, bucket: &str) -> Result<Vec<CachedEntry>> {
        let path = self.bucket_path(bucket)?;
        if !path.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for dir_entry in std::fs::read_dir(&path)? {
            let file = dir_entry?.path();
            if file.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load(&file) {
                Ok(entry) => entries.push(entry),
                Err(e) => debug!(file = %file.display(), error = %e, "Skipping unreadable cache entry"),
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

/// Bucket names become directory names, so keep them to a safe alphabet.
fn validate_bucket_name(bucket: &str) -> Result<()> {
    let valid = !bucket.is_empty()
        && !bucket.starts_with('.')
        && bucket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        bail!("Invalid bucket name: {:?}", bucket);
    }
    Ok(())
}

fn entry_file_stem(key: &CacheKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

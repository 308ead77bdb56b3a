//! The Asset Manifest: the fixed shell of pages, styles and scripts that
//! must be cached before a worker version may take over.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::WorkerError;

/// Number of hex characters of the manifest hash used in bucket names.
const BUCKET_HASH_LEN: usize = 12;

/// Shell assets of the Rregullo Tiranen site.
pub const DEFAULT_ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/report.html",
    "/map.html",
    "/offline.html",
    "/css/style.css",
    "/js/app.js",
    "/js/report.js",
    "/js/map.js",
    "/manifest.json",
    "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
];

/// Ordered list of asset URLs. Entries are either paths relative to the
/// site origin or absolute URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest {
    entries: Vec<String>,
}

impl AssetManifest {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every entry against the site origin, keeping manifest order.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>, WorkerError> {
        self.entries
            .iter()
            .map(|entry| {
                origin
                    .join(entry)
                    .map_err(|e| WorkerError::InvalidAsset {
                        asset: entry.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }

    /// Hex SHA-256 over the entries, one per line.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(entry.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    /// Bucket name derived from the manifest content, so any manifest change
    /// rolls the version without a manual bump.
    pub fn bucket_name(&self, prefix: &str) -> String {
        let hash = self.content_hash();
        format!("{}-{}", prefix, &hash[..BUCKET_HASH_LEN])
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::new(DEFAULT_ASSETS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_keeps_order_and_absolute_urls() {
        let manifest = AssetManifest::new(["/a.html", "/b.css", "https://cdn.example.net/x.js"]);
        let origin = Url::parse("https://rregullo.example/").unwrap();
        let urls: Vec<String> = manifest
            .resolve(&origin)
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://rregullo.example/a.html",
                "https://rregullo.example/b.css",
                "https://cdn.example.net/x.js",
            ]
        );
    }

    #[test]
    fn test_resolve_rejects_unparseable_entry() {
        let manifest = AssetManifest::new(["http://[not-a-host/"]);
        let origin = Url::parse("https://rregullo.example/").unwrap();
        assert!(matches!(
            manifest.resolve(&origin),
            Err(WorkerError::InvalidAsset { .. })
        ));
    }

    #[test]
    fn test_bucket_name_is_stable() {
        let a = AssetManifest::new(["/a.html", "/b.css"]);
        let b = AssetManifest::new(["/a.html", "/b.css"]);
        assert_eq!(a.bucket_name("rregullo-tiranen"), b.bucket_name("rregullo-tiranen"));

        let name = a.bucket_name("rregullo-tiranen");
        assert!(name.starts_with("rregullo-tiranen-"));
        assert_eq!(name.len(), "rregullo-tiranen-".len() + BUCKET_HASH_LEN);
    }

    #[test]
    fn test_bucket_name_changes_with_manifest() {
        let a = AssetManifest::new(["/a.html", "/b.css"]);
        let reordered = AssetManifest::new(["/b.css", "/a.html"]);
        let extended = AssetManifest::new(["/a.html", "/b.css", "/c.js"]);
        assert_ne!(a.bucket_name("v"), reordered.bucket_name("v"));
        assert_ne!(a.bucket_name("v"), extended.bucket_name("v"));
    }

    #[test]
    fn test_default_manifest_has_offline_page_and_cdn_assets() {
        let manifest = AssetManifest::default();
        assert!(manifest.entries().iter().any(|e| e == "/offline.html"));
        assert_eq!(
            manifest
                .entries()
                .iter()
                .filter(|e| e.starts_with("https://"))
                .count(),
            2
        );
    }
}

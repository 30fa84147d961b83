use std::path::Path;
use std::sync::Arc;

use sha1::{Digest, Sha1};
use tracing::{debug, error, info, warn};

use crate::core::cache::ArtifactCache;
use crate::core::error::{PackError, PackResult};
use crate::core::http::{Headers, Transport};
use crate::core::registry::ArtifactRef;

/// Sequential, cache-aware, SHA-1 validated downloader.
///
/// Transfers always target the output directory; the cache is seeded from
/// the finished file afterwards and never written to directly.
pub struct Downloader {
    transport: Arc<dyn Transport>,
    cache: ArtifactCache,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>, cache: ArtifactCache) -> Self {
        Self { transport, cache }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    // ── Single artifact fetch ───────────────────────────

    /// Materialize `file` inside `output_dir`.
    ///
    /// Order of preference when `force` is false: cache copy, then a file
    /// already present in `output_dir`, then the network. Never returns an
    /// error; every failure is logged and reported as `false`.
    pub async fn fetch(
        &self,
        file: &ArtifactRef,
        headers: &Headers,
        output_dir: &Path,
        force: bool,
    ) -> bool {
        let filename = file.filename.as_str();

        if !force && self.cache_usable(filename, file.sha1.as_deref()).await {
            match self.cache.copy_in(filename, output_dir) {
                Ok(_) => {
                    info!("Using cached version of {}", filename);
                    return true;
                }
                Err(e) => warn!("Cache copy failed for {}: {}", filename, e),
            }
        }

        let dest = output_dir.join(filename);
        if !force && dest.is_file() {
            info!("{} already exists in {:?}, skipping", filename, output_dir);
            self.seed_cache(&dest, filename);
            return true;
        }

        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            error!("Cannot create {:?}: {}", output_dir, e);
            return false;
        }

        info!("Downloading {} from {}", filename, file.source_url);
        match self.transfer(file, headers, &dest).await {
            Ok(bytes) => {
                debug!("Wrote {} bytes to {:?}", bytes, dest);
                self.seed_cache(&dest, filename);
                true
            }
            Err(e) => {
                warn!("Download of {} from {} failed: {}", filename, file.source_url, e);
                if dest.exists() {
                    let _ = tokio::fs::remove_file(&dest).await;
                }
                false
            }
        }
    }

    /// Fetch `filename` from the first mirror that works, after consulting
    /// the cache once.
    pub async fn fetch_from_mirrors(
        &self,
        filename: &str,
        urls: &[String],
        sha1: Option<&str>,
        output_dir: &Path,
    ) -> bool {
        if self.copy_from_cache(filename, sha1, output_dir).await {
            return true;
        }

        for url in urls {
            let file = ArtifactRef {
                filename: filename.to_string(),
                source_url: url.clone(),
                registry_id: String::new(),
                size: None,
                sha1: sha1.map(str::to_string),
            };
            if self.fetch(&file, &Headers::new(), output_dir, false).await {
                return true;
            }
        }

        warn!("All {} mirror(s) failed for {}", urls.len(), filename);
        false
    }

    async fn transfer(&self, file: &ArtifactRef, headers: &Headers, dest: &Path) -> PackResult<u64> {
        let bytes = self.transport.download(&file.source_url, headers, dest).await?;

        if let Some(expected) = file.sha1.as_deref() {
            let actual = Self::sha1_of(dest).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(PackError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        Ok(bytes)
    }

    /// Copy `filename` out of the cache when a usable entry exists.
    pub async fn copy_from_cache(
        &self,
        filename: &str,
        sha1: Option<&str>,
        output_dir: &Path,
    ) -> bool {
        if !self.cache_usable(filename, sha1).await {
            return false;
        }
        match self.cache.copy_in(filename, output_dir) {
            Ok(_) => {
                info!("Using cached version of {}", filename);
                true
            }
            Err(e) => {
                warn!("Cache copy failed for {}: {}", filename, e);
                false
            }
        }
    }

    /// Whether the cache entry for `filename` may stand in for a download.
    ///
    /// Entries are keyed by filename alone, so when the registry publishes a
    /// SHA-1 the entry must match it. A mismatching entry is evicted and the
    /// caller falls through to the network.
    async fn cache_usable(&self, filename: &str, sha1: Option<&str>) -> bool {
        if !self.cache.has(filename) {
            return false;
        }
        let Some(expected) = sha1 else { return true };

        match Self::sha1_of(&self.cache.path_for(filename)).await {
            Ok(actual) if actual.eq_ignore_ascii_case(expected) => true,
            Ok(actual) => {
                warn!(
                    "Cached {} has SHA-1 {}, expected {}; refetching",
                    filename, actual, expected
                );
                if let Err(e) = self.cache.evict(filename) {
                    warn!("Could not evict {}: {}", filename, e);
                }
                false
            }
            Err(e) => {
                warn!("Cannot hash cached {}: {}", filename, e);
                false
            }
        }
    }

    fn seed_cache(&self, src: &Path, filename: &str) {
        if let Err(e) = self.cache.copy_out(src, filename) {
            warn!("Could not cache {}: {}", filename, e);
        }
    }

    /// Hex SHA-1 of a file on disk.
    pub async fn sha1_of(path: &Path) -> PackResult<String> {
        let bytes = tokio::fs::read(path).await.map_err(PackError::io_at(path))?;
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

//! Local artifact cache.
//!
//! A flat directory of previously fetched files keyed by filename only.
//! Two registries publishing the same filename share one entry; the
//! downloader checks entries against a published SHA-1 before reuse.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{PackError, PackResult};

/// Suffix used while a cache entry is being written.
const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

/// Aggregate numbers about the cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub mod_count: usize,
    pub bundle_count: usize,
    pub total_bytes: u64,
}

impl ArtifactCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    pub fn has(&self, filename: &str) -> bool {
        self.path_for(filename).is_file()
    }

    /// Copy a cached file into `dest_dir`, returning the destination path.
    pub fn copy_in(&self, filename: &str, dest_dir: &Path) -> PackResult<PathBuf> {
        let src = self.path_for(filename);
        let dest = dest_dir.join(filename);

        // The client-only flow downloads straight into the cache directory.
        if same_file(&src, &dest) {
            return Ok(dest);
        }

        fs::create_dir_all(dest_dir).map_err(PackError::io_at(dest_dir))?;
        fs::copy(&src, &dest).map_err(PackError::io_at(&src))?;
        debug!("Cache hit: {} -> {:?}", filename, dest_dir);
        Ok(dest)
    }

    /// Seed the cache from a completed file. Existing entries are kept.
    ///
    /// The copy lands under a temporary name first and is renamed into
    /// place, so an interrupted copy never shows up as a cache hit.
    pub fn copy_out(&self, src: &Path, filename: &str) -> PackResult<bool> {
        let dest = self.path_for(filename);
        if dest.exists() || !src.is_file() {
            return Ok(false);
        }

        fs::create_dir_all(&self.root).map_err(PackError::io_at(&self.root))?;
        let partial = self.root.join(format!("{filename}{PARTIAL_SUFFIX}"));
        if let Err(e) = fs::copy(src, &partial) {
            let _ = fs::remove_file(&partial);
            return Err(PackError::Io {
                path: partial,
                source: e,
            });
        }
        fs::rename(&partial, &dest).map_err(PackError::io_at(&dest))?;
        debug!("Cached {}", filename);
        Ok(true)
    }

    /// Drop the entry for `filename` if present.
    pub fn evict(&self, filename: &str) -> PackResult<()> {
        let path = self.path_for(filename);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Evicted {}", filename);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PackError::Io { path, source: e }),
        }
    }

    /// Move `src` into the cache: seed the entry if missing, then delete `src`.
    pub fn absorb(&self, src: &Path) -> PackResult<()> {
        let Some(filename) = src.file_name().and_then(|n| n.to_str()) else {
            return Err(PackError::Other(format!("Not a file path: {src:?}")));
        };
        if !same_file(src, &self.path_for(filename)) {
            self.copy_out(src, filename)?;
            fs::remove_file(src).map_err(PackError::io_at(src))?;
        }
        Ok(())
    }

    pub fn stats(&self) -> PackResult<CacheStats> {
        let mut stats = CacheStats::default();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => {
                return Err(PackError::Io {
                    path: self.root.clone(),
                    source: e,
                })
            }
        };

        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            stats.total_bytes += meta.len();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".jar") {
                stats.mod_count += 1;
            } else if name.ends_with(".mrpack") {
                stats.bundle_count += 1;
            }
        }
        Ok(stats)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_out_seeds_once_and_keeps_existing_entry() {
        let cache_dir = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(cache_dir.path().to_path_buf());

        let src = work.path().join("lithium-0.16.2.jar");
        fs::write(&src, b"first").unwrap();
        assert!(cache.copy_out(&src, "lithium-0.16.2.jar").unwrap());

        fs::write(&src, b"second").unwrap();
        assert!(!cache.copy_out(&src, "lithium-0.16.2.jar").unwrap());
        assert_eq!(fs::read(cache.path_for("lithium-0.16.2.jar")).unwrap(), b"first");
        assert!(!cache_dir.path().join("lithium-0.16.2.jar.partial").exists());
    }

    #[test]
    fn copy_in_into_cache_root_does_not_truncate() {
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(cache_dir.path().to_path_buf());
        fs::write(cache.path_for("zoomify-2.14.jar"), b"payload").unwrap();

        cache.copy_in("zoomify-2.14.jar", cache_dir.path()).unwrap();
        assert_eq!(fs::read(cache.path_for("zoomify-2.14.jar")).unwrap(), b"payload");
    }

    #[test]
    fn absorb_moves_bundle_into_cache() {
        let cache_dir = tempfile::tempdir().unwrap();
        let mods = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(cache_dir.path().to_path_buf());
        let bundle = mods.path().join("pack.mrpack");
        fs::write(&bundle, b"zip").unwrap();

        cache.absorb(&bundle).unwrap();
        assert!(!bundle.exists());
        assert!(cache.has("pack.mrpack"));

        let stats = cache.stats().unwrap();
        assert_eq!(stats.bundle_count, 1);
        assert_eq!(stats.mod_count, 0);
        assert_eq!(stats.total_bytes, 3);
    }
}

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::manifest::{BundleEntry, BundleManifest, Side, Support, MANIFEST_PATH};
use crate::core::downloader::Downloader;
use crate::core::error::{PackError, PackResult};
use crate::core::version::should_replace;

/// Overrides roots applied for each side, in order.
fn override_roots(side: Side) -> &'static [&'static str] {
    match side {
        Side::Server => &["overrides", "server-overrides"],
        Side::Client => &["overrides"],
    }
}

/// Counters from one bundle run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingResult {
    pub name: String,
    /// Mod entries present in the target after the run (fetched or already there).
    pub installed_count: usize,
    /// Entries not installed for this side or without download URLs.
    pub skipped_count: usize,
    /// Override files written.
    pub overrides_applied: usize,
    /// Filenames that could not be fetched from any source.
    pub failed: Vec<String>,
}

/// Installs the contents of `.mrpack` bundles.
pub struct BundleProcessor {
    downloader: Arc<Downloader>,
}

impl BundleProcessor {
    pub fn new(downloader: Arc<Downloader>) -> Self {
        Self { downloader }
    }

    /// Install `bundle` for `side`: mods into `target_dir`, overrides under
    /// `overrides_root`. The bundle is then moved into the cache.
    ///
    /// Only an unreadable archive or manifest is an error; individual
    /// entries that fail are logged and listed in the result.
    pub async fn process(
        &self,
        bundle: &Path,
        target_dir: &Path,
        overrides_root: &Path,
        side: Side,
    ) -> PackResult<ProcessingResult> {
        info!("Processing bundle {:?} for {}", bundle, side);
        let manifest = read_manifest(bundle)?;
        log_manifest(&manifest);

        let mut result = ProcessingResult {
            name: manifest.display_name().to_string(),
            ..Default::default()
        };

        fs::create_dir_all(target_dir).map_err(PackError::io_at(target_dir))?;

        for entry in manifest.mod_entries() {
            if *entry.support_for(side) == Support::Unsupported {
                debug!("Skipping {} (unsupported on {})", entry.path, side);
                result.skipped_count += 1;
                continue;
            }
            self.install_entry(entry, target_dir, &mut result).await;
        }

        result.overrides_applied = apply_overrides(bundle, override_roots(side), overrides_root);

        if let Err(e) = self.downloader.cache().absorb(bundle) {
            warn!("Could not move {:?} into the cache: {}", bundle, e);
        }

        info!(
            "Bundle {} done: {} installed, {} skipped, {} override file(s), {} failed",
            result.name,
            result.installed_count,
            result.skipped_count,
            result.overrides_applied,
            result.failed.len()
        );
        Ok(result)
    }

    async fn install_entry(
        &self,
        entry: &BundleEntry,
        target_dir: &Path,
        result: &mut ProcessingResult,
    ) {
        let filename = entry.filename();

        if entry.downloads.is_empty() {
            warn!("No download URLs for {}", filename);
            result.skipped_count += 1;
            return;
        }

        let dest = target_dir.join(filename);
        if dest.exists() {
            if !should_replace(filename, &dest) {
                debug!("{} already present, skipping", filename);
                result.installed_count += 1;
                return;
            }
            info!("Replacing {} with a newer version", filename);
            if let Err(e) = fs::remove_file(&dest) {
                warn!("Could not remove stale {:?}: {}", dest, e);
            }
        }

        if self
            .downloader
            .fetch_from_mirrors(filename, &entry.downloads, entry.sha1(), target_dir)
            .await
        {
            result.installed_count += 1;
        } else {
            result.failed.push(filename.to_string());
        }
    }

    /// Gather client-usable mods of `bundle` into `dest_mods_dir`, sourcing
    /// each from the cache, then `server_mods_dir`, then its URLs. Generic
    /// overrides are extracted under `overrides_dest`.
    pub async fn collect_client_mods(
        &self,
        bundle: &Path,
        server_mods_dir: &Path,
        dest_mods_dir: &Path,
        overrides_dest: &Path,
    ) -> PackResult<ProcessingResult> {
        let manifest = read_manifest(bundle)?;
        let mut result = ProcessingResult {
            name: manifest.display_name().to_string(),
            ..Default::default()
        };

        fs::create_dir_all(dest_mods_dir).map_err(PackError::io_at(dest_mods_dir))?;

        for entry in manifest.mod_entries() {
            if *entry.support_for(Side::Client) == Support::Unsupported {
                result.skipped_count += 1;
                continue;
            }
            let filename = entry.filename();

            if self
                .downloader
                .copy_from_cache(filename, entry.sha1(), dest_mods_dir)
                .await
            {
                result.installed_count += 1;
                continue;
            }

            let server_copy = server_mods_dir.join(filename);
            if server_copy.is_file() {
                match fs::copy(&server_copy, dest_mods_dir.join(filename)) {
                    Ok(_) => {
                        debug!("Including {} from the server mods directory", filename);
                        result.installed_count += 1;
                        continue;
                    }
                    Err(e) => warn!("Could not copy {:?}: {}", server_copy, e),
                }
            }

            if !entry.downloads.is_empty()
                && self
                    .downloader
                    .fetch_from_mirrors(filename, &entry.downloads, entry.sha1(), dest_mods_dir)
                    .await
            {
                result.installed_count += 1;
            } else {
                result.failed.push(filename.to_string());
            }
        }

        result.overrides_applied =
            apply_overrides(bundle, override_roots(Side::Client), overrides_dest);
        Ok(result)
    }
}

fn open_archive(bundle: &Path) -> PackResult<ZipArchive<File>> {
    let file = File::open(bundle).map_err(PackError::io_at(bundle))?;
    ZipArchive::new(file).map_err(|e| PackError::InvalidManifest {
        path: bundle.to_path_buf(),
        reason: format!("not a zip archive: {e}"),
    })
}

/// Read and validate the bundle's manifest.
pub fn read_manifest(bundle: &Path) -> PackResult<BundleManifest> {
    let mut archive = open_archive(bundle)?;
    let invalid = |reason: String| PackError::InvalidManifest {
        path: bundle.to_path_buf(),
        reason,
    };

    let mut bytes = Vec::new();
    archive
        .by_name(MANIFEST_PATH)
        .map_err(|_| invalid(format!("{MANIFEST_PATH} not found")))?
        .read_to_end(&mut bytes)
        .map_err(PackError::io_at(bundle))?;

    let manifest = BundleManifest::parse(&bytes).map_err(|e| invalid(e.to_string()))?;
    if !manifest.is_supported_format() {
        warn!(
            "{:?} declares formatVersion {}; continuing anyway",
            bundle, manifest.format_version
        );
    }
    Ok(manifest)
}

fn log_manifest(manifest: &BundleManifest) {
    let (loader, loader_version) = manifest.loader().unwrap_or(("unknown", "unknown"));
    info!(
        "Bundle: {} (Minecraft {}, {} {})",
        manifest.display_name(),
        manifest.minecraft_version().unwrap_or("unknown"),
        loader,
        loader_version
    );
}

/// Extract every file under each of `roots` into `dest`, stripping the root
/// prefix. Returns the number of files written; entries that cannot be
/// written are logged and skipped.
fn apply_overrides(bundle: &Path, roots: &[&str], dest: &Path) -> usize {
    let mut archive = match open_archive(bundle) {
        Ok(archive) => archive,
        Err(e) => {
            warn!("Cannot reopen {:?} for overrides: {}", bundle, e);
            return 0;
        }
    };
    let mut applied = 0;

    for root in roots {
        for i in 0..archive.len() {
            let mut file = match archive.by_index(i) {
                Ok(file) => file,
                Err(e) => {
                    warn!("Unreadable entry #{} in {:?}: {}", i, bundle, e);
                    continue;
                }
            };
            if file.is_dir() {
                continue;
            }
            let Some(relative) = overlay_path(file.name(), file.enclosed_name(), root) else {
                continue;
            };

            let target = dest.join(&relative);
            match extract_to(&mut file, &target) {
                Ok(()) => {
                    debug!("Override {}/{:?} -> {:?}", root, relative, target);
                    applied += 1;
                }
                Err(e) => warn!("Skipping override {}/{:?}: {}", root, relative, e),
            }
        }
    }
    applied
}

fn extract_to(reader: &mut impl Read, target: &Path) -> PackResult<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(PackError::io_at(parent))?;
    }
    let mut out = File::create(target).map_err(PackError::io_at(target))?;
    io::copy(reader, &mut out).map_err(PackError::io_at(target))?;
    Ok(())
}

/// Path of an archive entry relative to `root`, or `None` when the entry
/// lives elsewhere or would escape the destination.
fn overlay_path(name: &str, enclosed: Option<PathBuf>, root: &str) -> Option<PathBuf> {
    let rest = name.strip_prefix(root)?.strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }
    let Some(safe) = enclosed else {
        warn!("Skipping override entry outside the bundle root: {}", name);
        return None;
    };
    let relative = safe.strip_prefix(root).ok()?.to_path_buf();
    (!relative.as_os_str().is_empty()).then_some(relative)
}

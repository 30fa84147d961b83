use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::core::bundle::{BundleProcessor, Side, BUNDLE_EXTENSION};
use crate::core::cache::{ArtifactCache, CacheStats};
use crate::core::config::PackConfig;
use crate::core::downloader::Downloader;
use crate::core::error::{PackError, PackResult};
use crate::core::http::{build_http_client, HttpTransport, Transport};
use crate::core::packager::{ClientPackBuilder, ClientPackReport};
use crate::core::profile::{self, ModRole, Profile};
use crate::core::progress::ProgressRecord;
use crate::core::reconcile::{self, ReconcileReport};
use crate::core::registry::{
    search_across, select_release, Candidate, CurseForgeClient, ModRegistry, ModrinthClient,
    RegistrySource, SourceSelection,
};
use crate::core::resolver::DependencyResolver;
use crate::core::version::MOD_EXTENSION;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    pub mod_count: usize,
    pub bundle_count: usize,
    pub cache: CacheStats,
}

/// Everything a run needs: configuration, the shared downloader, both
/// registries and the bundle processor.
pub struct Pipeline {
    config: PackConfig,
    downloader: Arc<Downloader>,
    registries: Vec<Arc<dyn ModRegistry>>,
    processor: BundleProcessor,
}

impl Pipeline {
    pub fn new(config: PackConfig) -> PackResult<Self> {
        let client = build_http_client(config.http_timeout())?;
        Ok(Self::with_transport(config, Arc::new(HttpTransport::new(client))))
    }

    pub fn with_transport(config: PackConfig, transport: Arc<dyn Transport>) -> Self {
        let cache = ArtifactCache::new(config.cache_dir());
        let downloader = Arc::new(Downloader::new(transport, cache));
        let registries: Vec<Arc<dyn ModRegistry>> = vec![
            Arc::new(ModrinthClient::new(
                downloader.clone(),
                config.modrinth_api_key.clone(),
            )),
            Arc::new(CurseForgeClient::new(
                downloader.clone(),
                config.curseforge_api_key.clone(),
            )),
        ];
        Self {
            processor: BundleProcessor::new(downloader.clone()),
            config,
            downloader,
            registries,
        }
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    fn cache(&self) -> &ArtifactCache {
        self.downloader.cache()
    }

    fn registry(&self, source: RegistrySource) -> Option<&dyn ModRegistry> {
        self.registries
            .iter()
            .find(|r| r.source() == source)
            .map(|r| &**r)
    }

    pub fn ensure_directories(&self) -> PackResult<()> {
        for dir in [
            self.config.mods_dir(),
            self.config.cache_dir(),
            self.config.profiles_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(PackError::io_at(&dir))?;
        }
        Ok(())
    }

    /// Remove every mod from the server mods directory except pinned ones.
    pub fn prepare_mods_directory(&self) -> PackResult<usize> {
        let mods_dir = self.config.mods_dir();
        info!("Cleaning existing mods directory {:?}", mods_dir);

        let mut removed = 0;
        for name in list_files(&mods_dir, MOD_EXTENSION)? {
            if self.config.is_pinned(&name) {
                info!("Preserving pinned {}", name);
                continue;
            }
            let path = mods_dir.join(&name);
            fs::remove_file(&path).map_err(PackError::io_at(&path))?;
            removed += 1;
        }
        Ok(removed)
    }

    // ── Acquisition ─────────────────────────────────────

    pub async fn search(
        &self,
        query: &str,
        selection: SourceSelection,
        limit: usize,
    ) -> Vec<Candidate> {
        search_across(
            &self.registries,
            selection,
            query,
            &self.config.compat(),
            limit,
        )
        .await
    }

    /// Resolve one project to a release and fetch it with its dependencies.
    async fn install_project(
        &self,
        registry: &dyn ModRegistry,
        project_id: &str,
        version: Option<&str>,
        output_dir: &Path,
        force: bool,
    ) -> bool {
        let compat = self.config.compat();
        let release = match version {
            Some(wanted) => match registry.get_release(project_id, wanted).await {
                Some(release) => Some(release),
                None => {
                    let releases = registry.get_releases(project_id, &compat).await;
                    select_release(&releases, Some(wanted)).cloned()
                }
            },
            None => registry
                .get_releases(project_id, &compat)
                .await
                .into_iter()
                .next(),
        };

        let Some(release) = release else {
            warn!(
                "No release of {} on {} for Minecraft {} / {}",
                project_id,
                registry.source(),
                self.config.mc_version,
                self.config.loader
            );
            return false;
        };

        let report = DependencyResolver::new(registry, compat)
            .resolve_and_fetch(&release, output_dir, force)
            .await;
        report.primary_ok
    }

    /// Search `query` and install up to `limit` hits into `output_dir`.
    async fn acquire(&self, query: &str, limit: usize, output_dir: &Path, force: bool) -> bool {
        let hits = self.search(query, self.config.search_source, limit).await;
        if hits.is_empty() {
            warn!("No results for '{}'", query);
            return false;
        }

        let mut ok = true;
        for hit in hits.iter().take(limit) {
            let Some(registry) = self.registry(hit.source) else {
                continue;
            };
            info!("Installing {} ({}) from {}", hit.title, hit.id, hit.source);
            ok &= self
                .install_project(registry, &hit.id, None, output_dir, force)
                .await;
        }
        ok
    }

    /// Search and install into the server mods directory, then unpack any
    /// bundle that arrived with it.
    pub async fn download_search(&self, label: &str, query: &str, limit: usize, force: bool) -> bool {
        info!("Downloading {} mods ('{}', limit {})", label, query, limit);
        let ok = self
            .acquire(query, limit, &self.config.mods_dir(), force)
            .await;
        self.process_pending_bundles(Side::Server).await && ok
    }

    pub async fn download_by_id(
        &self,
        source: RegistrySource,
        project_id: &str,
        version: Option<&str>,
        force: bool,
    ) -> bool {
        let Some(registry) = self.registry(source) else {
            error!("Registry {} is not configured", source);
            return false;
        };
        info!("Downloading {} from {}", project_id, source);
        let ok = self
            .install_project(registry, project_id, version, &self.config.mods_dir(), force)
            .await;
        self.process_pending_bundles(Side::Server).await && ok
    }

    /// Run every search of a configured category. Completed categories are
    /// skipped unless `force`; success is recorded in `progress`.
    pub async fn download_category(
        &self,
        name: &str,
        progress: &mut ProgressRecord,
        force: bool,
    ) -> PackResult<bool> {
        let Some(category) = self.config.category(name) else {
            let known: Vec<&str> = self.config.categories.iter().map(|c| c.name.as_str()).collect();
            return Err(PackError::Config(format!(
                "unknown category '{}' (available: {})",
                name,
                known.join(", ")
            )));
        };

        if progress.is_complete(name) && !force {
            info!("Skipping {} (already downloaded)", name);
            return Ok(true);
        }

        info!("=== Downloading {} ===", name);
        let mut ok = true;
        for search in &category.searches {
            ok &= self
                .download_search(&search.label, &search.query, search.limit, force)
                .await;
        }

        if ok {
            progress.mark_complete(name)?;
        } else {
            warn!("Category {} finished with failures", name);
        }
        Ok(ok)
    }

    /// Install what a profile declares. Server-side entries go to the mods
    /// directory; client-only entries are staged in the cache for the
    /// client pack.
    pub async fn download_from_profile(&self, profile_path: &Path, force: bool) -> PackResult<bool> {
        let profile = Profile::load(profile_path)?;
        let mods_dir = self.config.mods_dir();
        let cache_dir = self.config.cache_dir();
        let mut ok = true;

        for role in [ModRole::Shared, ModRole::Server] {
            for entry in profile.with_role(role) {
                let name = entry.filename.as_str();

                if !force && mods_dir.join(name).exists() {
                    info!("Skipping {} (already exists)", name);
                    continue;
                }
                if !force && self.cache().has(name) {
                    match self.cache().copy_in(name, &mods_dir) {
                        Ok(_) => {
                            info!("Using cached version of {}", name);
                            continue;
                        }
                        Err(e) => warn!("Cache copy of {} failed: {}", name, e),
                    }
                }
                if self.config.is_pinned(name) {
                    warn!("{} is pinned; install it manually", name);
                    continue;
                }

                let term = profile::search_term_for(name);
                let label = format!("{role} mod");
                ok &= self.download_search(&label, &term, 1, force).await;
            }
        }

        for entry in profile.with_role(ModRole::Client) {
            let name = entry.filename.as_str();
            if !force && self.cache().has(name) {
                info!("Client-only {} already in cache", name);
                continue;
            }
            info!("Staging client-only {} in the cache", name);
            let term = profile::search_term_for(name);
            if !self.acquire(&term, 1, &cache_dir, force).await {
                warn!("Failed to stage client-only {}", name);
                ok = false;
            }
        }

        Ok(ok)
    }

    /// Process every `.mrpack` sitting in the mods directory.
    pub async fn process_pending_bundles(&self, side: Side) -> bool {
        let mods_dir = self.config.mods_dir();
        let bundles = match list_files(&mods_dir, BUNDLE_EXTENSION) {
            Ok(b) => b,
            Err(e) => {
                error!("Cannot list {:?}: {}", mods_dir, e);
                return false;
            }
        };
        if bundles.is_empty() {
            return true;
        }

        info!("=== Processing {} bundle file(s) ===", bundles.len());
        let server_dir = self.config.server_dir();
        let mut ok = true;
        for name in bundles {
            let path = mods_dir.join(&name);
            match self
                .processor
                .process(&path, &mods_dir, &server_dir, side)
                .await
            {
                Ok(result) => ok &= result.failed.is_empty(),
                Err(e) => {
                    error!("Failed to process {}: {}", name, e);
                    ok = false;
                }
            }
        }
        ok
    }

    // ── Local maintenance ───────────────────────────────

    pub fn reconcile(&self) -> PackResult<ReconcileReport> {
        let denylist = self.config.load_denylist()?;
        reconcile::reconcile(&self.config.mods_dir(), &denylist)
    }

    /// Reconcile, then write the profile if it does not exist yet.
    pub fn clean(&self, profile_name: &str) -> PackResult<ReconcileReport> {
        let report = self.reconcile()?;
        profile::write_from_directory(
            &self.config.profile_path(profile_name),
            &self.config.mods_dir(),
            &self.config.pack_title,
        )?;
        Ok(report)
    }

    pub fn summary(&self) -> PackResult<InstallSummary> {
        let mods_dir = self.config.mods_dir();
        let summary = InstallSummary {
            mod_count: list_files(&mods_dir, MOD_EXTENSION)?.len(),
            bundle_count: list_files(&mods_dir, BUNDLE_EXTENSION)?.len(),
            cache: self.cache().stats()?,
        };

        if summary.bundle_count > 0 {
            info!(
                "Installed {} mods and {} bundles in {:?}",
                summary.mod_count, summary.bundle_count, mods_dir
            );
        } else {
            info!("Installed {} mods in {:?}", summary.mod_count, mods_dir);
        }
        info!(
            "Cache {:?}: {} mods, {} bundles, {:.1} MB",
            self.cache().root(),
            summary.cache.mod_count,
            summary.cache.bundle_count,
            summary.cache.total_bytes as f64 / (1024.0 * 1024.0)
        );
        Ok(summary)
    }

    pub async fn create_client_pack(&self, profile_name: &str) -> PackResult<ClientPackReport> {
        ClientPackBuilder::new(&self.config, self.cache(), &self.processor)
            .build(profile_name)
            .await
    }

    pub fn profile_path(&self, profile_name: &str) -> PathBuf {
        self.config.profile_path(profile_name)
    }
}

/// Sorted names of regular files in `dir` ending with `suffix`; a missing
/// directory lists as empty.
fn list_files(dir: &Path, suffix: &str) -> PackResult<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(PackError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| n.ends_with(suffix))
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::http::mock::MockTransport;
    use crate::core::registry::MODRINTH_API;

    fn config(root: &Path) -> PackConfig {
        PackConfig {
            root_dir: root.to_path_buf(),
            ..Default::default()
        }
    }

    fn modrinth_version(project: &str, file: &str, deps: serde_json::Value) -> serde_json::Value {
        json!({
            "id": format!("{project}-v1"),
            "project_id": project,
            "version_number": "1.0.0",
            "game_versions": ["1.21.5"],
            "loaders": ["fabric"],
            "date_published": "2025-04-01T00:00:00Z",
            "files": [{"url": format!("https://cdn.test/{file}"), "filename": file, "primary": true}],
            "dependencies": deps
        })
    }

    fn transport() -> MockTransport {
        MockTransport::new()
            .with_json(
                &format!("{MODRINTH_API}/search"),
                json!({"hits": [{"project_id": "lith", "slug": "lithium", "title": "Lithium", "downloads": 10}]}),
            )
            .with_json(
                &format!("{MODRINTH_API}/project/lith/version"),
                json!([modrinth_version(
                    "lith",
                    "lithium-fabric-0.16.2+mc1.21.5.jar",
                    json!([{"project_id": "capi", "dependency_type": "required"}])
                )]),
            )
            .with_json(
                &format!("{MODRINTH_API}/project/capi/version"),
                json!([modrinth_version("capi", "cloth-config-18.0.145-fabric.jar", json!([]))]),
            )
            .with_file("https://cdn.test/lithium-fabric-0.16.2+mc1.21.5.jar", b"lithium")
            .with_file("https://cdn.test/cloth-config-18.0.145-fabric.jar", b"cloth")
    }

    fn pipeline(root: &Path) -> (Pipeline, Arc<MockTransport>) {
        let transport = Arc::new(transport());
        let pipeline = Pipeline::with_transport(config(root), transport.clone());
        pipeline.ensure_directories().unwrap();
        (pipeline, transport)
    }

    #[tokio::test]
    async fn download_search_installs_mod_and_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(dir.path());

        assert!(pipeline.download_search("Performance", "lithium", 1, false).await);
        let mods = pipeline.config().mods_dir();
        assert!(mods.join("lithium-fabric-0.16.2+mc1.21.5.jar").exists());
        assert!(mods.join("cloth-config-18.0.145-fabric.jar").exists());
        assert!(pipeline
            .config()
            .cache_dir()
            .join("lithium-fabric-0.16.2+mc1.21.5.jar")
            .exists());
    }

    #[tokio::test]
    async fn category_progress_is_recorded_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.categories = vec![crate::core::config::Category {
            name: "perf".into(),
            searches: vec![crate::core::config::CategorySearch {
                label: "Performance".into(),
                query: "lithium".into(),
                limit: 1,
            }],
        }];
        let transport = Arc::new(transport());
        let pipeline = Pipeline::with_transport(cfg, transport.clone());
        pipeline.ensure_directories().unwrap();

        let mut progress = ProgressRecord::load(&pipeline.config().progress_file());
        assert!(pipeline.download_category("perf", &mut progress, false).await.unwrap());
        assert!(ProgressRecord::load(&pipeline.config().progress_file()).is_complete("perf"));

        let searches = transport.queries_for(&format!("{MODRINTH_API}/search")).len();
        assert!(pipeline.download_category("perf", &mut progress, false).await.unwrap());
        assert_eq!(
            transport.queries_for(&format!("{MODRINTH_API}/search")).len(),
            searches
        );

        assert!(matches!(
            pipeline.download_category("nope", &mut progress, false).await,
            Err(PackError::Config(_))
        ));
    }

    #[tokio::test]
    async fn profile_uses_cache_and_skips_pinned() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, transport) = pipeline(dir.path());
        let cfg = pipeline.config();
        fs::write(cfg.cache_dir().join("ferritecore-7.1.1-fabric.jar"), b"f").unwrap();

        let profile = cfg.profile_path("pack.txt");
        fs::write(
            &profile,
            "[shared] ferritecore-7.1.1-fabric.jar\n\
             [server] fabric-api-0.120.0+1.21.5.jar\n\
             [client] lithium-fabric-0.16.2+mc1.21.5.jar\n",
        )
        .unwrap();

        assert!(pipeline.download_from_profile(&profile, false).await.unwrap());
        assert!(cfg.mods_dir().join("ferritecore-7.1.1-fabric.jar").exists());
        assert!(!cfg.mods_dir().join("fabric-api-0.120.0+1.21.5.jar").exists());
        // client-only entries land in the cache, not the server
        assert!(cfg
            .cache_dir()
            .join("lithium-fabric-0.16.2+mc1.21.5.jar")
            .exists());
        assert!(!cfg
            .mods_dir()
            .join("lithium-fabric-0.16.2+mc1.21.5.jar")
            .exists());
        assert_eq!(transport.queries_for(&format!("{MODRINTH_API}/search")).len(), 1);
    }

    #[tokio::test]
    async fn prepare_keeps_pinned_and_clean_writes_profile() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(dir.path());
        let mods = pipeline.config().mods_dir();
        for name in ["fabric-api-1.21.5.jar", "old-1.0.0.jar", "notes.txt"] {
            fs::write(mods.join(name), b"x").unwrap();
        }

        assert_eq!(pipeline.prepare_mods_directory().unwrap(), 1);
        assert!(mods.join("fabric-api-1.21.5.jar").exists());
        assert!(mods.join("notes.txt").exists());

        fs::write(mods.join("lithium-0.15.0.jar"), b"x").unwrap();
        fs::write(mods.join("lithium-0.16.2.jar"), b"x").unwrap();
        let report = pipeline.clean("pack.txt").unwrap();
        assert_eq!(report.removed_duplicates, vec!["lithium-0.15.0.jar".to_string()]);

        let profile = Profile::load(&pipeline.profile_path("pack.txt")).unwrap();
        assert_eq!(profile.entries.len(), 2);

        let summary = pipeline.summary().unwrap();
        assert_eq!(summary.mod_count, 2);
        assert_eq!(summary.bundle_count, 0);
    }

    #[tokio::test]
    async fn unknown_project_fails_download_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(dir.path());
        assert!(!pipeline
            .download_by_id(RegistrySource::Modrinth, "missing", None, false)
            .await);
        assert!(pipeline
            .download_by_id(RegistrySource::Modrinth, "capi", None, false)
            .await);
    }
}

//! Client pack assembly: README, mods and bundle overrides zipped into one
//! archive players can unpack into their game directory.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::bundle::BundleProcessor;
use crate::core::cache::ArtifactCache;
use crate::core::config::PackConfig;
use crate::core::error::{PackError, PackResult};
use crate::core::profile::{self, ModRole, Profile};

const README_FILE: &str = "README.txt";
const OVERRIDES_INSTRUCTIONS_FILE: &str = "OVERRIDES_INSTRUCTIONS.txt";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientPackReport {
    pub copied: usize,
    pub shared: usize,
    pub client_only: usize,
    /// Mods pulled out of `.mrpack` entries.
    pub from_bundles: usize,
    /// Profile entries that could not be sourced.
    pub missing: Vec<String>,
    pub archive: PathBuf,
    pub archive_bytes: u64,
}

pub struct ClientPackBuilder<'a> {
    config: &'a PackConfig,
    cache: &'a ArtifactCache,
    processor: &'a BundleProcessor,
}

impl<'a> ClientPackBuilder<'a> {
    pub fn new(
        config: &'a PackConfig,
        cache: &'a ArtifactCache,
        processor: &'a BundleProcessor,
    ) -> Self {
        Self {
            config,
            cache,
            processor,
        }
    }

    /// `<root>/<profile stem>-<mc>-<loader>.zip`
    pub fn archive_path(&self, profile_name: &str) -> PathBuf {
        let stem = profile_name.strip_suffix(".txt").unwrap_or(profile_name);
        self.config.root_dir.join(format!(
            "{}-{}-{}.zip",
            stem, self.config.mc_version, self.config.loader
        ))
    }

    pub async fn build(&self, profile_name: &str) -> PackResult<ClientPackReport> {
        let server_mods = self.config.mods_dir();
        if !server_mods.is_dir() {
            return Err(PackError::Config(format!(
                "server mods directory {} does not exist",
                server_mods.display()
            )));
        }

        let profile_path = self.config.profile_path(profile_name);
        if !profile_path.exists() {
            info!("Profile {} not found, creating it from installed mods", profile_name);
            profile::write_from_directory(&profile_path, &server_mods, &self.config.pack_title)?;
        }
        let profile = Profile::load(&profile_path)?;

        let pack_dir = self.config.client_pack_dir();
        let pack_mods = pack_dir.join("mods");
        if pack_dir.exists() {
            fs::remove_dir_all(&pack_dir).map_err(PackError::io_at(&pack_dir))?;
        }
        fs::create_dir_all(&pack_mods).map_err(PackError::io_at(&pack_mods))?;
        fs::write(pack_dir.join(README_FILE), self.readme())
            .map_err(PackError::io_at(&pack_dir))?;

        let mut report = ClientPackReport::default();

        for entry in profile.client_entries() {
            let filename = entry.filename.as_str();
            let source = [self.cache.path_for(filename), server_mods.join(filename)]
                .into_iter()
                .find(|p| p.is_file());

            let Some(source) = source else {
                warn!("{} not found in cache or server mods", filename);
                report.missing.push(filename.to_string());
                continue;
            };

            if entry.is_bundle() {
                info!("Extracting client mods from {}", filename);
                match self
                    .processor
                    .collect_client_mods(&source, &server_mods, &pack_mods, &pack_dir.join("overrides"))
                    .await
                {
                    Ok(result) => {
                        report.copied += result.installed_count;
                        report.from_bundles += result.installed_count;
                        report.missing.extend(result.failed);
                        fs::write(
                            pack_dir.join(OVERRIDES_INSTRUCTIONS_FILE),
                            OVERRIDES_INSTRUCTIONS,
                        )
                        .map_err(PackError::io_at(&pack_dir))?;
                    }
                    Err(e) => warn!("Could not expand {} for the client: {}", filename, e),
                }
                continue;
            }

            let dest = pack_mods.join(filename);
            fs::copy(&source, &dest).map_err(PackError::io_at(&source))?;
            report.copied += 1;
            match entry.role {
                ModRole::Client => report.client_only += 1,
                _ => report.shared += 1,
            }
        }

        if report.copied == 0 {
            return Err(PackError::Other("no mods copied to the client pack".into()));
        }

        let archive = self.archive_path(profile_name);
        zip_directory(&pack_dir, &archive)?;
        report.archive_bytes = fs::metadata(&archive).map(|m| m.len()).unwrap_or(0);
        report.archive = archive;

        info!(
            "Client pack {:?}: {} mods ({} shared, {} client-only, {} from bundles), {:.1} MB",
            report.archive,
            report.copied,
            report.shared,
            report.client_only,
            report.from_bundles,
            report.archive_bytes as f64 / (1024.0 * 1024.0)
        );
        Ok(report)
    }

    fn readme(&self) -> String {
        let c = self.config;
        format!(
            "=====================================================\n\
             {title} - {mc} ({loader})\n\
             =====================================================\n\
             \n\
             INSTALLATION INSTRUCTIONS:\n\
             1. Install Minecraft {mc}\n\
             2. Install the {loader} loader version {loader_version}\n\
             3. Copy all mods from the 'mods' folder to:\n   \
                - Windows: %APPDATA%\\.minecraft\\mods\n   \
                - Mac: ~/Library/Application Support/minecraft/mods\n   \
                - Linux: ~/.minecraft/mods\n\
             4. Launch Minecraft with the {loader} profile\n",
            title = c.pack_title.to_uppercase(),
            mc = c.mc_version,
            loader = c.loader,
            loader_version = c.loader_version,
        )
    }
}

const OVERRIDES_INSTRUCTIONS: &str = "\
OVERRIDES INSTALLATION INSTRUCTIONS:
------------------------------------
The \"overrides\" folder contains additional configuration files and resources.
Copy all contents from the \"overrides\" folder to your .minecraft directory:

- Windows: %APPDATA%\\.minecraft\\
- Mac: ~/Library/Application Support/minecraft/
- Linux: ~/.minecraft/
";

/// Zip every file below `src_dir` into `archive`, paths relative to `src_dir`.
pub fn zip_directory(src_dir: &Path, archive: &Path) -> PackResult<()> {
    if let Some(parent) = archive.parent() {
        fs::create_dir_all(parent).map_err(PackError::io_at(parent))?;
    }
    let file = File::create(archive).map_err(PackError::io_at(archive))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    add_dir(&mut zip, src_dir, src_dir, options)?;
    zip.finish()?;
    Ok(())
}

fn add_dir(
    zip: &mut ZipWriter<File>,
    base: &Path,
    dir: &Path,
    options: SimpleFileOptions,
) -> PackResult<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .map_err(PackError::io_at(dir))?
        .flatten()
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = path
            .strip_prefix(base)
            .map_err(|e| PackError::Other(e.to_string()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if path.is_dir() {
            zip.add_directory(format!("{relative}/"), options)?;
            add_dir(zip, base, &path, options)?;
        } else {
            zip.start_file(relative, options)?;
            let mut src = File::open(&path).map_err(PackError::io_at(&path))?;
            io::copy(&mut src, zip).map_err(PackError::io_at(&path))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::sync::Arc;

    use zip::ZipArchive;

    use super::*;
    use crate::core::bundle::manifest::MANIFEST_PATH;
    use crate::core::downloader::Downloader;
    use crate::core::http::mock::MockTransport;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: PackConfig,
        cache: ArtifactCache,
        processor: BundleProcessor,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = PackConfig {
            root_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        fs::create_dir_all(config.mods_dir()).unwrap();
        fs::create_dir_all(config.cache_dir()).unwrap();
        fs::create_dir_all(config.profiles_dir()).unwrap();

        let cache = ArtifactCache::new(config.cache_dir());
        let transport = Arc::new(
            MockTransport::new().with_file("https://cdn.test/client-only.jar", b"client"),
        );
        let downloader = Arc::new(Downloader::new(transport, cache.clone()));
        Fixture {
            _dir: dir,
            config,
            cache,
            processor: BundleProcessor::new(downloader),
        }
    }

    fn archive_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn builds_archive_from_profile() {
        let fx = fixture();
        let mods = fx.config.mods_dir();
        fs::write(mods.join("lithium-0.16.2.jar"), b"l").unwrap();
        fs::write(fx.config.cache_dir().join("sodium-0.6.12.jar"), b"s").unwrap();
        fs::write(mods.join("chunky-1.4.27.jar"), b"c").unwrap();
        fs::write(
            fx.config.profile_path("adventure_pack.txt"),
            "[shared] lithium-0.16.2.jar\n[client] sodium-0.6.12.jar\n[server] chunky-1.4.27.jar\n[client] gone.jar\n",
        )
        .unwrap();

        let builder = ClientPackBuilder::new(&fx.config, &fx.cache, &fx.processor);
        let report = builder.build("adventure_pack.txt").await.unwrap();

        assert_eq!(report.copied, 2);
        assert_eq!(report.shared, 1);
        assert_eq!(report.client_only, 1);
        assert_eq!(report.missing, vec!["gone.jar".to_string()]);
        assert_eq!(
            report.archive,
            fx.config.root_dir.join("adventure_pack-1.21.5-fabric.zip")
        );

        let names = archive_names(&report.archive);
        assert!(names.contains(&"README.txt".to_string()));
        assert!(names.contains(&"mods/lithium-0.16.2.jar".to_string()));
        assert!(names.contains(&"mods/sodium-0.6.12.jar".to_string()));
        assert!(!names.iter().any(|n| n.contains("chunky")));

        let mut archive = ZipArchive::new(File::open(&report.archive).unwrap()).unwrap();
        let mut readme = String::new();
        archive
            .by_name("README.txt")
            .unwrap()
            .read_to_string(&mut readme)
            .unwrap();
        assert!(readme.contains("Install Minecraft 1.21.5"));
    }

    #[tokio::test]
    async fn bundle_entries_are_expanded_with_overrides() {
        let fx = fixture();
        let bundle = fx.config.cache_dir().join("pack.mrpack");
        let mut zip = ZipWriter::new(File::create(&bundle).unwrap());
        let options = SimpleFileOptions::default();
        zip.start_file(MANIFEST_PATH, options).unwrap();
        zip.write_all(
            br#"{"formatVersion": 1, "files": [
                {"path": "mods/client-only-1.0.0.jar", "env": {"client": "required", "server": "unsupported"},
                 "downloads": ["https://cdn.test/client-only.jar"]},
                {"path": "mods/server-only-1.0.0.jar", "env": {"client": "unsupported", "server": "required"},
                 "downloads": ["https://cdn.test/server-only.jar"]}
            ]}"#,
        )
        .unwrap();
        zip.start_file("overrides/config/pack.toml", options).unwrap();
        zip.write_all(b"cfg").unwrap();
        zip.finish().unwrap();

        fs::write(fx.config.profile_path("bundle.txt"), "[shared] pack.mrpack\n").unwrap();

        let builder = ClientPackBuilder::new(&fx.config, &fx.cache, &fx.processor);
        let report = builder.build("bundle.txt").await.unwrap();
        assert_eq!(report.copied, 1);
        assert_eq!(report.from_bundles, 1);

        let names = archive_names(&report.archive);
        assert!(names.contains(&"mods/client-only-1.0.0.jar".to_string()));
        assert!(!names.contains(&"mods/server-only-1.0.0.jar".to_string()));
        assert!(names.contains(&"overrides/config/pack.toml".to_string()));
        assert!(names.contains(&OVERRIDES_INSTRUCTIONS_FILE.to_string()));
    }

    #[tokio::test]
    async fn empty_pack_is_an_error() {
        let fx = fixture();
        fs::write(fx.config.profile_path("empty.txt"), "[server] chunky.jar\n").unwrap();
        let builder = ClientPackBuilder::new(&fx.config, &fx.cache, &fx.processor);
        assert!(builder.build("empty.txt").await.is_err());
        assert!(!builder.archive_path("empty.txt").exists());
    }

    #[tokio::test]
    async fn missing_profile_is_generated_from_server_mods() {
        let fx = fixture();
        fs::write(fx.config.mods_dir().join("lithium-0.16.2.jar"), b"l").unwrap();

        let builder = ClientPackBuilder::new(&fx.config, &fx.cache, &fx.processor);
        let report = builder.build("fresh.txt").await.unwrap();
        assert_eq!(report.copied, 1);
        assert!(fx.config.profile_path("fresh.txt").exists());
    }
}

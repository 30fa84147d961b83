use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, warn};

use super::{
    ArtifactRef, Candidate, Compat, DependencyDeclaration, ModRegistry, RegistrySource, Release,
};
use crate::core::downloader::Downloader;
use crate::core::error::PackResult;
use crate::core::http::{Headers, Query};

pub const CURSEFORGE_API: &str = "https://api.curseforge.com";

/// Game id of Minecraft on CurseForge.
const MINECRAFT_GAME_ID: u32 = 432;
/// Class id of the "Mods" category.
const MC_MODS_CLASS_ID: u32 = 6;
/// Search sort field: popularity.
const SORT_POPULARITY: u32 = 2;
/// `relationType` of a required dependency.
const RELATION_REQUIRED: u32 = 3;
/// `algo` of a SHA-1 file hash.
const HASH_ALGO_SHA1: u32 = 1;

const KNOWN_LOADERS: [&str; 5] = ["forge", "fabric", "quilt", "neoforge", "liteloader"];

/// CurseForge `modLoaderType` for a loader name.
pub fn loader_type_id(loader: &str) -> Option<u32> {
    match loader.to_ascii_lowercase().as_str() {
        "forge" => Some(1),
        "cauldron" => Some(2),
        "liteloader" => Some(3),
        "fabric" => Some(4),
        "quilt" => Some(5),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModDto {
    id: u64,
    #[serde(default)]
    name: String,
    slug: Option<String>,
    #[serde(default)]
    download_count: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileDto {
    id: u64,
    mod_id: u64,
    file_name: Option<String>,
    #[serde(default)]
    display_name: String,
    download_url: Option<String>,
    #[serde(default)]
    file_date: String,
    #[serde(default)]
    file_length: Option<u64>,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    dependencies: Vec<DependencyDto>,
    #[serde(default)]
    hashes: Vec<HashDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DependencyDto {
    mod_id: u64,
    relation_type: u32,
}

#[derive(Debug, Deserialize)]
struct HashDto {
    value: String,
    algo: u32,
}

impl FileDto {
    fn into_release(self) -> Release {
        let project_id = self.mod_id.to_string();
        let filename = self
            .file_name
            .clone()
            .unwrap_or_else(|| format!("mod_{}_{}.jar", self.mod_id, self.id));

        // Files with third-party distribution disabled carry no URL.
        let files = match self.download_url {
            Some(url) => vec![ArtifactRef {
                filename: filename.clone(),
                source_url: url,
                registry_id: project_id.clone(),
                size: self.file_length,
                sha1: self
                    .hashes
                    .iter()
                    .find(|h| h.algo == HASH_ALGO_SHA1)
                    .map(|h| h.value.clone()),
            }],
            None => vec![],
        };

        let loaders = self
            .game_versions
            .iter()
            .filter(|g| KNOWN_LOADERS.contains(&g.to_ascii_lowercase().as_str()))
            .map(|g| g.to_ascii_lowercase())
            .collect();

        Release {
            id: self.id.to_string(),
            project_id: project_id.clone(),
            version_number: if self.display_name.is_empty() {
                filename
            } else {
                self.display_name
            },
            loaders,
            game_versions: self.game_versions,
            published: self.file_date,
            files,
            dependencies: self
                .dependencies
                .into_iter()
                .map(|d| DependencyDeclaration {
                    target_id: d.mod_id.to_string(),
                    target_version_id: None,
                    required: d.relation_type == RELATION_REQUIRED,
                })
                .collect(),
        }
    }
}

fn newest_first(releases: &mut [Release]) {
    releases.sort_by(|a, b| b.published.cmp(&a.published));
}

/// Client for the CurseForge core API.
pub struct CurseForgeClient {
    downloader: Arc<Downloader>,
    api_key: Option<String>,
    base_url: String,
}

impl CurseForgeClient {
    pub fn new(downloader: Arc<Downloader>, api_key: Option<String>) -> Self {
        Self::with_base_url(downloader, api_key, CURSEFORGE_API)
    }

    pub fn with_base_url(
        downloader: Arc<Downloader>,
        api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            downloader,
            api_key,
            base_url: base_url.into(),
        }
    }

    fn headers(&self, accept: &str) -> Headers {
        let mut headers = vec![("accept", accept.to_string())];
        if let Some(key) = &self.api_key {
            headers.push(("x-api-key", key.clone()));
        }
        headers
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str, query: &Query) -> PackResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let value = self
            .downloader
            .transport()
            .get_json(&url, &self.headers("application/json"), query)
            .await?;
        let envelope: Envelope<T> = serde_json::from_value(value)?;
        Ok(envelope.data)
    }

    async fn list_files(&self, project_id: &str, query: &Query) -> Vec<Release> {
        let path = format!("/v1/mods/{project_id}/files");
        match self.get::<Vec<FileDto>>(&path, query).await {
            Ok(files) => files.into_iter().map(FileDto::into_release).collect(),
            Err(e) => {
                error!("Error listing CurseForge files of {}: {}", project_id, e);
                vec![]
            }
        }
    }
}

#[async_trait]
impl ModRegistry for CurseForgeClient {
    fn source(&self) -> RegistrySource {
        RegistrySource::CurseForge
    }

    async fn search(&self, query: &str, compat: &Compat, limit: usize) -> Vec<Candidate> {
        let mut params: Query = vec![
            ("gameId".into(), MINECRAFT_GAME_ID.to_string()),
            ("classId".into(), MC_MODS_CLASS_ID.to_string()),
            ("searchFilter".into(), query.to_string()),
            ("pageSize".into(), limit.to_string()),
            ("index".into(), "0".into()),
            ("sortField".into(), SORT_POPULARITY.to_string()),
            ("sortOrder".into(), "desc".into()),
        ];
        if let Some(v) = &compat.mc_version {
            params.push(("gameVersion".into(), v.clone()));
        }
        if let Some(id) = compat.loader.as_deref().and_then(loader_type_id) {
            params.push(("modLoaderType".into(), id.to_string()));
        }

        match self.get::<Vec<ModDto>>("/v1/mods/search", &params).await {
            Ok(mods) => mods
                .into_iter()
                .map(|m| Candidate {
                    id: m.id.to_string(),
                    slug: m.slug,
                    title: m.name,
                    source: RegistrySource::CurseForge,
                    downloads: m.download_count.max(0.0) as u64,
                })
                .collect(),
            Err(e) => {
                error!("Error searching CurseForge for '{}': {}", query, e);
                vec![]
            }
        }
    }

    async fn get_releases(&self, project_id: &str, compat: &Compat) -> Vec<Release> {
        let mut params = Query::new();
        if let Some(v) = &compat.mc_version {
            params.push(("gameVersion".into(), v.clone()));
        }
        if let Some(id) = compat.loader.as_deref().and_then(loader_type_id) {
            params.push(("modLoaderType".into(), id.to_string()));
        }

        let mut releases: Vec<Release> = self
            .list_files(project_id, &params)
            .await
            .into_iter()
            .filter(|r| compat.matches(r))
            .collect();
        newest_first(&mut releases);
        releases
    }

    async fn get_release(&self, project_id: &str, release_id: &str) -> Option<Release> {
        let path = format!("/v1/mods/{project_id}/files/{release_id}");
        match self.get::<FileDto>(&path, &Query::new()).await {
            Ok(file) => Some(file.into_release()),
            Err(e) => {
                warn!(
                    "CurseForge file {} of mod {} unavailable: {}",
                    release_id, project_id, e
                );
                None
            }
        }
    }

    /// Files of `project_id` sharing at least one game version tag with the
    /// parent file and built for the requested loader, newest first.
    async fn dependency_candidates(
        &self,
        project_id: &str,
        parent: &Release,
        compat: &Compat,
    ) -> Vec<Release> {
        let mut releases: Vec<Release> = self
            .list_files(project_id, &Query::new())
            .await
            .into_iter()
            .filter(|r| {
                r.game_versions
                    .iter()
                    .any(|g| parent.game_versions.contains(g))
            })
            .filter(|r| {
                compat
                    .loader
                    .as_deref()
                    .map_or(true, |l| r.loaders.iter().any(|x| x.eq_ignore_ascii_case(l)))
            })
            .collect();
        newest_first(&mut releases);
        releases
    }

    async fn fetch(&self, file: &ArtifactRef, output_dir: &Path, force: bool) -> bool {
        self.downloader
            .fetch(
                file,
                &self.headers("application/octet-stream"),
                output_dir,
                force,
            )
            .await
    }

    fn supports_transitive(&self) -> bool {
        true
    }
}

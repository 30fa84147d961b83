use std::collections::HashMap;
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

pub const MODRINTH_API: &str = "https://api.modrinth.com/v2";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    project_id: String,
    slug: Option<String>,
    title: Option<String>,
    #[serde(default)]
    downloads: u64,
}

#[derive(Debug, Deserialize)]
struct VersionDto {
    id: String,
    project_id: String,
    #[serde(default)]
    version_number: String,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    loaders: Vec<String>,
    #[serde(default)]
    date_published: String,
    #[serde(default)]
    files: Vec<FileDto>,
    #[serde(default)]
    dependencies: Vec<DependencyDto>,
}

#[derive(Debug, Deserialize)]
struct FileDto {
    url: String,
    filename: String,
    #[serde(default)]
    primary: bool,
    size: Option<u64>,
    #[serde(default)]
    hashes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct DependencyDto {
    project_id: Option<String>,
    version_id: Option<String>,
    dependency_type: String,
}

impl VersionDto {
    fn into_release(self) -> Release {
        let project_id = self.project_id;

        // Primary file first, the rest in published order.
        let mut files = self.files;
        files.sort_by_key(|f| !f.primary);
        let files = files
            .into_iter()
            .map(|f| ArtifactRef {
                filename: f.filename,
                source_url: f.url,
                registry_id: project_id.clone(),
                size: f.size,
                sha1: f.hashes.get("sha1").cloned(),
            })
            .collect();

        let dependencies = self
            .dependencies
            .into_iter()
            .filter_map(|d| {
                Some(DependencyDeclaration {
                    target_id: d.project_id?,
                    target_version_id: d.version_id,
                    required: d.dependency_type == "required",
                })
            })
            .collect();

        Release {
            id: self.id,
            project_id,
            version_number: self.version_number,
            game_versions: self.game_versions,
            loaders: self.loaders,
            published: self.date_published,
            files,
            dependencies,
        }
    }
}

/// Client for the Modrinth v2 API.
pub struct ModrinthClient {
    downloader: Arc<Downloader>,
    api_key: Option<String>,
    base_url: String,
}

impl ModrinthClient {
    pub fn new(downloader: Arc<Downloader>, api_key: Option<String>) -> Self {
        Self::with_base_url(downloader, api_key, MODRINTH_API)
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

    fn headers(&self) -> Headers {
        match &self.api_key {
            Some(key) => vec![("authorization", key.clone())],
            None => Headers::new(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str, query: &Query) -> PackResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let value = self
            .downloader
            .transport()
            .get_json(&url, &self.headers(), query)
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// `[["versions:1.21.5"],["categories:fabric"]]`
fn search_facets(compat: &Compat) -> Option<String> {
    let mut facets: Vec<Vec<String>> = Vec::new();
    if let Some(v) = &compat.mc_version {
        facets.push(vec![format!("versions:{v}")]);
    }
    if let Some(l) = &compat.loader {
        facets.push(vec![format!("categories:{l}")]);
    }
    if facets.is_empty() {
        None
    } else {
        serde_json::to_string(&facets).ok()
    }
}

#[async_trait]
impl ModRegistry for ModrinthClient {
    fn source(&self) -> RegistrySource {
        RegistrySource::Modrinth
    }

    async fn search(&self, query: &str, compat: &Compat, limit: usize) -> Vec<Candidate> {
        let mut params: Query = vec![
            ("query".into(), query.to_string()),
            ("limit".into(), limit.to_string()),
            ("offset".into(), "0".into()),
            ("index".into(), "relevance".into()),
        ];
        if let Some(facets) = search_facets(compat) {
            params.push(("facets".into(), facets));
        }

        match self.get::<SearchResponse>("/search", &params).await {
            Ok(resp) => resp
                .hits
                .into_iter()
                .map(|hit| Candidate {
                    title: hit.title.unwrap_or_else(|| hit.project_id.clone()),
                    id: hit.project_id,
                    slug: hit.slug,
                    source: RegistrySource::Modrinth,
                    downloads: hit.downloads,
                })
                .collect(),
            Err(e) => {
                error!("Error searching Modrinth for '{}': {}", query, e);
                vec![]
            }
        }
    }

    async fn get_releases(&self, project_id: &str, compat: &Compat) -> Vec<Release> {
        let mut params = Query::new();
        if let Some(v) = &compat.mc_version {
            params.push(("game_versions".into(), format!("[\"{v}\"]")));
        }
        if let Some(l) = &compat.loader {
            params.push(("loaders".into(), format!("[\"{l}\"]")));
        }

        let path = format!("/project/{project_id}/version");
        let versions = match self.get::<Vec<VersionDto>>(&path, &params).await {
            Ok(v) => v,
            Err(e) => {
                error!("Error listing Modrinth versions of {}: {}", project_id, e);
                return vec![];
            }
        };

        let mut releases: Vec<Release> = versions
            .into_iter()
            .map(VersionDto::into_release)
            .filter(|r| compat.matches(r))
            .collect();
        releases.sort_by(|a, b| b.published.cmp(&a.published));

        if releases.is_empty() {
            warn!(
                "No compatible Modrinth versions for {} ({:?} / {:?})",
                project_id, compat.mc_version, compat.loader
            );
        }
        releases
    }

    async fn get_release(&self, project_id: &str, release_id: &str) -> Option<Release> {
        let path = format!("/version/{release_id}");
        match self.get::<VersionDto>(&path, &Query::new()).await {
            Ok(v) => Some(v.into_release()),
            Err(e) => {
                warn!(
                    "Modrinth version {} of {} unavailable: {}",
                    release_id, project_id, e
                );
                None
            }
        }
    }

    async fn fetch(&self, file: &ArtifactRef, output_dir: &Path, force: bool) -> bool {
        self.downloader
            .fetch(file, &self.headers(), output_dir, force)
            .await
    }
}

//! Remote mod registries.
//!
//! Modrinth and CurseForge expose the same capabilities through very
//! different APIs; both are normalized to [`Candidate`], [`Release`] and
//! [`ArtifactRef`] behind the [`ModRegistry`] trait.

mod curseforge;
mod modrinth;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use curseforge::{CurseForgeClient, CURSEFORGE_API};
pub use modrinth::{ModrinthClient, MODRINTH_API};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RegistrySource {
    Modrinth,
    #[value(name = "curseforge")]
    CurseForge,
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrySource::Modrinth => f.write_str("modrinth"),
            RegistrySource::CurseForge => f.write_str("curseforge"),
        }
    }
}

impl FromStr for RegistrySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "modrinth" => Ok(RegistrySource::Modrinth),
            "curseforge" => Ok(RegistrySource::CurseForge),
            other => Err(format!("unknown registry: {other}")),
        }
    }
}

/// Which registries a search should consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceSelection {
    #[default]
    Modrinth,
    #[value(name = "curseforge")]
    CurseForge,
    Both,
}

impl SourceSelection {
    pub fn includes(self, source: RegistrySource) -> bool {
        match self {
            SourceSelection::Both => true,
            SourceSelection::Modrinth => source == RegistrySource::Modrinth,
            SourceSelection::CurseForge => source == RegistrySource::CurseForge,
        }
    }
}

/// Pointer to one downloadable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    pub source_url: String,
    /// Project id on the registry that produced this reference.
    pub registry_id: String,
    pub size: Option<u64>,
    pub sha1: Option<String>,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub slug: Option<String>,
    pub title: String,
    pub source: RegistrySource,
    pub downloads: u64,
}

/// Declared relationship of a release to another project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDeclaration {
    pub target_id: String,
    pub target_version_id: Option<String>,
    pub required: bool,
}

/// One published build of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub id: String,
    pub project_id: String,
    pub version_number: String,
    pub game_versions: Vec<String>,
    pub loaders: Vec<String>,
    /// ISO-8601 publication timestamp, used for newest-first ordering.
    pub published: String,
    /// Primary file first.
    pub files: Vec<ArtifactRef>,
    pub dependencies: Vec<DependencyDeclaration>,
}

impl Release {
    pub fn primary_file(&self) -> Option<&ArtifactRef> {
        self.files.first()
    }

    pub fn required_dependencies(&self) -> impl Iterator<Item = &DependencyDeclaration> {
        self.dependencies.iter().filter(|d| d.required)
    }
}

/// Game version / loader constraints applied to release lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compat {
    pub mc_version: Option<String>,
    pub loader: Option<String>,
}

impl Compat {
    pub fn new(mc_version: impl Into<String>, loader: impl Into<String>) -> Self {
        Self {
            mc_version: Some(mc_version.into()),
            loader: Some(loader.into()),
        }
    }

    /// Both constraints, when set, must appear in the release's tags.
    /// Loader names are compared case-insensitively.
    pub fn matches(&self, release: &Release) -> bool {
        let version_ok = self
            .mc_version
            .as_deref()
            .map_or(true, |v| release.game_versions.iter().any(|g| g == v));
        let loader_ok = self
            .loader
            .as_deref()
            .map_or(true, |l| release.loaders.iter().any(|r| r.eq_ignore_ascii_case(l)));
        version_ok && loader_ok
    }
}

#[async_trait]
pub trait ModRegistry: Send + Sync {
    fn source(&self) -> RegistrySource;

    /// Ranked search. Transport failures are logged and yield no hits.
    async fn search(&self, query: &str, compat: &Compat, limit: usize) -> Vec<Candidate>;

    /// Releases of `project_id` that satisfy `compat`, newest first.
    async fn get_releases(&self, project_id: &str, compat: &Compat) -> Vec<Release>;

    /// One exact release, if it exists.
    async fn get_release(&self, project_id: &str, release_id: &str) -> Option<Release>;

    /// Releases eligible as an unpinned dependency of `parent`, newest first.
    async fn dependency_candidates(
        &self,
        project_id: &str,
        _parent: &Release,
        compat: &Compat,
    ) -> Vec<Release> {
        self.get_releases(project_id, compat).await
    }

    /// Materialize `file` in `output_dir`; see [`crate::core::downloader::Downloader::fetch`].
    async fn fetch(&self, file: &ArtifactRef, output_dir: &Path, force: bool) -> bool;

    /// Whether dependencies of dependencies are followed.
    fn supports_transitive(&self) -> bool {
        false
    }
}

/// Search every selected registry and merge hits by download count.
pub async fn search_across(
    registries: &[Arc<dyn ModRegistry>],
    selection: SourceSelection,
    query: &str,
    compat: &Compat,
    limit: usize,
) -> Vec<Candidate> {
    let mut hits = Vec::new();
    for registry in registries.iter().filter(|r| selection.includes(r.source())) {
        hits.extend(registry.search(query, compat, limit).await);
    }
    hits.sort_by(|a, b| b.downloads.cmp(&a.downloads));
    hits.truncate(limit);
    hits
}

/// Pick a release by id or version number, or the newest when `wanted` is `None`.
pub fn select_release<'a>(releases: &'a [Release], wanted: Option<&str>) -> Option<&'a Release> {
    match wanted {
        Some(w) => releases.iter().find(|r| r.id == w || r.version_number == w),
        None => releases.first(),
    }
}

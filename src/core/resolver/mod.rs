use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tracing::{debug, info, warn};

use crate::core::registry::{Compat, ModRegistry, Release};

/// Outcome of installing one release with its dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Whether the primary file itself was materialized.
    pub primary_ok: bool,
    /// Filenames fetched (or already satisfied), primary first.
    pub fetched: Vec<String>,
    /// Project ids or filenames that could not be resolved or fetched.
    pub failed: Vec<String>,
}

impl ResolveReport {
    pub fn is_complete(&self) -> bool {
        self.primary_ok && self.failed.is_empty()
    }
}

/// Fetches a release and walks its required dependencies.
///
/// Traversal state lives in a per-call visited set, so a dependency that
/// shows up twice (or a cycle) is fetched once and then treated as satisfied.
pub struct DependencyResolver<'a> {
    registry: &'a dyn ModRegistry,
    compat: Compat,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a dyn ModRegistry, compat: Compat) -> Self {
        Self { registry, compat }
    }

    /// Fetch the primary file of `primary` into `output_dir`, then its
    /// dependencies. Never fails; partial success shows up in the report.
    pub async fn resolve_and_fetch(
        &self,
        primary: &Release,
        output_dir: &Path,
        force: bool,
    ) -> ResolveReport {
        let mut report = ResolveReport::default();

        let Some(file) = primary.primary_file() else {
            warn!(
                "No files for {} {} on {}",
                primary.project_id,
                primary.version_number,
                self.registry.source()
            );
            report.failed.push(primary.project_id.clone());
            return report;
        };

        if !self.registry.fetch(file, output_dir, force).await {
            report.failed.push(file.filename.clone());
            return report;
        }
        report.primary_ok = true;
        report.fetched.push(file.filename.clone());

        let mut visited = HashSet::new();
        visited.insert(primary.project_id.clone());
        self.resolve_dependencies(primary, output_dir, force, &mut visited, &mut report)
            .await;

        if !report.failed.is_empty() {
            warn!(
                "{} dependency(ies) of {} unresolved: {}",
                report.failed.len(),
                file.filename,
                report.failed.join(", ")
            );
        }
        report
    }

    /// Internal recursive walk.
    fn resolve_dependencies<'b>(
        &'b self,
        parent: &'b Release,
        output_dir: &'b Path,
        force: bool,
        visited: &'b mut HashSet<String>,
        report: &'b mut ResolveReport,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'b>> {
        Box::pin(async move {
            for dep in parent.required_dependencies() {
                if !visited.insert(dep.target_id.clone()) {
                    debug!("Dependency {} already satisfied", dep.target_id);
                    continue;
                }
                info!("Resolving dependency: {}", dep.target_id);

                let release = match &dep.target_version_id {
                    Some(version_id) => self.registry.get_release(&dep.target_id, version_id).await,
                    None => self
                        .registry
                        .dependency_candidates(&dep.target_id, parent, &self.compat)
                        .await
                        .into_iter()
                        .next(),
                };

                let Some(release) = release else {
                    warn!("No compatible release for dependency {}", dep.target_id);
                    report.failed.push(dep.target_id.clone());
                    continue;
                };

                let Some(file) = release.primary_file() else {
                    warn!("Dependency {} has no downloadable file", dep.target_id);
                    report.failed.push(dep.target_id.clone());
                    continue;
                };

                if !self.registry.fetch(file, output_dir, force).await {
                    report.failed.push(dep.target_id.clone());
                    continue;
                }
                report.fetched.push(file.filename.clone());

                if self.registry.supports_transitive() {
                    self.resolve_dependencies(&release, output_dir, force, visited, report)
                        .await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::core::registry::{
        ArtifactRef, Candidate, DependencyDeclaration, RegistrySource,
    };

    /// Registry backed by a fixed table of releases; "fetch" writes the file.
    struct TableRegistry {
        releases: HashMap<String, Release>,
        broken: HashSet<String>,
        transitive: bool,
        fetches: Mutex<Vec<String>>,
    }

    impl TableRegistry {
        fn new(transitive: bool) -> Self {
            Self {
                releases: HashMap::new(),
                broken: HashSet::new(),
                transitive,
                fetches: Mutex::new(vec![]),
            }
        }

        fn add(&mut self, project: &str, deps: &[&str]) -> Release {
            let release = Release {
                id: format!("{project}-v1"),
                project_id: project.into(),
                version_number: "1.0.0".into(),
                game_versions: vec!["1.21.5".into()],
                loaders: vec!["fabric".into()],
                published: String::new(),
                files: vec![ArtifactRef {
                    filename: format!("{project}-1.0.0.jar"),
                    source_url: format!("https://cdn.test/{project}"),
                    registry_id: project.into(),
                    size: None,
                    sha1: None,
                }],
                dependencies: deps
                    .iter()
                    .map(|d| DependencyDeclaration {
                        target_id: d.to_string(),
                        target_version_id: None,
                        required: true,
                    })
                    .collect(),
            };
            self.releases.insert(project.into(), release.clone());
            release
        }
    }

    #[async_trait]
    impl ModRegistry for TableRegistry {
        fn source(&self) -> RegistrySource {
            RegistrySource::CurseForge
        }

        async fn search(&self, _query: &str, _compat: &Compat, _limit: usize) -> Vec<Candidate> {
            vec![]
        }

        async fn get_releases(&self, project_id: &str, _compat: &Compat) -> Vec<Release> {
            self.releases.get(project_id).cloned().into_iter().collect()
        }

        async fn get_release(&self, project_id: &str, _release_id: &str) -> Option<Release> {
            self.releases.get(project_id).cloned()
        }

        async fn fetch(&self, file: &ArtifactRef, output_dir: &Path, _force: bool) -> bool {
            self.fetches.lock().unwrap().push(file.filename.clone());
            if self.broken.contains(&file.registry_id) {
                return false;
            }
            std::fs::write(output_dir.join(&file.filename), b"jar").is_ok()
        }

        fn supports_transitive(&self) -> bool {
            self.transitive
        }
    }

    #[tokio::test]
    async fn one_failing_dependency_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TableRegistry::new(false);
        registry.add("a", &[]);
        registry.add("b", &[]);
        registry.add("c", &[]);
        registry.broken.insert("b".into());
        let parent = registry.add("parent", &["a", "b", "c"]);

        let resolver = DependencyResolver::new(&registry, Compat::new("1.21.5", "fabric"));
        let report = resolver.resolve_and_fetch(&parent, dir.path(), false).await;

        assert!(report.primary_ok);
        assert_eq!(report.failed, vec!["b".to_string()]);
        assert!(dir.path().join("parent-1.0.0.jar").exists());
        assert!(dir.path().join("a-1.0.0.jar").exists());
        assert!(dir.path().join("c-1.0.0.jar").exists());
        assert!(!dir.path().join("b-1.0.0.jar").exists());
    }

    #[tokio::test]
    async fn missing_dependency_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TableRegistry::new(false);
        let parent = registry.add("parent", &["ghost"]);

        let resolver = DependencyResolver::new(&registry, Compat::default());
        let report = resolver.resolve_and_fetch(&parent, dir.path(), false).await;
        assert!(report.primary_ok);
        assert!(!report.is_complete());
        assert_eq!(report.failed, vec!["ghost".to_string()]);
    }

    #[tokio::test]
    async fn transitive_cycle_is_fetched_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TableRegistry::new(true);
        registry.add("x", &["y"]);
        registry.add("y", &["x", "parent"]);
        let parent = registry.add("parent", &["x"]);

        let resolver = DependencyResolver::new(&registry, Compat::default());
        let report = resolver.resolve_and_fetch(&parent, dir.path(), false).await;

        assert!(report.is_complete());
        assert_eq!(
            report.fetched,
            vec!["parent-1.0.0.jar", "x-1.0.0.jar", "y-1.0.0.jar"]
        );
        assert_eq!(registry.fetches.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn non_transitive_registry_stops_at_first_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TableRegistry::new(false);
        registry.add("x", &["y"]);
        registry.add("y", &[]);
        let parent = registry.add("parent", &["x"]);

        let resolver = DependencyResolver::new(&registry, Compat::default());
        let report = resolver.resolve_and_fetch(&parent, dir.path(), false).await;
        assert_eq!(report.fetched, vec!["parent-1.0.0.jar", "x-1.0.0.jar"]);
    }

    #[tokio::test]
    async fn failed_primary_skips_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TableRegistry::new(false);
        registry.add("a", &[]);
        let parent = registry.add("parent", &["a"]);
        registry.broken.insert("parent".into());

        let resolver = DependencyResolver::new(&registry, Compat::default());
        let report = resolver.resolve_and_fetch(&parent, dir.path(), false).await;
        assert!(!report.primary_ok);
        assert!(report.fetched.is_empty());
        assert_eq!(registry.fetches.lock().unwrap().len(), 1);
    }
}

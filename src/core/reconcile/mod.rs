//! Reconciliation of a local mods directory.
//!
//! Passes run in a fixed order and each one re-reads the directory:
//! filename normalization, parenthesized-copy removal, duplicate pruning by
//! base identity, denylist filtering. Running twice is a no-op the second
//! time.

mod denylist;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

pub use denylist::Denylist;

use crate::core::error::{PackError, PackResult};
use crate::core::version::{base_identity, compare, VersionOrder, MOD_EXTENSION};

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// `(from, to)` filename pairs.
    pub renamed: Vec<(String, String)>,
    pub removed_copies: Vec<String>,
    pub removed_duplicates: Vec<String>,
    pub removed_denied: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.renamed.is_empty()
            && self.removed_copies.is_empty()
            && self.removed_duplicates.is_empty()
            && self.removed_denied.is_empty()
    }

    pub fn removed_count(&self) -> usize {
        self.removed_copies.len() + self.removed_duplicates.len() + self.removed_denied.len()
    }
}

/// Bring `dir` to its reconciled state. A missing directory is left alone.
pub fn reconcile(dir: &Path, denylist: &Denylist) -> PackResult<ReconcileReport> {
    let mut report = ReconcileReport::default();
    if !dir.is_dir() {
        warn!("Mods directory {:?} does not exist, nothing to reconcile", dir);
        return Ok(report);
    }

    info!("Reconciling {:?}", dir);
    normalize_names(dir, &mut report)?;
    remove_parenthesized(dir, &mut report)?;
    prune_duplicates(dir, &mut report)?;
    apply_denylist(dir, denylist, &mut report)?;

    info!(
        "Reconciled {:?}: {} renamed, {} removed",
        dir,
        report.renamed.len(),
        report.removed_count()
    );
    Ok(report)
}

/// Sorted mod filenames currently in `dir`.
fn list_mods(dir: &Path) -> PackResult<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(PackError::io_at(dir))?
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| n.ends_with(MOD_EXTENSION))
        .collect();
    names.sort();
    Ok(names)
}

fn remove(dir: &Path, filename: &str) -> PackResult<()> {
    let path = dir.join(filename);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PackError::Io { path, source: e }),
    }
}

/// Spaces in mod filenames become hyphens.
fn normalize_names(dir: &Path, report: &mut ReconcileReport) -> PackResult<()> {
    for name in list_mods(dir)? {
        if !name.contains(' ') {
            continue;
        }
        let fixed = name.replace(' ', "-");
        let target = dir.join(&fixed);
        if target.exists() {
            debug!("Not renaming {}: {} already exists", name, fixed);
            continue;
        }
        fs::rename(dir.join(&name), &target).map_err(PackError::io_at(&target))?;
        info!("Renamed {} -> {}", name, fixed);
        report.renamed.push((name, fixed));
    }
    Ok(())
}

/// `mod (1).jar` style copies left behind by browsers and file managers.
fn remove_parenthesized(dir: &Path, report: &mut ReconcileReport) -> PackResult<()> {
    for name in list_mods(dir)? {
        if name.contains('(') && name.contains(')') {
            remove(dir, &name)?;
            info!("Removed copy {}", name);
            report.removed_copies.push(name);
        }
    }
    Ok(())
}

/// Keep one file per base identity.
fn prune_duplicates(dir: &Path, report: &mut ReconcileReport) -> PackResult<()> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in list_mods(dir)? {
        if let Some(identity) = base_identity(&name) {
            groups.entry(identity).or_default().push(name);
        }
    }

    for (identity, members) in groups {
        if members.len() < 2 {
            continue;
        }
        let Some(newest) = pick_newest(&members) else {
            continue;
        };
        info!(
            "{} versions of {}: keeping {}",
            members.len(),
            identity,
            newest
        );
        for member in members.iter().filter(|m| *m != newest) {
            remove(dir, member)?;
            debug!("Removed duplicate {}", member);
            report.removed_duplicates.push(member.clone());
        }
    }
    Ok(())
}

/// Start from the lexicographically last name, then let every member that
/// compares newer than some other member take over. The last promotion wins,
/// so the result depends on listing order when versions do not form a chain.
pub fn pick_newest(members: &[String]) -> Option<&str> {
    let mut newest = members.iter().max()?.as_str();
    for member in members {
        for other in members {
            if member != other && compare(member, other) == VersionOrder::Newer {
                newest = member.as_str();
            }
        }
    }
    Some(newest)
}

fn apply_denylist(dir: &Path, denylist: &Denylist, report: &mut ReconcileReport) -> PackResult<()> {
    if denylist.is_empty() {
        return Ok(());
    }
    for name in list_mods(dir)? {
        if let Some(pattern) = denylist.matching(&name) {
            remove(dir, &name)?;
            info!("Removed {} (matches denylist entry '{}')", name, pattern);
            report.removed_denied.push(name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), b"jar").unwrap();
        }
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn duplicates_keep_the_newest_version() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "lithium-fabric-0.15.0+mc1.21.4.jar",
                "lithium-fabric-0.16.2+mc1.21.5.jar",
                "fabric-api-0.119.2+1.21.5.jar",
                "fabric-api-0.120.0+1.21.5.jar",
                "unknownmod.jar",
            ],
        );

        let report = reconcile(dir.path(), &Denylist::default()).unwrap();
        assert_eq!(report.removed_duplicates.len(), 2);
        assert_eq!(
            listing(dir.path()),
            vec![
                "fabric-api-0.120.0+1.21.5.jar",
                "lithium-fabric-0.16.2+mc1.21.5.jar",
                "unknownmod.jar",
            ]
        );
    }

    #[test]
    fn numeric_ordering_beats_lexicographic() {
        let members = vec!["mod-1.10.0.jar".to_string(), "mod-1.9.0.jar".to_string()];
        assert_eq!(pick_newest(&members), Some("mod-1.10.0.jar"));
    }

    #[test]
    fn incomparable_group_keeps_lexicographically_last() {
        let members = vec!["mod-alpha-1.jar".to_string(), "mod-beta-1.jar".to_string()];
        assert_eq!(pick_newest(&members), Some("mod-beta-1.jar"));
    }

    #[test]
    fn denied_identity_goes_even_with_several_versions() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "iris-fabric-1.8.0.jar",
                "iris-fabric-1.8.1.jar",
                "iris-fabric-1.9.0.jar",
                "ok-1.0.0.jar",
            ],
        );

        let report = reconcile(dir.path(), &Denylist::from_patterns(["iris"])).unwrap();
        assert_eq!(report.removed_duplicates.len(), 2);
        assert_eq!(report.removed_denied, vec!["iris-fabric-1.9.0.jar".to_string()]);
        assert_eq!(listing(dir.path()), vec!["ok-1.0.0.jar"]);
    }

    #[test]
    fn parenthesized_copies_and_denied_mods_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "ferritecore-7.1.1-fabric (1).jar",
                "ferritecore-7.1.1-fabric.jar",
                "sodium-fabric-0.6.12+mc1.21.5.jar",
                "notes (old).txt",
            ],
        );

        let report = reconcile(dir.path(), &Denylist::from_patterns(["sodium"])).unwrap();
        assert_eq!(report.removed_copies, vec!["ferritecore-7.1.1-fabric-(1).jar"]);
        assert_eq!(report.removed_denied, vec!["sodium-fabric-0.6.12+mc1.21.5.jar"]);
        assert_eq!(
            listing(dir.path()),
            vec!["ferritecore-7.1.1-fabric.jar", "notes (old).txt"]
        );
    }

    #[test]
    fn spaces_are_normalized_to_hyphens() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["BiomeSpreader-1.5.0 mc1.21.5.jar"]);

        let report = reconcile(dir.path(), &Denylist::default()).unwrap();
        assert_eq!(
            report.renamed,
            vec![(
                "BiomeSpreader-1.5.0 mc1.21.5.jar".to_string(),
                "BiomeSpreader-1.5.0-mc1.21.5.jar".to_string()
            )]
        );
        assert!(dir.path().join("BiomeSpreader-1.5.0-mc1.21.5.jar").exists());
    }

    #[test]
    fn second_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "mod-1.2.jar",
                "mod-1.2.0.1.jar",
                "Zoomify-2.14.2+1.21.5.jar",
                "copy (2).jar",
                "spaced name-1.0.0.jar",
            ],
        );
        let denylist = Denylist::builtin();

        let first = reconcile(dir.path(), &denylist).unwrap();
        assert!(!first.is_noop());
        let after_first = listing(dir.path());

        let second = reconcile(dir.path(), &denylist).unwrap();
        assert!(second.is_noop());
        assert_eq!(listing(dir.path()), after_first);
        assert!(after_first.contains(&"mod-1.2.0.1.jar".to_string()));
        assert!(!after_first.contains(&"mod-1.2.jar".to_string()));
    }

    #[test]
    fn missing_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let report = reconcile(&dir.path().join("absent"), &Denylist::builtin()).unwrap();
        assert!(report.is_noop());
    }
}

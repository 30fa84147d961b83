// ─── Version Comparator ───
// Decides whether one artifact filename is a newer release than another.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Ordered extraction patterns; the first one that matches wins.
static VERSION_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"-(\d+\.\d+(?:\.\d+){0,2})").expect("valid version pattern"),
        Regex::new(r"fabric-(\d+\.\d+(?:\.\d+){0,2})").expect("valid version pattern"),
        Regex::new(r"-v(\d+\.\d+(?:\.\d+){0,2})").expect("valid version pattern"),
    ]
});

/// Outcome of comparing a candidate filename against an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrder {
    /// The candidate is the newer release.
    Newer,
    /// The existing file is the newer release.
    Older,
    /// Both carry the same version string.
    Same,
    /// No decision possible; callers must not replace.
    Incomparable,
}

/// Pull the dotted version out of a filename (`mod-1.2.3+mc1.21.jar` → `1.2.3`).
pub fn extract_version(filename: &str) -> Option<&str> {
    VERSION_PATTERNS
        .iter()
        .find_map(|re| re.captures(filename))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Compare `candidate` against `existing` by the versions in their names.
pub fn compare(candidate: &str, existing: &str) -> VersionOrder {
    let (Some(new), Some(old)) = (extract_version(candidate), extract_version(existing)) else {
        return VersionOrder::Incomparable;
    };

    if new == old {
        return VersionOrder::Same;
    }

    let new_parts: Vec<&str> = new.split('.').collect();
    let old_parts: Vec<&str> = old.split('.').collect();

    for (n, o) in new_parts.iter().zip(old_parts.iter()) {
        // Segments that do not parse are skipped without deciding.
        let (Ok(n), Ok(o)) = (n.parse::<u64>(), o.parse::<u64>()) else {
            continue;
        };
        if n > o {
            return VersionOrder::Newer;
        }
        if n < o {
            return VersionOrder::Older;
        }
    }

    match new_parts.len().cmp(&old_parts.len()) {
        std::cmp::Ordering::Greater => VersionOrder::Newer,
        std::cmp::Ordering::Less => VersionOrder::Older,
        std::cmp::Ordering::Equal => VersionOrder::Incomparable,
    }
}

/// True when `candidate` should take the place of the file at `existing`:
/// either nothing is there yet or the candidate is strictly newer.
pub fn should_replace(candidate: &str, existing: &Path) -> bool {
    if !existing.exists() {
        return true;
    }
    let existing_name = existing
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    compare(candidate, &existing_name) == VersionOrder::Newer
}

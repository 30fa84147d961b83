// ─── Filename Classifier ───
// Maps a release filename to the key shared by every release of that mod.

use std::sync::LazyLock;

use regex::Regex;

/// `lithium-fabric-0.16.2` → `lithium`
static NAME_THEN_FABRIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z0-9_-]+)-fabric").expect("valid identity pattern"));

/// `fabric-language-kotlin-1.13.2` → `fabric-language-kotlin`; stops at the first
/// segment that starts with a digit.
static FABRIC_THEN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^fabric-([a-z0-9_]+(?:-[a-z_][a-z0-9_]*)*)").expect("valid identity pattern")
});

/// `ferritecore-7.1.1` → `ferritecore`
static NAME_THEN_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z0-9_-]+)-\d").expect("valid identity pattern"));

pub const MOD_EXTENSION: &str = ".jar";

/// Derive the base identity of a mod filename, or `None` when no rule
/// applies. Matching is case-insensitive.
pub fn base_identity(filename: &str) -> Option<String> {
    let lowered = filename.to_lowercase();
    let name = lowered.strip_suffix(MOD_EXTENSION).unwrap_or(&lowered);

    if let Some(caps) = NAME_THEN_FABRIC.captures(name) {
        return Some(caps[1].to_string());
    }

    if let Some(caps) = FABRIC_THEN_NAME.captures(name) {
        return Some(format!("fabric-{}", &caps[1]));
    }

    if let Some(caps) = NAME_THEN_VERSION.captures(name) {
        return Some(caps[1].to_string());
    }

    if name.contains("api") && name.contains("fabric-api") {
        return Some("fabric-api".to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_suffix_is_stripped() {
        assert_eq!(
            base_identity("sodium-fabric-0.6.12+mc1.21.5.jar").as_deref(),
            Some("sodium")
        );
        assert_eq!(
            base_identity("Lithium-Fabric-0.16.2+mc1.21.5.jar").as_deref(),
            Some("lithium")
        );
    }

    #[test]
    fn fabric_prefixed_names_keep_prefix() {
        assert_eq!(
            base_identity("fabric-api-0.120.0+1.21.5.jar").as_deref(),
            Some("fabric-api")
        );
        assert_eq!(
            base_identity("fabric-language-kotlin-1.13.2+kotlin.2.1.20.jar").as_deref(),
            Some("fabric-language-kotlin")
        );
    }

    #[test]
    fn plain_versioned_names() {
        assert_eq!(base_identity("ferritecore-7.1.1.jar").as_deref(), Some("ferritecore"));
        assert_eq!(
            base_identity("cloth-config-18.0.145.jar").as_deref(),
            Some("cloth-config")
        );
    }

    #[test]
    fn fabric_api_fallback() {
        assert_eq!(base_identity("my.fabric-api.jar").as_deref(), Some("fabric-api"));
    }

    #[test]
    fn unknown_shape_has_no_identity() {
        assert_eq!(base_identity("random.jar"), None);
        assert_eq!(base_identity("Mod With Spaces.jar"), None);
    }
}

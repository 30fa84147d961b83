// ─── Bundle Manifest ───
// `modrinth.index.json`, the index at the root of every `.mrpack`.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::core::version::MOD_EXTENSION;

/// Fixed location of the manifest inside the archive.
pub const MANIFEST_PATH: &str = "modrinth.index.json";

/// The only manifest format this crate understands.
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

pub const BUNDLE_EXTENSION: &str = ".mrpack";

/// Deployment side a bundle is being installed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Server,
    Client,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Server => f.write_str("server"),
            Side::Client => f.write_str("client"),
        }
    }
}

/// Per-side support level of a bundle entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum Support {
    #[default]
    Required,
    Optional,
    Unsupported,
    Unknown(String),
}

impl From<String> for Support {
    fn from(value: String) -> Self {
        match value.as_str() {
            "required" | "supported" => Support::Required,
            "optional" => Support::Optional,
            "unsupported" => Support::Unsupported,
            _ => Support::Unknown(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnvSupport {
    #[serde(default)]
    pub client: Support,
    #[serde(default)]
    pub server: Support,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub path: String,
    #[serde(default)]
    pub env: EnvSupport,
    #[serde(default)]
    pub downloads: Vec<String>,
    #[serde(default)]
    pub hashes: HashMap<String, String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

impl BundleEntry {
    /// Entry is a mod binary (`.jar` under a `mods/` directory).
    pub fn is_mod(&self) -> bool {
        self.path.ends_with(MOD_EXTENSION) && self.path.contains("mods/")
    }

    /// Last path component.
    pub fn filename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn support_for(&self, side: Side) -> &Support {
        match side {
            Side::Server => &self.env.server,
            Side::Client => &self.env.client,
        }
    }

    pub fn sha1(&self) -> Option<&str> {
        self.hashes.get("sha1").map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    pub format_version: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version_id: Option<String>,
    /// `minecraft`, `fabric-loader`, `forge`, ... → version.
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default)]
    pub files: Vec<BundleEntry>,
}

impl BundleManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn is_supported_format(&self) -> bool {
        self.format_version == SUPPORTED_FORMAT_VERSION
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Modpack")
    }

    pub fn minecraft_version(&self) -> Option<&str> {
        self.dependencies.get("minecraft").map(String::as_str)
    }

    /// First declared loader, as `(name, version)`.
    pub fn loader(&self) -> Option<(&str, &str)> {
        ["fabric-loader", "fabric", "quilt-loader", "forge", "neoforge"]
            .iter()
            .find_map(|key| {
                self.dependencies
                    .get(*key)
                    .map(|v| (*key, v.as_str()))
            })
    }

    pub fn mod_entries(&self) -> impl Iterator<Item = &BundleEntry> {
        self.files.iter().filter(|e| e.is_mod())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"{
        "formatVersion": 1,
        "game": "minecraft",
        "versionId": "2.1.0",
        "name": "Adventure Lite",
        "dependencies": {"minecraft": "1.21.5", "fabric-loader": "0.16.13"},
        "files": [
            {
                "path": "mods/sodium-fabric-0.6.12+mc1.21.5.jar",
                "hashes": {"sha1": "aa", "sha512": "bb"},
                "env": {"client": "required", "server": "unsupported"},
                "downloads": ["https://cdn.modrinth.com/sodium.jar"],
                "fileSize": 1024
            },
            {
                "path": "mods/lithium-fabric-0.16.2+mc1.21.5.jar",
                "downloads": ["https://cdn.modrinth.com/lithium.jar"]
            },
            {
                "path": "resourcepacks/faithful.zip",
                "env": {"client": "optional", "server": "optional"},
                "downloads": []
            }
        ]
    }"#;

    #[test]
    fn parses_modrinth_index() {
        let manifest = BundleManifest::parse(INDEX.as_bytes()).unwrap();
        assert!(manifest.is_supported_format());
        assert_eq!(manifest.display_name(), "Adventure Lite");
        assert_eq!(manifest.minecraft_version(), Some("1.21.5"));
        assert_eq!(manifest.loader(), Some(("fabric-loader", "0.16.13")));
        assert_eq!(manifest.mod_entries().count(), 2);

        let sodium = &manifest.files[0];
        assert_eq!(sodium.filename(), "sodium-fabric-0.6.12+mc1.21.5.jar");
        assert_eq!(sodium.support_for(Side::Server), &Support::Unsupported);
        assert_eq!(sodium.support_for(Side::Client), &Support::Required);
        assert_eq!(sodium.sha1(), Some("aa"));

        let lithium = &manifest.files[1];
        assert_eq!(lithium.support_for(Side::Server), &Support::Required);
    }

    #[test]
    fn supported_alias_and_unknown_values() {
        let env: EnvSupport =
            serde_json::from_str(r#"{"client": "supported", "server": "maybe"}"#).unwrap();
        assert_eq!(env.client, Support::Required);
        assert_eq!(env.server, Support::Unknown("maybe".into()));
    }

    #[test]
    fn missing_format_version_is_an_error() {
        assert!(BundleManifest::parse(br#"{"files": []}"#).is_err());
        assert!(BundleManifest::parse(b"not json").is_err());
    }
}

//! Pipeline configuration.
//!
//! Loaded from `modforge.json`; every field has a default, so a missing file
//! or a partial one is fine. API keys can also come from the environment,
//! which wins over the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::{PackError, PackResult};
use crate::core::progress::PROGRESS_FILE;
use crate::core::reconcile::Denylist;
use crate::core::registry::{Compat, SourceSelection};
use crate::core::version::base_identity;

pub const CONFIG_FILE: &str = "modforge.json";
const APP_DIR_NAME: &str = "modforge";

pub const MODRINTH_KEY_ENV: &str = "MODRINTH_API_KEY";
pub const CURSEFORGE_KEY_ENV: &str = "CURSEFORGE_API_KEY";

/// One registry search inside a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySearch {
    pub label: String,
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    1
}

/// A named batch of searches whose completion is tracked in the progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub searches: Vec<CategorySearch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    pub root_dir: PathBuf,
    /// Server mods directory; `<root>/server/mods` when unset.
    pub mods_dir: Option<PathBuf>,
    /// `<root>/mod_cache` when unset.
    pub cache_dir: Option<PathBuf>,
    /// `<root>/modpack_profiles` when unset.
    pub profiles_dir: Option<PathBuf>,

    pub mc_version: String,
    pub loader: String,
    pub loader_version: String,

    pub search_source: SourceSelection,
    pub modrinth_api_key: Option<String>,
    pub curseforge_api_key: Option<String>,
    pub http_timeout_secs: u64,

    /// Pattern file for reconciliation; the built-in list is used when unset.
    pub denylist_file: Option<PathBuf>,
    /// Files kept when the mods directory is wiped and never searched for.
    pub pinned_mods: Vec<String>,

    pub pack_title: String,
    pub default_profile: String,
    pub categories: Vec<Category>,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            mods_dir: None,
            cache_dir: None,
            profiles_dir: None,
            mc_version: "1.21.5".into(),
            loader: "fabric".into(),
            loader_version: "0.16.13".into(),
            search_source: SourceSelection::Modrinth,
            modrinth_api_key: None,
            curseforge_api_key: None,
            http_timeout_secs: 30,
            denylist_file: None,
            pinned_mods: vec!["fabric-api-1.21.5.jar".into()],
            pack_title: "Adventure Minecraft".into(),
            default_profile: "adventure_pack.txt".into(),
            categories: default_categories(),
        }
    }
}

impl PackConfig {
    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> PackResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };

        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(PackError::io_at(&path))?;
            let parsed: PackConfig = serde_json::from_str(&raw)
                .map_err(|e| PackError::Config(format!("{}: {e}", path.display())))?;
            info!("Loaded configuration from {:?}", path);
            parsed
        } else {
            debug!("No configuration at {:?}, using defaults", path);
            PackConfig::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(key) = non_empty_env(MODRINTH_KEY_ENV) {
            self.modrinth_api_key = Some(key);
        }
        if let Some(key) = non_empty_env(CURSEFORGE_KEY_ENV) {
            self.curseforge_api_key = Some(key);
        }
    }

    pub fn validate(&self) -> PackResult<()> {
        if self.mc_version.trim().is_empty() {
            return Err(PackError::Config("mc_version must not be empty".into()));
        }
        if self.loader.trim().is_empty() {
            return Err(PackError::Config("loader must not be empty".into()));
        }
        if self.http_timeout_secs == 0 {
            return Err(PackError::Config("http_timeout_secs must be positive".into()));
        }
        let mut names = std::collections::HashSet::new();
        for category in &self.categories {
            if !names.insert(category.name.as_str()) {
                return Err(PackError::Config(format!(
                    "category '{}' defined twice",
                    category.name
                )));
            }
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> PackResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(PackError::io_at(parent))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(PackError::io_at(path))?;
        Ok(())
    }

    // ── Derived paths ───────────────────────────────────

    pub fn mods_dir(&self) -> PathBuf {
        self.mods_dir
            .clone()
            .unwrap_or_else(|| self.server_dir().join("mods"))
    }

    /// Root that server-side bundle overrides are extracted into.
    pub fn server_dir(&self) -> PathBuf {
        match &self.mods_dir {
            Some(mods) => mods
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.root_dir.join("server")),
            None => self.root_dir.join("server"),
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join("mod_cache"))
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.profiles_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join("modpack_profiles"))
    }

    pub fn progress_file(&self) -> PathBuf {
        self.cache_dir().join(PROGRESS_FILE)
    }

    pub fn client_pack_dir(&self) -> PathBuf {
        self.root_dir.join("client_pack")
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(name)
    }

    // ── Derived values ──────────────────────────────────

    pub fn compat(&self) -> Compat {
        Compat::new(&self.mc_version, &self.loader)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Pinned by exact name, or another release of a pinned mod.
    pub fn is_pinned(&self, filename: &str) -> bool {
        let identity = base_identity(filename);
        self.pinned_mods
            .iter()
            .any(|p| p == filename || (identity.is_some() && base_identity(p) == identity))
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn load_denylist(&self) -> PackResult<Denylist> {
        match &self.denylist_file {
            Some(path) => Denylist::load(path),
            None => Ok(Denylist::builtin()),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE)
}

fn default_root_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn search(label: &str, query: &str, limit: usize) -> CategorySearch {
    CategorySearch {
        label: label.into(),
        query: query.into(),
        limit,
    }
}

fn category(name: &str, searches: Vec<CategorySearch>) -> Category {
    Category {
        name: name.into(),
        searches,
    }
}

/// Category table of the adventure pack. Fabric API is pinned to a static
/// jar, so `essential-dependencies` searches nothing.
pub fn default_categories() -> Vec<Category> {
    vec![
        category("essential-dependencies", vec![]),
        category(
            "performance-mods",
            vec![
                search("Performance Mods", "lithium", 1),
                search("Performance Mods", "ferrite", 1),
                search("Performance Mods", "starlight", 1),
                search("Performance Mods", "entityculling", 1),
                search("Performance Mods", "memo", 1),
                search("Performance Mods", "lazyDFU", 1),
                search("Performance Mods", "immediatelyfast", 1),
            ],
        ),
        category("adventure-mods", vec![search("Adventure Mods", "adventure", 5)]),
        category(
            "high-quality-mods",
            vec![
                search("Better Combat", "bettercombat", 1),
                search("Better Villages", "villager", 3),
                search("Grind Mods", "grind", 2),
                search("RPG", "rpg", 3),
            ],
        ),
        category(
            "world-generation-mods",
            vec![
                search("World Generation", "terrain", 3),
                search("World Generation", "biome", 3),
                search("World Generation", "structure", 3),
                search("World Generation", "exploration", 3),
            ],
        ),
        category(
            "dungeon-exploration-mods",
            vec![
                search("Dungeons", "dungeon", 5),
                search("Exploration", "exploration", 5),
                search("Ruins", "ruins", 3),
            ],
        ),
        category(
            "quest-mods",
            vec![search("Quest Mods", "quest", 3), search("Quest Mods", "mission", 2)],
        ),
        category(
            "boss-combat-mods",
            vec![search("Boss Mods", "boss", 3), search("Combat Mods", "weapon", 3)],
        ),
        category(
            "animal-creature-mods",
            vec![
                search("Animals", "animals", 3),
                search("Mobs", "creature", 3),
                search("Mobs", "monster", 3),
            ],
        ),
        category(
            "item-equipment-mods",
            vec![
                search("Items", "item", 3),
                search("Equipment", "equipment", 3),
                search("Tools", "tools", 3),
            ],
        ),
        category(
            "qol-mods",
            vec![
                search("QoL", "crafting", 2),
                search("QoL", "minimap", 1),
                search("QoL", "map", 2),
            ],
        ),
        category(
            "furniture-decoration-mods",
            vec![
                search("Furniture", "furniture", 5),
                search("Decoration", "decoration", 5),
                search("Polymer", "polymer", 2),
                search("Furniture Kits", "kits", 3),
                search("Chairs", "chairs", 2),
                search("Tables", "tables", 2),
            ],
        ),
        category(
            "required-dependencies",
            vec![
                search("Dependencies", "collective", 1),
                search("Dependencies", "cloth-config fabric", 1),
                search("Dependencies", "extended_drawers", 1),
                search("Dependencies", "quad", 1),
            ],
        ),
    ]
}

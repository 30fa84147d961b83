//! Declarative mod lists.
//!
//! One entry per line, `[role] filename`; `#` lines and blank lines are
//! ignored.
//!
//! ```text
//! # --- Mods ---
//! [shared] lithium-fabric-0.16.2+mc1.21.5.jar
//! [client] sodium-fabric-0.6.12+mc1.21.5.jar
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::{info, warn};

use crate::core::bundle::BUNDLE_EXTENSION;
use crate::core::error::{PackError, PackResult};
use crate::core::version::MOD_EXTENSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModRole {
    /// Installed on the server only.
    Server,
    /// Shipped to players only.
    Client,
    /// Needed on both sides.
    Shared,
}

impl ModRole {
    pub fn on_server(self) -> bool {
        matches!(self, ModRole::Server | ModRole::Shared)
    }

    pub fn on_client(self) -> bool {
        matches!(self, ModRole::Client | ModRole::Shared)
    }
}

impl fmt::Display for ModRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModRole::Server => "server",
            ModRole::Client => "client",
            ModRole::Shared => "shared",
        })
    }
}

impl FromStr for ModRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(ModRole::Server),
            "client" => Ok(ModRole::Client),
            "shared" => Ok(ModRole::Shared),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub role: ModRole,
    pub filename: String,
    /// 1-based line in the source file.
    pub line: usize,
}

impl ProfileEntry {
    pub fn is_bundle(&self) -> bool {
        self.filename.ends_with(BUNDLE_EXTENSION)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub entries: Vec<ProfileEntry>,
}

impl Profile {
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((role, filename)) = line
                .strip_prefix('[')
                .and_then(|rest| rest.split_once(']'))
            else {
                warn!("Profile line {} is not '[role] filename': {}", line_no, line);
                continue;
            };

            let filename = filename.trim();
            if filename.is_empty() {
                warn!("Profile line {} has no filename", line_no);
                continue;
            }

            match role.trim().parse::<ModRole>() {
                Ok(role) => entries.push(ProfileEntry {
                    role,
                    filename: filename.to_string(),
                    line: line_no,
                }),
                Err(e) => warn!("Profile line {}: {}, skipping", line_no, e),
            }
        }

        Self { entries }
    }

    pub fn load(path: &Path) -> PackResult<Self> {
        let text = fs::read_to_string(path).map_err(PackError::io_at(path))?;
        let profile = Self::parse(&text);
        info!("Loaded {} profile entries from {:?}", profile.entries.len(), path);
        Ok(profile)
    }

    pub fn with_role(&self, role: ModRole) -> impl Iterator<Item = &ProfileEntry> {
        self.entries.iter().filter(move |e| e.role == role)
    }

    /// Entries a client pack ships, first occurrence of each filename only.
    pub fn client_entries(&self) -> Vec<&ProfileEntry> {
        let mut seen = std::collections::HashSet::new();
        self.entries
            .iter()
            .filter(|e| e.role.on_client())
            .filter(|e| seen.insert(e.filename.as_str()))
            .collect()
    }
}

/// Write a profile listing every mod and bundle in `mods_dir` as `[shared]`.
/// An existing profile is left untouched; returns whether one was written.
pub fn write_from_directory(profile_path: &Path, mods_dir: &Path, title: &str) -> PackResult<bool> {
    if profile_path.exists() {
        info!("Using existing mod list from {:?}", profile_path);
        return Ok(false);
    }

    let mut names: Vec<String> = match fs::read_dir(mods_dir) {
        Ok(entries) => entries
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.ends_with(MOD_EXTENSION) || n.ends_with(BUNDLE_EXTENSION))
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            return Err(PackError::Io {
                path: mods_dir.to_path_buf(),
                source: e,
            })
        }
    };
    names.sort();

    let mut text = format!(
        "# {title}\n\
         # This file lists the mods of this modpack\n\
         #\n\
         # Mod roles:\n\
         # [server] - Server-side only mods\n\
         # [client] - Client-side only mods\n\
         # [shared] - Mods needed on both server and client\n\n\
         # --- Mods ---\n"
    );
    for name in &names {
        text.push_str(&format!("[shared] {name}\n"));
    }

    if let Some(parent) = profile_path.parent() {
        fs::create_dir_all(parent).map_err(PackError::io_at(parent))?;
    }
    fs::write(profile_path, text).map_err(PackError::io_at(profile_path))?;
    info!("Wrote profile {:?} with {} entries", profile_path, names.len());
    Ok(true)
}

/// Registry search term guessed from a filename: its first hyphen-separated
/// token, lowercased.
pub fn search_term_for(filename: &str) -> String {
    filename
        .split('-')
        .next()
        .unwrap_or(filename)
        .to_lowercase()
}

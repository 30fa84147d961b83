use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{PackError, PackResult};

pub const PROGRESS_FILE: &str = "download_progress.json";

/// Which categories have been fully downloaded, persisted as
/// `{"categories": {"performance-mods": true}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(default)]
    pub categories: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    path: PathBuf,
}

impl ProgressRecord {
    /// Read the record at `path`. A missing or unreadable file yields an
    /// empty record bound to the same path.
    pub fn load(path: &Path) -> Self {
        let mut record = match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str::<ProgressRecord>(&text).unwrap_or_else(|e| {
                warn!("Ignoring corrupt progress file {:?}: {}", path, e);
                ProgressRecord::default()
            }),
            Err(_) => ProgressRecord::default(),
        };
        record.path = path.to_path_buf();
        record
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> PackResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(PackError::io_at(parent))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&self.path, json).map_err(PackError::io_at(&self.path))?;
        debug!("Saved progress to {:?}", self.path);
        Ok(())
    }

    pub fn is_complete(&self, category: &str) -> bool {
        self.categories.get(category).copied().unwrap_or(false)
    }

    /// Mark `category` done and persist immediately.
    pub fn mark_complete(&mut self, category: &str) -> PackResult<()> {
        self.categories.insert(category.to_string(), true);
        self.updated_at = Some(Utc::now());
        self.save()
    }

    /// Forget every category and persist the empty record.
    pub fn reset(&mut self) -> PackResult<()> {
        self.categories.clear();
        self.updated_at = Some(Utc::now());
        self.save()
    }
}

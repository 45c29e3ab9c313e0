//! Set of already-delivered item urls, persisted as a JSON array.

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/<name>_cache.json`
    pub fn for_profile(dir: &Path, name: &str) -> Self {
        Self::new(dir.join(format!("{name}_cache.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: missing, unreadable, corrupt or non-array files load as empty.
    pub fn load(&self) -> HashSet<String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(target: "pipeline", path = %self.path.display(), "no cache yet; starting empty");
                return HashSet::new();
            }
            Err(e) => {
                tracing::warn!(target: "pipeline", path = %self.path.display(), error = ?e, "cache unreadable; starting empty");
                return HashSet::new();
            }
        };

        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Array(entries)) => entries
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            Ok(_) => {
                tracing::warn!(target: "pipeline", path = %self.path.display(), "cache is not a JSON array; starting empty");
                HashSet::new()
            }
            Err(e) => {
                tracing::warn!(target: "pipeline", path = %self.path.display(), error = ?e, "cache is corrupt; starting empty");
                HashSet::new()
            }
        }
    }

    /// Whole-file overwrite via a sibling temp file + rename.
    pub fn save(&self, urls: &HashSet<String>) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating cache dir {}", dir.display()))?;
        }

        let sorted: BTreeSet<&String> = urls.iter().collect();
        let json = serde_json::to_string_pretty(&sorted).context("serializing cache")?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing cache {}", self.path.display()))?;

        tracing::info!(target: "pipeline", path = %self.path.display(), entries = urls.len(), "cache saved");
        Ok(())
    }
}

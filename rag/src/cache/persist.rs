//! JSON snapshot of cache entries.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{RagError, Result};

use super::CacheEntry;

/// Reads a snapshot written by [`save`]. A missing file yields no entries.
pub(super) fn load(path: &Path) -> Result<Vec<CacheEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).map_err(|source| RagError::Persistence {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: BTreeMap<String, CacheEntry> =
        serde_json::from_str(&contents).map_err(|e| RagError::Serialization(e.to_string()))?;
    Ok(entries
        .into_iter()
        .map(|(key, mut entry)| {
            entry.key = key;
            entry
        })
        .collect())
}

/// Writes `entries` as a pretty-printed JSON object keyed by fingerprint.
pub(super) fn save(path: &Path, entries: Vec<CacheEntry>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| RagError::Persistence {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let snapshot: BTreeMap<String, CacheEntry> = entries
        .into_iter()
        .map(|entry| (entry.key.clone(), entry))
        .collect();
    let contents = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| RagError::Serialization(e.to_string()))?;
    fs::write(path, contents).map_err(|source| RagError::Persistence {
        path: path.to_path_buf(),
        source,
    })
}

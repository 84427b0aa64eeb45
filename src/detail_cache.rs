//! Persistent minifigure cache keyed by normalized set number.
//!
//! The cache makes enrichment resumable: every resolved set is written back to disk
//! before the next one is processed, so an interrupted run loses at most the set in
//! flight. The file belongs to one enricher process at a time. Two enrichers sharing
//! a cache file overwrite each other's entries (last writer wins).

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::catalog::{NormalizedKey, SubItem};
use crate::json_store::{self, StoreError};

/// On-disk figure record. Older caches stored bare figure names.
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum StoredSubItem {
    Record {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        image: Option<String>,
    },
    Bare(String),
}

impl StoredSubItem {
    fn into_sub_item(self) -> Option<SubItem> {
        let (id, name, image) = match self {
            Self::Record { id, name, image } => {
                let id = id.as_deref().map(str::trim).filter(|id| !id.is_empty());
                let name = name.as_deref().map(str::trim).filter(|name| !name.is_empty());
                let id = id.or(name)?.to_string();
                let name = name.map(str::to_string).unwrap_or_else(|| id.clone());
                (id, name, image.unwrap_or_default().trim().to_string())
            }
            Self::Bare(value) => {
                let value = value.trim();
                if value.is_empty() {
                    return None;
                }
                (value.to_string(), value.to_string(), String::new())
            }
        };
        Some(SubItem { id, name, image })
    }
}

pub struct DetailCache {
    path: PathBuf,
    entries: BTreeMap<String, Vec<SubItem>>,
}

impl DetailCache {
    /// Loads the cache at `path`. A missing or unreadable file yields an empty cache.
    pub fn load(path: &Path) -> Self {
        let entries = match fs::read_to_string(path) {
            Ok(contents) => Self::parse_entries(path, &contents),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("DetailCache: no cache at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(err) => {
                warn!(
                    "DetailCache: Failed reading cache at {}: {}",
                    path.display(),
                    err
                );
                BTreeMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    fn parse_entries(path: &Path, contents: &str) -> BTreeMap<String, Vec<SubItem>> {
        let parsed: BTreeMap<String, Vec<StoredSubItem>> = match serde_json::from_str(contents) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(
                    "DetailCache: Failed parsing cache at {}: {}; starting empty",
                    path.display(),
                    err
                );
                return BTreeMap::new();
            }
        };
        parsed
            .into_iter()
            .map(|(key, stored)| {
                let items = stored
                    .into_iter()
                    .filter_map(StoredSubItem::into_sub_item)
                    .collect();
                (key, items)
            })
            .collect()
    }

    pub fn get(&self, key: &NormalizedKey) -> Option<&[SubItem]> {
        self.entries.get(key.as_str()).map(Vec::as_slice)
    }

    pub fn insert(&mut self, key: &NormalizedKey, items: Vec<SubItem>) {
        self.entries.insert(key.as_str().to_string(), items);
    }

    /// Rewrites the whole cache file.
    pub fn persist(&self) -> Result<(), StoreError> {
        json_store::write_json_atomic(&self.path, &self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

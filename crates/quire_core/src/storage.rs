//! String key-value store persisted as a single JSON object on disk.
//!
//! Every other piece of persisted state (settings, conversations, usage
//! counters) is serialized into a string value under a fixed key. Writes are
//! checked against a byte quota so the store behaves like a bounded local
//! storage area rather than an unbounded database.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default quota: 5 MiB, counted over key and value bytes.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Storage I/O failed: {0}")]
    Io(String),
}

pub struct LocalStore {
    path: Option<PathBuf>,
    quota_bytes: usize,
    entries: RwLock<BTreeMap<String, String>>,
}

impl LocalStore {
    /// Open (or create) a store backed by `path` with the default quota.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_quota(path, DEFAULT_QUOTA_BYTES)
    }

    pub fn open_with_quota(path: &Path, quota_bytes: usize) -> Result<Self> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read store: {}", path.display()))?;
            match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(map) => {
                    info!("Loaded {} stored keys from {}", map.len(), path.display());
                    map
                }
                Err(e) => {
                    warn!("Store at {} is unreadable ({e}); starting empty", path.display());
                    BTreeMap::new()
                }
            }
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            quota_bytes,
            entries: RwLock::new(entries),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory(quota_bytes: usize) -> Self {
        Self {
            path: None,
            quota_bytes,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn quota_bytes(&self) -> usize {
        self.quota_bytes
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Total bytes currently used by keys and values.
    pub fn used_bytes(&self) -> usize {
        usage_of(&self.entries.read())
    }

    /// Store `value` under `key`, rejecting the write if it would push the
    /// store past its quota. A rejected write leaves the store unchanged.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        let current = usage_of(&entries);
        let replaced = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
        let needed = current - replaced + key.len() + value.len();
        if needed > self.quota_bytes {
            warn!("Rejected write to '{key}': {needed} bytes exceeds quota {}", self.quota_bytes);
            return Err(StorageError::QuotaExceeded {
                needed,
                quota: self.quota_bytes,
            });
        }

        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&entries) {
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        debug!("Stored '{key}' ({} bytes)", value.len());
        Ok(())
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        self.flush(&entries)?;
        Ok(true)
    }

    /// Read a JSON value stored under `key`. Malformed values are reported
    /// as `None` with a warning.
    pub fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring malformed value under '{key}': {e}");
                None
            }
        }
    }

    pub fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize value for '{key}'"))?;
        self.set(key, &raw)?;
        Ok(())
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content =
            serde_json::to_string_pretty(entries).map_err(|e| StorageError::Io(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| StorageError::Io(format!("{}: {e}", path.display())))
    }
}

fn usage_of(entries: &BTreeMap<String, String>) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

//! JSON-file backed dedup cache.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{SeenStore, StoreError};

/// Dedup cache persisted as a pretty-printed JSON array of key strings.
///
/// The file is read once by [`load`](Self::load). Every [`add`](SeenStore::add)
/// of a new key rewrites the whole file before returning: the new contents go
/// to a temporary file in the same directory which is then renamed over the
/// old one, so an abrupt exit leaves either the previous or the new list on
/// disk and never a truncated one.
///
/// Keys are kept in insertion order so the file reads as a history.
pub struct JsonFileStore {
    path: PathBuf,
    order: Vec<String>,
    index: HashSet<String>,
}

impl JsonFileStore {
    /// Open the cache at `path`. A missing file is an empty cache.
    ///
    /// A file that exists but does not hold a JSON list of strings is an
    /// error: silently starting empty would re-notify every known slot and
    /// then overwrite the history.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let order: Vec<String> = match std::fs::read_to_string(path) {
            Ok(raw) if raw.trim().is_empty() => Vec::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut index = HashSet::with_capacity(order.len());
        let order: Vec<String> = order.into_iter().filter(|k| index.insert(k.clone())).collect();

        info!(count = order.len(), path = %path.display(), "loaded notified-slot cache");
        Ok(Self {
            path: path.to_path_buf(),
            order,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    fn flush(&self) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(io_err)?;

        let body = serde_json::to_string_pretty(&self.order)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(body.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        debug!(count = self.order.len(), path = %self.path.display(), "flushed cache");
        Ok(())
    }
}

impl SeenStore for JsonFileStore {
    fn has(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    fn add(&mut self, key: &str) -> Result<bool, StoreError> {
        if self.index.contains(key) {
            return Ok(false);
        }
        self.order.push(key.to_string());
        self.index.insert(key.to_string());
        if let Err(e) = self.flush() {
            // Keep memory consistent with disk.
            self.order.pop();
            self.index.remove(key);
            return Err(e);
        }
        Ok(true)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

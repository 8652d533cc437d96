//! File System Key-Value Store
//!
//! Information Hiding:
//! - File naming and key sanitising hidden from users
//! - Directory structure management hidden behind interface
//! - Write failures are logged, never propagated

use super::kv::KeyValueStore;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// File system store - each key is a file
/// Files are stored as {base_path}/{sanitised key}.val
pub struct FileKv {
    base_path: PathBuf,
}

impl FileKv {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        // Create base directory if it doesn't exist
        fs::create_dir_all(&base_path).context("Failed to create local data directory")?;

        Ok(Self { base_path })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base_path.join(format!("{}.val", file_name))
    }
}

impl KeyValueStore for FileKv {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.key_path(key);
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("[FileKv] Failed to read {:?}: {}", path, e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        let path = self.key_path(key);
        let staging = path.with_extension("tmp");

        // Staged write, renamed into place
        let result = fs::write(&staging, value).and_then(|_| fs::rename(&staging, &path));
        match result {
            Ok(()) => tracing::debug!("[FileKv] Wrote {} bytes to {:?}", value.len(), path),
            Err(e) => tracing::warn!("[FileKv] Failed to write {:?}: {}", path, e),
        }
    }

    fn remove(&self, key: &str) {
        let path = self.key_path(key);

        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("[FileKv] Failed to delete {:?}: {}", path, e);
            }
        } else {
            tracing::debug!("[FileKv] Key '{}' does not exist, nothing to delete", key);
        }
    }
}

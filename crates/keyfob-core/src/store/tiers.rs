//! Storage tier backends.
//!
//! Both tiers hold raw record strings keyed by name; record semantics
//! (expiry, obfuscation) live one level up in `CredentialStore`.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;

/// In-process tier, cleared when the process exits.
#[derive(Debug, Default)]
pub(crate) struct MemoryTier {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryTier {
    pub(crate) fn read(&self, key: &str) -> Option<String> {
        self.records.lock().get(key).cloned()
    }

    pub(crate) fn write(&self, key: &str, raw: &str) {
        self.records.lock().insert(key.to_string(), raw.to_string());
    }

    pub(crate) fn remove(&self, key: &str) {
        self.records.lock().remove(key);
    }

    pub(crate) fn clear(&self) {
        self.records.lock().clear();
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.records.lock().keys().cloned().collect()
    }
}

/// On-disk tier, one file per key under the storage directory.
/// Survives restarts; used only when the caller opts in ("remember me").
#[derive(Debug)]
pub(crate) struct FileTier {
    dir: PathBuf,
}

impl FileTier {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub(crate) fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read stored record: {}", key))?;
        Ok(Some(raw))
    }

    pub(crate) fn write(&self, key: &str, raw: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create storage dir {}", self.dir.display()))?;
        std::fs::write(self.path(key), raw)
            .with_context(|| format!("Failed to write stored record: {}", key))?;
        Ok(())
    }

    pub(crate) fn remove(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stored record: {}", key))?;
        }
        Ok(())
    }

    pub(crate) fn clear(&self) -> Result<()> {
        for key in self.keys() {
            self.remove(&key)?;
        }
        Ok(())
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_suffix(".json").map(|k| k.to_string())
            })
            .collect()
    }
}

//! Small string key-value stores backed by a JSON file.
//!
//! Readers take a shared lock; writers build the new contents in a locked
//! temp file next to the store and rename it into place. Last write wins.

use crate::{Error, Result};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

type Entries = BTreeMap<String, String>;

/// A JSON object of string values stored in a single file
#[derive(Clone, Debug)]
pub struct KeyValueStore {
    path: PathBuf,
}

impl KeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry
    ///
    /// A missing, unreadable or corrupt file reads as empty.
    pub fn load(&self) -> Entries {
        if !self.path.exists() {
            return Entries::new();
        }

        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Unable to open store {:?}: {}. Treating as empty.", self.path, e);
                return Entries::new();
            }
        };

        if let Err(e) = file.lock_shared() {
            tracing::warn!("Unable to lock store {:?}: {}. Treating as empty.", self.path, e);
            return Entries::new();
        }

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        let _ = file.unlock();
        if let Err(e) = read {
            tracing::warn!("Failed to read store {:?}: {}. Treating as empty.", self.path, e);
            return Entries::new();
        }

        match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Corrupt store {:?}: {}. Treating as empty.", self.path, e);
                Entries::new()
            }
        }
    }

    fn save(&self, entries: &Entries) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| Error::Other(format!("Store path {:?} has no parent", self.path)))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, entries)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Load, modify and write back
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Entries),
    {
        let mut entries = self.load();
        f(&mut entries);
        self.save(&entries)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.load().remove(key)
    }

    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.update(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = KeyValueStore::new(temp_dir.path().join("prefs.json"));

        assert_eq!(store.get("theme"), None);
        store.set("theme", "dark").unwrap();
        store.set("unit", "lbs").unwrap();
        assert_eq!(store.get("theme").as_deref(), Some("dark"));

        store.remove("theme").unwrap();
        assert_eq!(store.get("theme"), None);
        assert_eq!(store.get("unit").as_deref(), Some("lbs"));
    }

    #[test]
    fn test_last_write_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = KeyValueStore::new(temp_dir.path().join("prefs.json"));
        store.set("k", "a").unwrap();
        store.set("k", "b").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("b"));
    }

    #[test]
    fn test_corrupt_file_reads_empty_and_recovers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("prefs.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = KeyValueStore::new(&path);
        assert!(store.load().is_empty());

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_creates_missing_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = KeyValueStore::new(temp_dir.path().join("a/b/prefs.json"));
        store.set("k", "v").unwrap();
        assert!(store.path().exists());
    }
}

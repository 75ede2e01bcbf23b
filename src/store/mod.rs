//! Storage port for the shared data document.
//!
//! Moderation lists, admins, the system prompt and output-filter words all
//! live in one JSON document. Stores never hold it across calls; every
//! mutation is a locked read-modify-write through [`DataStore::update`].

mod document;
mod lock;

pub use document::{DEFAULT_SYSTEM_PROMPT, DataDocument};
pub(crate) use document::{insert_unique, remove_value};
pub(crate) use lock::with_file_lock;

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::paths::Paths;

pub trait DataStore: Send + Sync {
    /// Current document; a missing file yields defaults.
    fn load(&self) -> Result<DataDocument>;

    /// Replace the whole document.
    fn save(&self, doc: &DataDocument) -> Result<()>;

    /// Re-read, mutate and write back under exclusive access.
    ///
    /// Returns the document as written.
    fn update(&self, mutate: &mut dyn FnMut(&mut DataDocument)) -> Result<DataDocument>;
}

/// `data.json` on disk, guarded by an advisory lock on `data.lock`.
#[derive(Debug, Clone)]
pub struct JsonDataFile {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonDataFile {
    pub fn new(path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Result<Self> {
        let lock_path = lock_path.into();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: path.into(),
            lock_path,
        })
    }

    pub fn from_paths(paths: &Paths) -> Result<Self> {
        Self::new(paths.data_file(), paths.data_lock())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<DataDocument> {
        if !self.path.exists() {
            return Ok(DataDocument::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(DataDocument::default());
        }
        match serde_json::from_str(&content) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                warn!("Corrupt data document {:?}, using defaults: {}", self.path, e);
                Ok(DataDocument::default())
            }
        }
    }
}

impl DataStore for JsonDataFile {
    fn load(&self) -> Result<DataDocument> {
        with_file_lock(&self.lock_path, || self.read())
    }

    fn save(&self, doc: &DataDocument) -> Result<()> {
        with_file_lock(&self.lock_path, || write_json_atomic(&self.path, doc))
    }

    fn update(&self, mutate: &mut dyn FnMut(&mut DataDocument)) -> Result<DataDocument> {
        with_file_lock(&self.lock_path, || {
            let mut doc = self.read()?;
            mutate(&mut doc);
            write_json_atomic(&self.path, &doc)?;
            Ok(doc)
        })
    }
}

/// Process-local store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    doc: Mutex<DataDocument>,
}

impl MemoryDataStore {
    pub fn new(doc: DataDocument) -> Self {
        Self {
            doc: Mutex::new(doc),
        }
    }
}

impl DataStore for MemoryDataStore {
    fn load(&self) -> Result<DataDocument> {
        Ok(self
            .doc
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, doc: &DataDocument) -> Result<()> {
        *self.doc.lock().unwrap_or_else(PoisonError::into_inner) = doc.clone();
        Ok(())
    }

    fn update(&self, mutate: &mut dyn FnMut(&mut DataDocument)) -> Result<DataDocument> {
        let mut doc = self.doc.lock().unwrap_or_else(PoisonError::into_inner);
        mutate(&mut doc);
        Ok(doc.clone())
    }
}

/// Serialize as pretty JSON and replace `path` atomically.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, serde_json::to_string_pretty(value)?.as_bytes())
}

/// Write to a unique temp file next to `path`, then rename over it.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension(format!(
        "{}.{}.tmp",
        std::process::id(),
        uuid::Uuid::new_v4().as_simple()
    ));

    fs::write(&tmp_path, content)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
    }

    debug!("Wrote {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn file_store(dir: &Path) -> JsonDataFile {
        JsonDataFile::new(dir.join("data.json"), dir.join("data.lock")).unwrap()
    }

    fn tmp_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "tmp").unwrap_or(false))
            .collect()
    }

    #[test]
    fn missing_file_loads_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let store = file_store(tmp.path());
        assert_eq!(store.load().unwrap(), DataDocument::default());
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let store = file_store(tmp.path());
        fs::write(store.path(), "{not json").unwrap();
        assert_eq!(store.load().unwrap(), DataDocument::default());
    }

    #[test]
    fn update_persists_and_leaves_no_tmp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = file_store(tmp.path());

        let written = store
            .update(&mut |doc| doc.blocked_words.push("spam".into()))
            .unwrap();
        assert_eq!(written.blocked_words, vec!["spam"]);

        let reread = file_store(tmp.path()).load().unwrap();
        assert_eq!(reread.blocked_words, vec!["spam"]);
        assert!(tmp_files(tmp.path()).is_empty());
    }

    #[test]
    fn update_rereads_changes_from_other_writers() {
        let tmp = tempfile::tempdir().unwrap();
        let first = file_store(tmp.path());
        let second = file_store(tmp.path());

        first
            .update(&mut |doc| doc.admins.push("1".into()))
            .unwrap();
        second
            .update(&mut |doc| doc.admins.push("2".into()))
            .unwrap();

        assert_eq!(first.load().unwrap().admins, vec!["1", "2"]);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_path_buf();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dir = dir.clone();
                std::thread::spawn(move || {
                    let store = file_store(&dir);
                    store
                        .update(&mut |doc| doc.banned_users.push(i.to_string()))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let doc = file_store(&dir).load().unwrap();
        assert_eq!(doc.banned_users.len(), 8);
    }

    #[test]
    fn memory_store_update_and_save() {
        let store: Arc<dyn DataStore> = Arc::new(MemoryDataStore::default());
        store
            .update(&mut |doc| doc.system_prompt = "be brief".into())
            .unwrap();
        assert_eq!(store.load().unwrap().system_prompt, "be brief");

        store.save(&DataDocument::default()).unwrap();
        assert_eq!(store.load().unwrap().system_prompt, DEFAULT_SYSTEM_PROMPT);
    }
}

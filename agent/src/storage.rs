//! File-backed persistence for the local store.
//!
//! The whole key map lives in one JSON file. Every save rewrites it through a
//! temporary file and a rename, so a crash leaves either the old or the new
//! content on disk.

use clubsync_engine::{error::Result, Error, StorageBackend};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Storage backend persisting to a single JSON file.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileBackend {
    /// Open the file at `path`, starting empty if it does not exist.
    ///
    /// A file that cannot be decoded is moved to `<path>.corrupt`.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    let aside = sibling(&path, "corrupt");
                    tracing::warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "Data file is corrupt, starting empty"
                    );
                    fs::rename(&path, &aside)?;
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened data file");

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let tmp = sibling(&self.path, "tmp");
        fs::write(&tmp, raw).map_err(|e| Error::Storage(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Storage(format!("{}: {}", self.path.display(), e)))
    }
}

/// `<path>.<suffix>` next to `path`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

impl StorageBackend for FileBackend {
    fn load(&self, name: &str) -> Option<String> {
        self.entries.get(name).cloned()
    }

    fn save(&mut self, name: &str, raw: String) -> Result<()> {
        self.entries.insert(name.to_string(), raw);
        self.flush()
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        if self.entries.remove(name).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn save_batch(&mut self, entries: Vec<(String, String)>) -> Result<()> {
        self.entries.extend(entries);
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clubsync_engine::{LocalStore, LogicalKey};
    use serde_json::json;

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path().join("data.json")).unwrap();
        assert_eq!(backend.load("roster"), None);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        let mut store = LocalStore::new(FileBackend::open(&path).unwrap());
        store
            .write(LogicalKey::Roster, &json!([{"id": "p1"}]), 10)
            .unwrap();
        store.advance_cursor("2025-03-01T10:00:00Z").unwrap();

        let store = LocalStore::new(FileBackend::open(&path).unwrap());
        assert_eq!(store.read_value(LogicalKey::Roster), Some(json!([{"id": "p1"}])));
        assert_eq!(store.dirty_keys(), vec![LogicalKey::Roster]);
        assert_eq!(store.pull_cursor().as_deref(), Some("2025-03-01T10:00:00Z"));
        assert!(!sibling(&path, "tmp").exists());
    }

    #[test]
    fn corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "{\"roster\": ").unwrap();

        let backend = FileBackend::open(&path).unwrap();

        assert_eq!(backend.load("roster"), None);
        assert!(!path.exists());
        assert_eq!(
            fs::read_to_string(sibling(&path, "corrupt")).unwrap(),
            "{\"roster\": "
        );
    }

    #[test]
    fn write_lands_in_one_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        let mut backend = FileBackend::open(&path).unwrap();
        backend
            .save_batch(vec![
                ("roster".into(), "[]".into()),
                (clubsync_engine::store::DIRTY_KEY.into(), "{\"roster\":1}".into()),
            ])
            .unwrap();

        let on_disk: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 2);
        assert_eq!(on_disk["roster"], "[]");
        assert!(!sibling(&path, "tmp").exists());
    }

    #[test]
    fn remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.save("season", "\"2025/26\"".into()).unwrap();
        backend.remove("season").unwrap();

        assert_eq!(FileBackend::open(&path).unwrap().load("season"), None);
    }
}

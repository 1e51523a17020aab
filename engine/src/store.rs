//! Local store - durable key-value state plus sync bookkeeping.
//!
//! The store keeps the value of every [`LogicalKey`] as a serialized JSON
//! string in a [`StorageBackend`]. Next to the values it keeps two pieces of
//! sync metadata in the same backend, so both survive restarts:
//!
//! - the dirty tracker: key name -> timestamp of the last unsynced write
//! - the pull cursor: the remote version stamp last absorbed locally

use crate::{error::Result, Document, Error, LogicalKey, Timestamp};
use chrono::DateTime;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Backend name of the dirty tracker.
pub const DIRTY_KEY: &str = "__sync/dirty";

/// Backend name of the pull cursor.
pub const CURSOR_KEY: &str = "__sync/last-pulled";

/// Raw string storage the local store persists into.
pub trait StorageBackend: Send {
    /// Load the raw value stored under `name`.
    fn load(&self, name: &str) -> Option<String>;

    /// Store a raw value under `name`.
    fn save(&mut self, name: &str, raw: String) -> Result<()>;

    /// Remove `name` from storage.
    fn remove(&mut self, name: &str) -> Result<()>;

    /// Store several raw values as one update.
    ///
    /// Backends that persist on every save should override this to persist
    /// once for the whole batch.
    fn save_batch(&mut self, entries: Vec<(String, String)>) -> Result<()> {
        for (name, raw) in entries {
            self.save(&name, raw)?;
        }
        Ok(())
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for Box<B> {
    fn load(&self, name: &str) -> Option<String> {
        (**self).load(name)
    }

    fn save(&mut self, name: &str, raw: String) -> Result<()> {
        (**self).save(name, raw)
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        (**self).remove(name)
    }

    fn save_batch(&mut self, entries: Vec<(String, String)>) -> Result<()> {
        (**self).save_batch(entries)
    }
}

/// In-memory backend, used for tests and ephemeral stores.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: HashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self, name: &str) -> Option<String> {
        self.entries.get(name).cloned()
    }

    fn save(&mut self, name: &str, raw: String) -> Result<()> {
        self.entries.insert(name.to_string(), raw);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        self.entries.remove(name);
        Ok(())
    }
}

/// Dirty marks captured at push time: key -> mark.
///
/// Clearing with a snapshot only removes marks that were not renewed after
/// the snapshot was taken.
pub type DirtySnapshot = BTreeMap<LogicalKey, Timestamp>;

fn encode<T: Serialize + ?Sized>(name: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Serialization {
        key: name.to_string(),
        reason: e.to_string(),
    })
}

/// Renew the mark of `key`. Marks for one key are strictly increasing.
fn bump_mark(map: &mut BTreeMap<String, Timestamp>, key: LogicalKey, now: Timestamp) {
    let mark = match map.get(key.name()) {
        Some(&prev) if prev >= now => prev + 1,
        _ => now,
    };
    map.insert(key.name().to_string(), mark);
}

/// The local store.
#[derive(Debug)]
pub struct LocalStore<B> {
    backend: B,
}

impl<B: StorageBackend> LocalStore<B> {
    /// Create a store on top of a backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Get the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read a typed value, falling back on missing or undecodable data.
    pub fn read<T: DeserializeOwned>(&self, key: LogicalKey, fallback: T) -> T {
        self.backend
            .load(key.name())
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or(fallback)
    }

    /// Read the raw JSON value of a key, `None` if missing or corrupt.
    pub fn read_value(&self, key: LogicalKey) -> Option<Value> {
        self.backend
            .load(key.name())
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Replace the value of a key and mark it dirty.
    ///
    /// The value and the dirty mark reach the backend in one batch.
    pub fn write<T: Serialize + ?Sized>(
        &mut self,
        key: LogicalKey,
        value: &T,
        now: Timestamp,
    ) -> Result<()> {
        let raw = encode(key.name(), value)?;
        let mut dirty = self.dirty_map();
        bump_mark(&mut dirty, key, now);
        let dirty_raw = encode(DIRTY_KEY, &dirty)?;
        self.backend.save_batch(vec![
            (key.name().to_string(), raw),
            (DIRTY_KEY.to_string(), dirty_raw),
        ])
    }

    /// Reset a key to its empty default.
    pub fn reset(&mut self, key: LogicalKey, now: Timestamp) -> Result<()> {
        self.write(key, &key.empty_default(), now)
    }

    /// Values of every synced key; missing or corrupt ones are `null`.
    pub fn snapshot(&self) -> Document {
        LogicalKey::synced()
            .map(|key| (key.name().to_string(), self.read_value(key).unwrap_or(Value::Null)))
            .collect()
    }

    /// Overwrite local values with the synced keys present in `document`.
    ///
    /// Does not touch dirty marks. Returns the keys that were written.
    pub fn apply_document(&mut self, document: &Document) -> Result<Vec<LogicalKey>> {
        self.apply_document_except(document, &BTreeSet::new())
    }

    /// Like [`apply_document`](Self::apply_document), skipping `keep`.
    pub fn apply_document_except(
        &mut self,
        document: &Document,
        keep: &BTreeSet<LogicalKey>,
    ) -> Result<Vec<LogicalKey>> {
        let mut applied = Vec::new();
        let mut batch = Vec::new();
        for key in LogicalKey::synced().filter(|k| !keep.contains(k)) {
            if let Some(value) = document.get(key.name()) {
                batch.push((key.name().to_string(), encode(key.name(), value)?));
                applied.push(key);
            }
        }
        if !batch.is_empty() {
            self.backend.save_batch(batch)?;
        }
        Ok(applied)
    }

    // ------------------------------------------------------------------
    // Dirty tracker
    // ------------------------------------------------------------------

    fn dirty_map(&self) -> BTreeMap<String, Timestamp> {
        self.backend
            .load(DIRTY_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save_dirty_map(&mut self, map: &BTreeMap<String, Timestamp>) -> Result<()> {
        let raw = encode(DIRTY_KEY, map)?;
        self.backend.save(DIRTY_KEY, raw)
    }

    /// Mark a key as changed locally.
    ///
    /// Marks for one key are strictly increasing, so a rewrite in the same
    /// millisecond is still told apart from the write before it.
    pub fn mark_dirty(&mut self, key: LogicalKey, now: Timestamp) -> Result<()> {
        let mut map = self.dirty_map();
        bump_mark(&mut map, key, now);
        self.save_dirty_map(&map)
    }

    /// Keys with unsynced writes.
    pub fn dirty_keys(&self) -> Vec<LogicalKey> {
        self.dirty_snapshot().into_keys().collect()
    }

    /// Whether any key has unsynced writes.
    pub fn has_dirty(&self) -> bool {
        !self.dirty_snapshot().is_empty()
    }

    /// Current dirty marks. Unknown names are ignored.
    pub fn dirty_snapshot(&self) -> DirtySnapshot {
        self.dirty_map()
            .into_iter()
            .filter_map(|(name, mark)| LogicalKey::from_name(&name).map(|key| (key, mark)))
            .collect()
    }

    /// Remove the given keys from the tracker if they are still present.
    pub fn clear_dirty(&mut self, keys: &[LogicalKey]) -> Result<()> {
        let mut map = self.dirty_map();
        let before = map.len();
        for key in keys {
            map.remove(key.name());
        }
        if map.len() == before {
            return Ok(());
        }
        self.save_dirty_map(&map)
    }

    /// Remove marks captured in `snapshot` unless they were renewed since.
    ///
    /// Returns the keys that were cleared.
    pub fn clear_dirty_snapshot(&mut self, snapshot: &DirtySnapshot) -> Result<Vec<LogicalKey>> {
        let mut map = self.dirty_map();
        let mut cleared = Vec::new();
        for (key, mark) in snapshot {
            if map.get(key.name()) == Some(mark) {
                map.remove(key.name());
                cleared.push(*key);
            }
        }
        if !cleared.is_empty() {
            self.save_dirty_map(&map)?;
        }
        Ok(cleared)
    }

    // ------------------------------------------------------------------
    // Pull cursor
    // ------------------------------------------------------------------

    /// The remote version stamp last absorbed, if any.
    pub fn pull_cursor(&self) -> Option<String> {
        self.backend
            .load(CURSOR_KEY)
            .and_then(|raw| serde_json::from_str::<Option<String>>(&raw).ok())
            .flatten()
            .filter(|s| !s.is_empty())
    }

    /// Whether `stamp` is older than the current cursor.
    ///
    /// Stamps that are not RFC 3339 cannot be ordered and are never stale.
    pub fn is_stale(&self, stamp: &str) -> bool {
        let Some(current) = self.pull_cursor() else {
            return false;
        };
        match (
            DateTime::parse_from_rfc3339(stamp),
            DateTime::parse_from_rfc3339(&current),
        ) {
            (Ok(new), Ok(current)) => new < current,
            _ => false,
        }
    }

    /// Move the cursor to a stamp confirmed by the remote.
    ///
    /// Returns `false` and leaves the cursor alone if `stamp` is older.
    pub fn advance_cursor(&mut self, stamp: &str) -> Result<bool> {
        if self.is_stale(stamp) {
            return Ok(false);
        }
        let raw = encode(CURSOR_KEY, stamp)?;
        self.backend.save(CURSOR_KEY, raw)?;
        Ok(true)
    }
}

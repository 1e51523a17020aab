//! Backup snapshots of the club data.
//!
//! Backups are stored inside the shared document under
//! [`LogicalKey::Backups`], newest first, so every device sees them.

use crate::{error::Result, Error, LocalStore, LogicalKey, StorageBackend, Timestamp};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of backups kept by the daily auto-backup.
pub const MAX_BACKUPS: usize = 14;

/// Minimum distance between two automatic backups.
pub const AUTO_BACKUP_INTERVAL_MS: Timestamp = 24 * 60 * 60 * 1000;

/// Keys captured by a backup.
const BACKED_UP: [LogicalKey; 7] = [
    LogicalKey::Events,
    LogicalKey::Roster,
    LogicalKey::Attendance,
    LogicalKey::Ratings,
    LogicalKey::FitnessTests,
    LogicalKey::MatchStats,
    LogicalKey::Lineups,
];

/// The data captured by a backup. Values are kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPayload {
    #[serde(default)]
    pub events: Value,
    #[serde(default)]
    pub roster: Value,
    #[serde(default)]
    pub attendance: Value,
    #[serde(default)]
    pub ratings: Value,
    #[serde(default)]
    pub fitness_tests: Value,
    #[serde(default)]
    pub match_stats: Value,
    #[serde(default)]
    pub lineups: Value,
}

impl BackupPayload {
    fn slot(&self, key: LogicalKey) -> Option<&Value> {
        match key {
            LogicalKey::Events => Some(&self.events),
            LogicalKey::Roster => Some(&self.roster),
            LogicalKey::Attendance => Some(&self.attendance),
            LogicalKey::Ratings => Some(&self.ratings),
            LogicalKey::FitnessTests => Some(&self.fitness_tests),
            LogicalKey::MatchStats => Some(&self.match_stats),
            LogicalKey::Lineups => Some(&self.lineups),
            _ => None,
        }
    }

    fn slot_mut(&mut self, key: LogicalKey) -> Option<&mut Value> {
        match key {
            LogicalKey::Events => Some(&mut self.events),
            LogicalKey::Roster => Some(&mut self.roster),
            LogicalKey::Attendance => Some(&mut self.attendance),
            LogicalKey::Ratings => Some(&mut self.ratings),
            LogicalKey::FitnessTests => Some(&mut self.fitness_tests),
            LogicalKey::MatchStats => Some(&mut self.match_stats),
            LogicalKey::Lineups => Some(&mut self.lineups),
            _ => None,
        }
    }
}

/// A point-in-time copy of the club data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub id: String,
    #[serde(rename = "createdAtISO")]
    pub created_at_iso: String,
    pub season: String,
    pub payload: BackupPayload,
}

/// Format milliseconds since the epoch as an RFC 3339 UTC timestamp.
pub fn iso_from_millis(millis: Timestamp) -> Result<String> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or(Error::InvalidTimestamp(millis))
}

/// Capture the current data into a new snapshot.
pub fn make_backup<B: StorageBackend>(
    store: &LocalStore<B>,
    season: &str,
    now: Timestamp,
) -> Result<BackupSnapshot> {
    let mut payload = BackupPayload::default();
    for key in BACKED_UP {
        if let Some(slot) = payload.slot_mut(key) {
            *slot = store
                .read_value(key)
                .filter(|v| !v.is_null())
                .unwrap_or_else(|| key.empty_default());
        }
    }

    Ok(BackupSnapshot {
        id: format!("backup_{}", uuid::Uuid::new_v4().simple()),
        created_at_iso: iso_from_millis(now)?,
        season: season.to_string(),
        payload,
    })
}

/// Stored backups, newest first. Entries that fail to decode are skipped.
pub fn load_backups<B: StorageBackend>(store: &LocalStore<B>) -> Vec<BackupSnapshot> {
    store
        .read::<Vec<Value>>(LogicalKey::Backups, Vec::new())
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}

/// Find a stored backup by id.
pub fn find_backup<B: StorageBackend>(store: &LocalStore<B>, id: &str) -> Result<BackupSnapshot> {
    load_backups(store)
        .into_iter()
        .find(|b| b.id == id)
        .ok_or_else(|| Error::BackupNotFound(id.to_string()))
}

/// Store `snapshot` as the newest backup, keeping at most [`MAX_BACKUPS`].
///
/// Stored entries are carried over as raw JSON, including ones this version
/// cannot decode.
pub fn push_backup<B: StorageBackend>(
    store: &mut LocalStore<B>,
    snapshot: BackupSnapshot,
    now: Timestamp,
) -> Result<()> {
    let entry = serde_json::to_value(&snapshot).map_err(|e| Error::Serialization {
        key: LogicalKey::Backups.name().to_string(),
        reason: e.to_string(),
    })?;
    let mut backups: Vec<Value> = store.read(LogicalKey::Backups, Vec::new());
    backups.insert(0, entry);
    backups.truncate(MAX_BACKUPS);
    store.write(LogicalKey::Backups, &backups, now)
}

/// Take a backup if the last automatic one is at least a day old.
///
/// Returns the new snapshot, or `None` if no backup was due.
pub fn auto_backup_daily<B: StorageBackend>(
    store: &mut LocalStore<B>,
    today: NaiveDate,
    now: Timestamp,
) -> Result<Option<BackupSnapshot>> {
    let last = store
        .read::<Option<String>>(LogicalKey::LastAutoBackup, None)
        .and_then(|iso| DateTime::parse_from_rfc3339(&iso).ok())
        .and_then(|dt| u64::try_from(dt.timestamp_millis()).ok());

    if let Some(last) = last {
        if now.saturating_sub(last) < AUTO_BACKUP_INTERVAL_MS {
            return Ok(None);
        }
    }

    let season = crate::club::load_season(store, today, now)?;
    let snapshot = make_backup(store, &season, now)?;
    push_backup(store, snapshot.clone(), now)?;
    store.write(LogicalKey::LastAutoBackup, &iso_from_millis(now)?, now)?;
    Ok(Some(snapshot))
}

/// Write the snapshot's data back into the store.
pub fn restore_backup<B: StorageBackend>(
    store: &mut LocalStore<B>,
    snapshot: &BackupSnapshot,
    now: Timestamp,
) -> Result<()> {
    for key in BACKED_UP {
        let value = snapshot
            .payload
            .slot(key)
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| key.empty_default());
        store.write(key, &value, now)?;
    }
    Ok(())
}

//! Club domain records and the store operations the UI builds on.
//!
//! Every mutation goes through [`LocalStore::write`], so it is marked dirty
//! and travels to the remote with the next push like any other write.

use crate::{error::Result, Error, LocalStore, LogicalKey, StorageBackend, Timestamp};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

pub type EventId = String;
pub type PlayerId = String;

/// Grade on the German school scale, 1 (best) to 6.
pub type Grade = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Team {
    FirstTeam,
    SecondTeam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Training,
    Match,
}

/// A scheduled training or match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub team: Team,
    pub kind: EventKind,
    pub title: String,
    /// YYYY-MM-DD
    pub date: String,
    /// HH:mm
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Season label, filled in on load when missing
    #[serde(default)]
    pub season: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_note: Option<String>,
}

/// Fields of an event before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub team: Team,
    pub kind: EventKind,
    pub title: String,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub internal_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub team: Team,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_note: Option<String>,
}

/// Coach's rating of one player at one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub game_intelligence: Grade,
    pub fitness: Grade,
    pub technique: Grade,
    pub understanding: Grade,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Rating {
    fn grades(&self) -> [Grade; 4] {
        [
            self.game_intelligence,
            self.fitness,
            self.technique,
            self.understanding,
        ]
    }

    /// Whether every grade is on the 1 to 6 scale.
    pub fn is_valid(&self) -> bool {
        self.grades().iter().all(|g| (1..=6).contains(g))
    }

    pub fn average(&self) -> f64 {
        f64::from(
            u16::from(self.game_intelligence)
                + u16::from(self.fitness)
                + u16::from(self.technique)
                + u16::from(self.understanding),
        ) / 4.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Cooper,
    Shuttle,
}

/// One fitness-test measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessTestEntry {
    pub test: TestKind,
    #[serde(rename = "dateISO")]
    pub date_iso: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStats {
    pub minutes: u32,
    pub goals: u32,
    pub assists: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lineup {
    pub starter_ids: Vec<PlayerId>,
    pub bench_ids: Vec<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ----------------------------------------------------------------------
// Raw access
// ----------------------------------------------------------------------
//
// Updates work on raw JSON. Stored records need not match the typed
// records above and are kept as they are.

fn to_json<T: Serialize>(key: LogicalKey, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Serialization {
        key: key.name().to_string(),
        reason: e.to_string(),
    })
}

/// The list stored under `key`. Missing or null is empty; any other
/// non-list value is an error so it is never overwritten.
fn read_list<B: StorageBackend>(store: &LocalStore<B>, key: LogicalKey) -> Result<Vec<Value>> {
    match store.read_value(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(list)) => Ok(list),
        Some(_) => Err(Error::InvalidRecord(format!("{} is not a list", key))),
    }
}

/// The map stored under `key`, same rules as [`read_list`].
fn read_map<B: StorageBackend>(
    store: &LocalStore<B>,
    key: LogicalKey,
) -> Result<Map<String, Value>> {
    match store.read_value(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(Error::InvalidRecord(format!("{} is not a map", key))),
    }
}

/// Set `key[outer][inner] = value`, creating the outer entry if needed.
fn put_nested<B: StorageBackend>(
    store: &mut LocalStore<B>,
    key: LogicalKey,
    outer: &str,
    inner: &str,
    value: Value,
    now: Timestamp,
) -> Result<()> {
    let mut map = read_map(store, key)?;
    let entry = map
        .entry(outer.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    match entry {
        Value::Object(per_outer) => {
            per_outer.insert(inner.to_string(), value);
        }
        Value::Null => {
            *entry = Value::Object(Map::from_iter([(inner.to_string(), value)]));
        }
        _ => {
            return Err(Error::InvalidRecord(format!(
                "{}[{}] is not a map",
                key, outer
            )))
        }
    }
    store.write(key, &map, now)
}

// ----------------------------------------------------------------------
// Season
// ----------------------------------------------------------------------

/// Season label for a date. Seasons start in July: `2025/26`.
pub fn current_season_default(today: NaiveDate) -> String {
    let start = if today.month() >= 7 {
        today.year()
    } else {
        today.year() - 1
    };
    format!("{}/{:02}", start, (start + 1).rem_euclid(100))
}

/// The stored season, persisting the default for `today` when missing.
pub fn load_season<B: StorageBackend>(
    store: &mut LocalStore<B>,
    today: NaiveDate,
    now: Timestamp,
) -> Result<String> {
    match store.read::<Option<String>>(LogicalKey::Season, None) {
        Some(season) if !season.is_empty() => Ok(season),
        _ => {
            let season = current_season_default(today);
            store.write(LogicalKey::Season, &season, now)?;
            Ok(season)
        }
    }
}

// ----------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------

fn lacks_season(event: &Value) -> bool {
    event.is_object()
        && event
            .get("season")
            .and_then(Value::as_str)
            .map_or(true, str::is_empty)
}

/// All stored events, with the current season filled into events lacking one.
///
/// Records are returned as stored; they need not decode as [`Event`].
pub fn load_events<B: StorageBackend>(
    store: &mut LocalStore<B>,
    today: NaiveDate,
    now: Timestamp,
) -> Result<Vec<Value>> {
    let mut events = read_list(store, LogicalKey::Events)?;
    if events.iter().any(lacks_season) {
        let season = load_season(store, today, now)?;
        for event in events.iter_mut().filter(|e| lacks_season(e)) {
            if let Some(fields) = event.as_object_mut() {
                fields.insert("season".into(), Value::String(season.clone()));
            }
        }
    }
    Ok(events)
}

/// Append a new event with a fresh id.
pub fn create_event<B: StorageBackend>(
    store: &mut LocalStore<B>,
    new: NewEvent,
    today: NaiveDate,
    now: Timestamp,
) -> Result<Event> {
    let mut events = read_list(store, LogicalKey::Events)?;
    let season = match new.season {
        Some(season) if !season.is_empty() => season,
        _ => load_season(store, today, now)?,
    };

    let event = Event {
        id: format!("event_{}", uuid::Uuid::new_v4().simple()),
        team: new.team,
        kind: new.kind,
        title: new.title,
        date: new.date,
        time: new.time,
        location: new.location,
        season,
        internal_note: new.internal_note,
    };
    events.push(to_json(LogicalKey::Events, &event)?);
    store.write(LogicalKey::Events, &events, now)?;
    Ok(event)
}

// ----------------------------------------------------------------------
// Players and per-event entries
// ----------------------------------------------------------------------

/// Replace the roster record with the player's id, or append it.
pub fn upsert_player<B: StorageBackend>(
    store: &mut LocalStore<B>,
    player: &Player,
    now: Timestamp,
) -> Result<()> {
    if player.id.is_empty() {
        return Err(Error::InvalidRecord("player id is empty".into()));
    }
    let record = to_json(LogicalKey::Roster, player)?;
    let mut roster = read_list(store, LogicalKey::Roster)?;
    match roster
        .iter_mut()
        .find(|r| r.get("id").and_then(Value::as_str) == Some(player.id.as_str()))
    {
        Some(existing) => *existing = record,
        None => roster.push(record),
    }
    store.write(LogicalKey::Roster, &roster, now)
}

pub fn set_attendance<B: StorageBackend>(
    store: &mut LocalStore<B>,
    event_id: &str,
    player_id: &str,
    present: bool,
    now: Timestamp,
) -> Result<()> {
    put_nested(
        store,
        LogicalKey::Attendance,
        event_id,
        player_id,
        Value::Bool(present),
        now,
    )
}

/// Store a rating. Grades outside 1 to 6 are rejected.
pub fn set_rating<B: StorageBackend>(
    store: &mut LocalStore<B>,
    event_id: &str,
    player_id: &str,
    rating: &Rating,
    now: Timestamp,
) -> Result<()> {
    if !rating.is_valid() {
        return Err(Error::InvalidRecord("grades must be between 1 and 6".into()));
    }
    let value = to_json(LogicalKey::Ratings, rating)?;
    put_nested(store, LogicalKey::Ratings, event_id, player_id, value, now)
}

pub fn set_match_stats<B: StorageBackend>(
    store: &mut LocalStore<B>,
    event_id: &str,
    player_id: &str,
    stats: &MatchStats,
    now: Timestamp,
) -> Result<()> {
    let value = to_json(LogicalKey::MatchStats, stats)?;
    put_nested(store, LogicalKey::MatchStats, event_id, player_id, value, now)
}

pub fn set_lineup<B: StorageBackend>(
    store: &mut LocalStore<B>,
    event_id: &str,
    lineup: &Lineup,
    now: Timestamp,
) -> Result<()> {
    let mut lineups = read_map(store, LogicalKey::Lineups)?;
    lineups.insert(event_id.to_string(), to_json(LogicalKey::Lineups, lineup)?);
    store.write(LogicalKey::Lineups, &lineups, now)
}

/// Record a fitness test result, newest first, and grade it.
pub fn add_fitness_test<B: StorageBackend>(
    store: &mut LocalStore<B>,
    player_id: &str,
    entry: &FitnessTestEntry,
    now: Timestamp,
) -> Result<TestGrade> {
    if !entry.value.is_finite() {
        return Err(Error::InvalidRecord("test value must be a finite number".into()));
    }
    let record = to_json(LogicalKey::FitnessTests, entry)?;
    let mut tests = read_map(store, LogicalKey::FitnessTests)?;
    let log = tests
        .entry(player_id.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    match log {
        Value::Array(entries) => entries.insert(0, record),
        Value::Null => *log = Value::Array(vec![record]),
        _ => {
            return Err(Error::InvalidRecord(format!(
                "fitness tests of {} are not a list",
                player_id
            )))
        }
    }
    store.write(LogicalKey::FitnessTests, &tests, now)?;
    Ok(classify_test(entry.test, entry.value))
}

/// Keys holding per-event data, outer key = event id.
const EVENT_SCOPED: [LogicalKey; 5] = [
    LogicalKey::Attendance,
    LogicalKey::Ratings,
    LogicalKey::CheckinLegacy,
    LogicalKey::MatchStats,
    LogicalKey::Lineups,
];

/// Delete an event and everything recorded for it.
///
/// Returns whether the event existed. Per-event entries are removed either way.
pub fn delete_event_cascade<B: StorageBackend>(
    store: &mut LocalStore<B>,
    event_id: &str,
    now: Timestamp,
) -> Result<bool> {
    let mut events: Vec<Value> = store.read(LogicalKey::Events, Vec::new());
    let before = events.len();
    events.retain(|e| e.get("id").and_then(Value::as_str) != Some(event_id));
    let existed = events.len() != before;
    if existed {
        store.write(LogicalKey::Events, &events, now)?;
    }

    for key in EVENT_SCOPED {
        let mut map: BTreeMap<String, Value> = store.read(key, BTreeMap::new());
        if map.remove(event_id).is_some() {
            store.write(key, &map, now)?;
        }
    }

    Ok(existed)
}

// ----------------------------------------------------------------------
// Orphan cleanup
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Also drop entries of players no longer on the roster
    pub clean_missing_players: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            clean_missing_players: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Outer entries whose event no longer exists
    pub removed_events: usize,
    /// Inner entries and test owners whose player no longer exists
    pub removed_players: usize,
    /// Keys that were rewritten
    pub changed_keys: Vec<LogicalKey>,
}

/// Ids of an identity list, `None` if the key holds no readable list.
///
/// Cleanup is skipped for a list it cannot read instead of treating it as empty.
fn list_ids<B: StorageBackend>(store: &LocalStore<B>, key: LogicalKey) -> Option<HashSet<String>> {
    let list = store.read_value(key)?;
    let records = list.as_array()?;
    Some(
        records
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_str).map(str::to_string))
            .collect(),
    )
}

/// Drop per-event and per-player entries that point at deleted records.
pub fn cleanup_orphans<B: StorageBackend>(
    store: &mut LocalStore<B>,
    options: CleanupOptions,
    now: Timestamp,
) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    let Some(event_ids) = list_ids(store, LogicalKey::Events) else {
        return Ok(report);
    };
    let player_ids = if options.clean_missing_players {
        list_ids(store, LogicalKey::Roster)
    } else {
        None
    };

    for key in EVENT_SCOPED {
        let mut map: BTreeMap<String, Value> = store.read(key, BTreeMap::new());
        let mut changed = false;

        let before = map.len();
        map.retain(|event_id, _| event_ids.contains(event_id));
        if map.len() != before {
            report.removed_events += before - map.len();
            changed = true;
        }

        // lineups hold id lists, not per-player entries
        let players = player_ids.as_ref().filter(|_| key != LogicalKey::Lineups);
        if let Some(players) = players {
            for per_event in map.values_mut() {
                if let Some(inner) = per_event.as_object_mut() {
                    let before = inner.len();
                    inner.retain(|player_id, _| players.contains(player_id));
                    if inner.len() != before {
                        report.removed_players += before - inner.len();
                        changed = true;
                    }
                }
            }
        }

        if changed {
            store.write(key, &map, now)?;
            report.changed_keys.push(key);
        }
    }

    if let Some(players) = &player_ids {
        let mut tests: BTreeMap<String, Value> = store.read(LogicalKey::FitnessTests, BTreeMap::new());
        let before = tests.len();
        tests.retain(|player_id, _| players.contains(player_id));
        if tests.len() != before {
            report.removed_players += before - tests.len();
            store.write(LogicalKey::FitnessTests, &tests, now)?;
            report.changed_keys.push(LogicalKey::FitnessTests);
        }
    }

    Ok(report)
}

// ----------------------------------------------------------------------
// Fitness test grading
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestGrade {
    VeryGood,
    Standard,
    Medium,
    Poor,
}

impl TestGrade {
    pub fn label(self) -> &'static str {
        match self {
            TestGrade::VeryGood => "Very good",
            TestGrade::Standard => "Standard",
            TestGrade::Medium => "Medium",
            TestGrade::Poor => "Poor",
        }
    }
}

/// Lower bounds for VeryGood, Standard and Medium.
struct Thresholds {
    very_good: f64,
    standard: f64,
    medium: f64,
}

const COOPER: Thresholds = Thresholds {
    very_good: 3001.0,
    standard: 2801.0,
    medium: 2601.0,
};

const SHUTTLE: Thresholds = Thresholds {
    very_good: 2580.0,
    standard: 1700.0,
    medium: 1060.0,
};

/// Grade a fitness-test result.
pub fn classify_test(kind: TestKind, value: f64) -> TestGrade {
    let rules = match kind {
        TestKind::Cooper => &COOPER,
        TestKind::Shuttle => &SHUTTLE,
    };
    if value >= rules.very_good {
        TestGrade::VeryGood
    } else if value >= rules.standard {
        TestGrade::Standard
    } else if value >= rules.medium {
        TestGrade::Medium
    } else {
        TestGrade::Poor
    }
}

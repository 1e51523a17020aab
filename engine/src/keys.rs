//! Logical keys and the static merge-policy table.
//!
//! Every slot of the shared document is a [`LogicalKey`]. The shape of the
//! value stored under a key decides how it is merged after a push conflict,
//! and that mapping lives in exactly one place: [`KEY_TABLE`].

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Structural shape of the value stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyShape {
    /// Ordered records identified by their `id` field
    IdentityList,
    /// parent id -> child id -> leaf record
    TwoLevelMap,
    /// owner id -> list of entries without stable identity
    AppendLog,
    /// Replaced wholesale
    Scalar,
}

/// The value a missing or reset key stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyValue {
    List,
    Map,
    Null,
}

impl EmptyValue {
    const fn of(shape: KeyShape) -> Self {
        match shape {
            KeyShape::IdentityList => EmptyValue::List,
            KeyShape::TwoLevelMap | KeyShape::AppendLog => EmptyValue::Map,
            KeyShape::Scalar => EmptyValue::Null,
        }
    }

    pub fn to_value(self) -> Value {
        match self {
            EmptyValue::List => Value::Array(Vec::new()),
            EmptyValue::Map => Value::Object(Map::new()),
            EmptyValue::Null => Value::Null,
        }
    }
}

/// A named slot of the shared document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogicalKey {
    Events,
    Roster,
    Attendance,
    Ratings,
    FitnessTests,
    MatchStats,
    Lineups,
    Season,
    Backups,
    LastAutoBackup,
    CheckinLegacy,
}

/// Table entry describing one logical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub key: LogicalKey,
    /// Name used in local storage and in the remote document
    pub name: &'static str,
    pub shape: KeyShape,
    /// Whether the key is part of the shared remote document
    pub synced: bool,
    pub empty: EmptyValue,
}

impl KeySpec {
    const fn synced(key: LogicalKey, name: &'static str, shape: KeyShape) -> Self {
        Self {
            key,
            name,
            shape,
            synced: true,
            empty: EmptyValue::of(shape),
        }
    }

    const fn local(key: LogicalKey, name: &'static str, shape: KeyShape) -> Self {
        Self {
            key,
            name,
            shape,
            synced: false,
            empty: EmptyValue::of(shape),
        }
    }

    /// Override the empty value derived from the shape.
    const fn empty_as(mut self, empty: EmptyValue) -> Self {
        self.empty = empty;
        self
    }
}

/// One entry per logical key, in [`LogicalKey`] declaration order.
pub const KEY_TABLE: &[KeySpec] = &[
    KeySpec::synced(LogicalKey::Events, "events", KeyShape::IdentityList),
    KeySpec::synced(LogicalKey::Roster, "roster", KeyShape::IdentityList),
    KeySpec::synced(LogicalKey::Attendance, "attendance", KeyShape::TwoLevelMap),
    KeySpec::synced(LogicalKey::Ratings, "ratings", KeyShape::TwoLevelMap),
    KeySpec::synced(LogicalKey::FitnessTests, "fitness-tests", KeyShape::AppendLog),
    KeySpec::synced(LogicalKey::MatchStats, "match-stats", KeyShape::TwoLevelMap),
    // event id -> lineup, merged as one value
    KeySpec::synced(LogicalKey::Lineups, "lineups", KeyShape::Scalar).empty_as(EmptyValue::Map),
    KeySpec::synced(LogicalKey::Season, "season", KeyShape::Scalar),
    KeySpec::synced(LogicalKey::Backups, "backups", KeyShape::Scalar).empty_as(EmptyValue::List),
    KeySpec::synced(LogicalKey::LastAutoBackup, "last-auto-backup", KeyShape::Scalar),
    KeySpec::local(LogicalKey::CheckinLegacy, "checkin-legacy", KeyShape::TwoLevelMap),
];

impl LogicalKey {
    /// The table entry for this key.
    pub fn spec(self) -> &'static KeySpec {
        // KEY_TABLE is ordered like the enum.
        &KEY_TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn shape(self) -> KeyShape {
        self.spec().shape
    }

    pub fn is_synced(self) -> bool {
        self.spec().synced
    }

    /// The value a missing or reset key stands for.
    pub fn empty_default(self) -> Value {
        self.spec().empty.to_value()
    }

    /// All keys that belong to the shared document.
    pub fn synced() -> impl Iterator<Item = LogicalKey> {
        KEY_TABLE.iter().filter(|s| s.synced).map(|s| s.key)
    }

    /// Look a key up by its storage name.
    pub fn from_name(name: &str) -> Option<LogicalKey> {
        KEY_TABLE.iter().find(|s| s.name == name).map(|s| s.key)
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogicalKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogicalKey::from_name(s).ok_or_else(|| Error::UnknownKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_ordered_like_enum() {
        for (i, spec) in KEY_TABLE.iter().enumerate() {
            assert_eq!(spec.key as usize, i, "entry {} out of order", spec.name);
        }
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = KEY_TABLE.iter().map(|s| s.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), KEY_TABLE.len());
    }

    #[test]
    fn serde_name_matches_table_name() {
        for spec in KEY_TABLE {
            let json = serde_json::to_string(&spec.key).unwrap();
            assert_eq!(json, format!("\"{}\"", spec.name));
        }
    }

    #[test]
    fn shapes_of_domain_keys() {
        assert_eq!(LogicalKey::Roster.shape(), KeyShape::IdentityList);
        assert_eq!(LogicalKey::Attendance.shape(), KeyShape::TwoLevelMap);
        assert_eq!(LogicalKey::FitnessTests.shape(), KeyShape::AppendLog);
        assert_eq!(LogicalKey::Season.shape(), KeyShape::Scalar);
    }

    #[test]
    fn checkin_legacy_is_local_only() {
        assert!(!LogicalKey::CheckinLegacy.is_synced());
        assert_eq!(LogicalKey::synced().count(), KEY_TABLE.len() - 1);
    }

    #[test]
    fn parse_from_name() {
        assert_eq!(
            "match-stats".parse::<LogicalKey>().unwrap(),
            LogicalKey::MatchStats
        );
        assert_eq!(
            "players".parse::<LogicalKey>(),
            Err(Error::UnknownKey("players".into()))
        );
    }

    #[test]
    fn empty_defaults() {
        assert_eq!(LogicalKey::Roster.empty_default(), serde_json::json!([]));
        assert_eq!(LogicalKey::FitnessTests.empty_default(), serde_json::json!({}));
        assert_eq!(LogicalKey::Season.empty_default(), Value::Null);
        assert_eq!(LogicalKey::LastAutoBackup.empty_default(), Value::Null);
    }

    #[test]
    fn scalar_containers_keep_their_empty_shape() {
        assert_eq!(LogicalKey::Lineups.empty_default(), serde_json::json!({}));
        assert_eq!(LogicalKey::Backups.empty_default(), serde_json::json!([]));
    }
}

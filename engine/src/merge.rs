//! Merge engine for reconciling a remote document with local edits.
//!
//! Runs after a push was rejected because the remote moved on. Given the
//! fresh remote document, the local snapshot and the keys this device
//! changed, it produces one document both sides can agree on.
//!
//! # Algorithm
//!
//! 1. Start from a copy of the remote document
//! 2. For every dirty key, combine remote and local values using the
//!    [`KeyShape`] the key is registered with in [`KEY_TABLE`](crate::KEY_TABLE)
//! 3. Record every place where both sides held a different value for the
//!    same identity, together with the side that won
//!
//! Keys that are not dirty are never touched: the remote value is kept as is.

use crate::{Document, KeyShape, LogicalKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Which side wins when both carry a value for the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// The merging device keeps its own edits (default)
    #[default]
    LocalWins,
    /// Concurrent remote edits are kept over local ones
    RemoteWins,
}

/// A place where local and remote disagreed on the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOverlap {
    /// The key the overlap was found in
    pub key: LogicalKey,
    /// Record id, `outer/inner` pair, or empty for a scalar
    pub path: String,
    /// Which side was kept
    pub resolution: ConflictResolution,
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    /// The reconciled document
    pub document: Document,
    /// Overlaps where one side's value was dropped
    pub overlaps: Vec<MergeOverlap>,
}

/// Merges documents key by key according to their shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct Merger {
    resolution: ConflictResolution,
}

impl Merger {
    /// Create a merger with the given overlap policy.
    pub fn new(resolution: ConflictResolution) -> Self {
        Self { resolution }
    }

    pub fn resolution(&self) -> ConflictResolution {
        self.resolution
    }

    /// Merge `local` into `remote` for the given dirty keys.
    pub fn merge(&self, remote: &Document, local: &Document, dirty: &[LogicalKey]) -> MergeResult {
        let mut document = remote.clone();
        let mut overlaps = Vec::new();

        for &key in dirty {
            let name = key.name();
            let remote_value = present(remote.get(name));
            let local_value = present(local.get(name));

            let merged = match key.shape() {
                KeyShape::IdentityList => Some(self.merge_identity_list(
                    key,
                    remote_value,
                    local_value,
                    &mut overlaps,
                )),
                KeyShape::TwoLevelMap => Some(self.merge_two_level(
                    key,
                    remote_value,
                    local_value,
                    &mut overlaps,
                )),
                KeyShape::AppendLog => Some(merge_append_log(remote_value, local_value)),
                KeyShape::Scalar => {
                    self.merge_scalar(key, remote.get(name), local_value, &mut overlaps)
                }
            };

            match merged {
                Some(value) => {
                    document.insert(name.to_string(), value);
                }
                None => {
                    document.remove(name);
                }
            }
        }

        MergeResult { document, overlaps }
    }

    fn merge_identity_list(
        &self,
        key: LogicalKey,
        remote: Option<&Value>,
        local: Option<&Value>,
        overlaps: &mut Vec<MergeOverlap>,
    ) -> Value {
        let mut out: Vec<Value> = Vec::new();
        // identity -> (position in out, came from remote)
        let mut index: HashMap<String, (usize, bool)> = HashMap::new();

        for record in as_slice(remote) {
            let identity = identity_of(record);
            match index.get(&identity) {
                Some(&(pos, _)) => out[pos] = record.clone(),
                None => {
                    index.insert(identity, (out.len(), true));
                    out.push(record.clone());
                }
            }
        }

        for record in as_slice(local) {
            let identity = identity_of(record);
            match index.get(&identity).copied() {
                Some((pos, true)) => {
                    if out[pos] != *record {
                        overlaps.push(MergeOverlap {
                            key,
                            path: record_label(record, &identity),
                            resolution: self.resolution,
                        });
                        if self.resolution == ConflictResolution::LocalWins {
                            out[pos] = record.clone();
                        }
                    }
                    index.insert(identity, (pos, false));
                }
                Some((pos, false)) => out[pos] = record.clone(),
                None => {
                    index.insert(identity, (out.len(), false));
                    out.push(record.clone());
                }
            }
        }

        Value::Array(out)
    }

    fn merge_two_level(
        &self,
        key: LogicalKey,
        remote: Option<&Value>,
        local: Option<&Value>,
        overlaps: &mut Vec<MergeOverlap>,
    ) -> Value {
        let empty = Map::new();
        let remote = remote.and_then(Value::as_object).unwrap_or(&empty);
        let local = local.and_then(Value::as_object).unwrap_or(&empty);

        let mut out = remote.clone();
        for (outer, local_inner) in local {
            let merged = match remote.get(outer) {
                None => local_inner.clone(),
                Some(remote_inner) => {
                    self.merge_inner(key, outer, remote_inner, local_inner, overlaps)
                }
            };
            out.insert(outer.clone(), merged);
        }

        Value::Object(out)
    }

    fn merge_inner(
        &self,
        key: LogicalKey,
        outer: &str,
        remote: &Value,
        local: &Value,
        overlaps: &mut Vec<MergeOverlap>,
    ) -> Value {
        match (remote, local) {
            (Value::Object(r), Value::Object(l)) => {
                let mut out = r.clone();
                for (inner, local_leaf) in l {
                    match r.get(inner) {
                        Some(remote_leaf) if remote_leaf != local_leaf => {
                            overlaps.push(MergeOverlap {
                                key,
                                path: format!("{}/{}", outer, inner),
                                resolution: self.resolution,
                            });
                            if self.resolution == ConflictResolution::LocalWins {
                                out.insert(inner.clone(), local_leaf.clone());
                            }
                        }
                        Some(_) => {}
                        None => {
                            out.insert(inner.clone(), local_leaf.clone());
                        }
                    }
                }
                Value::Object(out)
            }
            (Value::Object(_), _) => remote.clone(),
            (_, Value::Object(_)) => local.clone(),
            _ => match self.resolution {
                ConflictResolution::LocalWins if !local.is_null() => local.clone(),
                ConflictResolution::RemoteWins if remote.is_null() => local.clone(),
                ConflictResolution::LocalWins => remote.clone(),
                ConflictResolution::RemoteWins => remote.clone(),
            },
        }
    }

    /// `None` means the key stays absent from the merged document.
    fn merge_scalar(
        &self,
        key: LogicalKey,
        remote: Option<&Value>,
        local: Option<&Value>,
        overlaps: &mut Vec<MergeOverlap>,
    ) -> Option<Value> {
        let remote_present = present(remote);
        match (remote_present, local) {
            (Some(r), Some(l)) => {
                if r != l {
                    overlaps.push(MergeOverlap {
                        key,
                        path: String::new(),
                        resolution: self.resolution,
                    });
                }
                Some(match self.resolution {
                    ConflictResolution::LocalWins => l.clone(),
                    ConflictResolution::RemoteWins => r.clone(),
                })
            }
            (None, Some(l)) => Some(l.clone()),
            // remote may still be an explicit null here
            (_, None) => remote.cloned(),
        }
    }
}

/// Merge with the default local-wins policy, discarding overlap details.
pub fn merge(remote: &Document, local: &Document, dirty: &[LogicalKey]) -> Document {
    Merger::default().merge(remote, local, dirty).document
}

/// Append-log merge: union per owner, exact-duplicate entries collapse,
/// newest `dateISO` first.
fn merge_append_log(remote: Option<&Value>, local: Option<&Value>) -> Value {
    let empty = Map::new();
    let remote = remote.and_then(Value::as_object).unwrap_or(&empty);
    let local = local.and_then(Value::as_object).unwrap_or(&empty);

    let mut out = Map::new();
    for owner in remote.keys().chain(local.keys()) {
        if out.contains_key(owner) {
            continue;
        }

        let mut seen = HashSet::new();
        let mut entries: Vec<Value> = Vec::new();
        for entry in as_slice(remote.get(owner)).iter().chain(as_slice(local.get(owner))) {
            if seen.insert(entry_key(entry)) {
                entries.push(entry.clone());
            }
        }
        entries.sort_by(|a, b| field_text(b, "dateISO").cmp(&field_text(a, "dateISO")));

        out.insert(owner.clone(), Value::Array(entries));
    }

    Value::Object(out)
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn as_slice(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Records without a usable `id` are identified by their full content.
fn identity_of(record: &Value) -> String {
    match record.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => format!("id:{}", id),
        _ => format!("json:{}", record),
    }
}

fn record_label(record: &Value, identity: &str) -> String {
    record
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| identity.to_string())
}

fn entry_key(entry: &Value) -> String {
    format!(
        "{}|{}|{}|{}",
        field_text(entry, "test"),
        field_text(entry, "dateISO"),
        field_text(entry, "value"),
        field_text(entry, "note"),
    )
}

fn field_text(entry: &Value, field: &str) -> String {
    match entry.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        // 3000 and 3000.0 are the same measurement
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}

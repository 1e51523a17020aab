//! Edge case tests for clubsync-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use clubsync_engine::{
    club::{self, CleanupOptions},
    ConflictResolution, Document, LocalStore, LogicalKey, MemoryBackend, Merger,
    StorageBackend,
};
use serde_json::{json, Value};

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap_or_default()
}

fn store() -> LocalStore<MemoryBackend> {
    LocalStore::new(MemoryBackend::new())
}

// ============================================================================
// Store Edge Cases
// ============================================================================

#[test]
fn corrupt_raw_value_reads_as_fallback() {
    let mut backend = MemoryBackend::new();
    backend.save("roster", "{not json".to_string()).unwrap();
    let store = LocalStore::new(backend);

    let roster: Vec<Value> = store.read(LogicalKey::Roster, Vec::new());
    assert!(roster.is_empty());
    assert_eq!(store.read_value(LogicalKey::Roster), None);
    assert_eq!(store.snapshot()["roster"], Value::Null);
}

#[test]
fn wrong_type_reads_as_fallback() {
    let mut store = store();
    store.write(LogicalKey::Roster, "not a list", 1).unwrap();

    let roster: Vec<Value> = store.read(LogicalKey::Roster, vec![json!({"id": "x"})]);
    assert_eq!(roster, vec![json!({"id": "x"})]);
}

#[test]
fn unicode_values_survive() {
    let mut store = store();
    let names = json!([
        {"id": "p1", "name": "Jürgen Müller"},
        {"id": "p2", "name": "Łukasz Żółw"},
        {"id": "p3", "name": "⚽ Keeper"},
        {"id": "p4", "name": "Line\nBreak\tTab"},
    ]);
    store.write(LogicalKey::Roster, &names, 1).unwrap();

    assert_eq!(store.read_value(LogicalKey::Roster), Some(names));
}

#[test]
fn local_only_key_is_never_in_snapshot() {
    let mut store = store();
    store
        .write(LogicalKey::CheckinLegacy, &json!({"e1": {"p1": true}}), 1)
        .unwrap();

    assert!(!store.snapshot().contains_key("checkin-legacy"));
    assert_eq!(store.snapshot().len(), LogicalKey::synced().count());
}

#[test]
fn apply_document_ignores_unknown_and_local_only_keys() {
    let mut store = store();
    let applied = store
        .apply_document(&doc(json!({
            "roster": [{"id": "p1"}],
            "checkin-legacy": {"e1": {}},
            "something-else": 1,
        })))
        .unwrap();

    assert_eq!(applied, vec![LogicalKey::Roster]);
    assert_eq!(store.read_value(LogicalKey::CheckinLegacy), None);
    assert!(!store.has_dirty());
}

#[test]
fn corrupt_dirty_tracker_reads_as_clean() {
    let mut backend = MemoryBackend::new();
    backend
        .save(clubsync_engine::store::DIRTY_KEY, "[1,2".to_string())
        .unwrap();
    let mut store = LocalStore::new(backend);

    assert!(!store.has_dirty());
    store.write(LogicalKey::Events, &json!([]), 5).unwrap();
    assert_eq!(store.dirty_keys(), vec![LogicalKey::Events]);
}

#[test]
fn dirty_marks_survive_clock_going_backwards() {
    let mut store = store();
    store.write(LogicalKey::Ratings, &json!({}), 1_000).unwrap();
    let snap = store.dirty_snapshot();

    store.write(LogicalKey::Ratings, &json!({"e1": {}}), 10).unwrap();

    assert!(store.clear_dirty_snapshot(&snap).unwrap().is_empty());
    assert!(store.dirty_snapshot()[&LogicalKey::Ratings] > snap[&LogicalKey::Ratings]);
}

#[test]
fn cursor_accepts_opaque_stamps() {
    let mut store = store();
    assert!(store.advance_cursor("2025-03-01T10:00:00Z").unwrap());
    assert!(store.advance_cursor("v42").unwrap());
    assert_eq!(store.pull_cursor().as_deref(), Some("v42"));
    assert!(!store.is_stale("2020-01-01T00:00:00Z"));
}

#[test]
fn cursor_compares_offsets_not_text() {
    let mut store = store();
    store.advance_cursor("2025-03-01T10:00:00+02:00").unwrap();

    // 09:00Z is later than 08:00Z even though it sorts lower as text
    assert!(!store.is_stale("2025-03-01T09:00:00Z"));
    assert!(store.is_stale("2025-03-01T07:59:59Z"));
}

// ============================================================================
// Merge Edge Cases
// ============================================================================

#[test]
fn merge_with_no_dirty_keys_is_remote() {
    let remote = doc(json!({"roster": [{"id": "p1"}], "season": "2024/25"}));
    let local = doc(json!({"roster": [], "season": "2025/26"}));

    let result = Merger::default().merge(&remote, &local, &[]);
    assert_eq!(result.document, remote);
    assert!(result.overlaps.is_empty());
}

#[test]
fn merge_handles_null_and_wrong_shapes() {
    let remote = doc(json!({
        "roster": null,
        "attendance": [1, 2, 3],
        "fitness-tests": "broken",
    }));
    let local = doc(json!({
        "roster": [{"id": "p1"}],
        "attendance": {"e1": {"p1": true}},
        "fitness-tests": {"p1": [{"test": "cooper", "dateISO": "2025-01-01", "value": 2800}]},
    }));
    let dirty = [
        LogicalKey::Roster,
        LogicalKey::Attendance,
        LogicalKey::FitnessTests,
    ];

    let merged = Merger::default().merge(&remote, &local, &dirty).document;
    assert_eq!(merged["roster"], json!([{"id": "p1"}]));
    assert_eq!(merged["attendance"], json!({"e1": {"p1": true}}));
    assert_eq!(merged["fitness-tests"]["p1"].as_array().map(Vec::len), Some(1));
}

#[test]
fn merge_local_delete_is_not_propagated_for_lists() {
    // Union semantics: a record removed locally but still on the remote
    // comes back after the merge.
    let remote = doc(json!({"events": [{"id": "e1"}, {"id": "e2"}]}));
    let local = doc(json!({"events": [{"id": "e1"}]}));

    let merged = Merger::default()
        .merge(&remote, &local, &[LogicalKey::Events])
        .document;
    assert_eq!(merged["events"], json!([{"id": "e1"}, {"id": "e2"}]));
}

#[test]
fn merge_records_without_id_dedup_by_content() {
    let remote = doc(json!({"roster": [{"name": "Guest"}, {"id": "", "name": "Empty"}]}));
    let local = doc(json!({"roster": [{"name": "Guest"}, {"name": "Other"}]}));

    let merged = Merger::default()
        .merge(&remote, &local, &[LogicalKey::Roster])
        .document;
    assert_eq!(
        merged["roster"],
        json!([{"name": "Guest"}, {"id": "", "name": "Empty"}, {"name": "Other"}])
    );
}

#[test]
fn remote_wins_reports_but_keeps_remote_leaves() {
    let remote = doc(json!({"ratings": {"e1": {"p1": {"fitness": 3}}}, "season": "a"}));
    let local = doc(json!({"ratings": {"e1": {"p1": {"fitness": 5}, "p2": {"fitness": 1}}}, "season": "b"}));

    let result = Merger::new(ConflictResolution::RemoteWins)
        .merge(&remote, &local, &[LogicalKey::Ratings, LogicalKey::Season]);

    assert_eq!(
        result.document["ratings"],
        json!({"e1": {"p1": {"fitness": 3}, "p2": {"fitness": 1}}})
    );
    assert_eq!(result.document["season"], json!("a"));
    assert_eq!(result.overlaps.len(), 2);
    assert!(result
        .overlaps
        .iter()
        .all(|o| o.resolution == ConflictResolution::RemoteWins));
}

#[test]
fn append_log_integer_and_float_values_dedup() {
    let remote = doc(json!({"fitness-tests": {"p1": [
        {"test": "cooper", "dateISO": "2025-01-01", "value": 3000}
    ]}}));
    let local = doc(json!({"fitness-tests": {"p1": [
        {"test": "cooper", "dateISO": "2025-01-01", "value": 3000.0}
    ]}}));

    let merged = Merger::default()
        .merge(&remote, &local, &[LogicalKey::FitnessTests])
        .document;
    assert_eq!(merged["fitness-tests"]["p1"].as_array().map(Vec::len), Some(1));
}

#[test]
fn scalar_absent_on_both_sides_stays_absent() {
    let merged = Merger::default()
        .merge(&Document::new(), &Document::new(), &[LogicalKey::LastAutoBackup])
        .document;
    assert!(!merged.contains_key("last-auto-backup"));
}

// ============================================================================
// Domain Edge Cases
// ============================================================================

#[test]
fn cascade_delete_of_unknown_event_is_noop() {
    let mut store = store();
    store.write(LogicalKey::Events, &json!([{"id": "e1"}]), 1).unwrap();
    store.clear_dirty(&[LogicalKey::Events]).unwrap();

    assert!(!club::delete_event_cascade(&mut store, "nope", 2).unwrap());
    assert!(!store.has_dirty());
}

#[test]
fn cleanup_on_empty_store_changes_nothing() {
    let mut store = store();
    let report = club::cleanup_orphans(&mut store, CleanupOptions::default(), 1).unwrap();

    assert!(report.changed_keys.is_empty());
    assert!(!store.has_dirty());
}

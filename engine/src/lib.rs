//! # clubsync engine
//!
//! Offline-first store and merge logic for a sports club's team data.
//!
//! The club's data (events, roster, attendance, ratings, fitness tests, match
//! stats, lineups and a few scalars) lives in one flat JSON document. Every
//! device keeps a full local copy and exchanges the whole document with a
//! single remote endpoint. This crate holds everything about that exchange
//! that does not touch the network.
//!
//! ## Design Principles
//!
//! - **No IO**: storage goes through [`StorageBackend`], time is passed in
//! - **Deterministic**: the same inputs always produce the same merge
//! - **Table-driven**: one [`KEY_TABLE`] decides how each key is merged
//!
//! ## Core Concepts
//!
//! ### Logical keys
//!
//! The document is keyed by [`LogicalKey`]. Each key has a [`KeyShape`]:
//! identity-keyed list, two-level map, append log or scalar.
//!
//! ### Local store
//!
//! [`LocalStore`] reads never fail (they fall back), writes mark the key dirty.
//! The store also keeps the pull cursor, the last remote version absorbed.
//!
//! ### Merge
//!
//! After a rejected push, [`Merger`] combines the fresh remote document with
//! the local edits of the dirty keys. Local edits win by default; the
//! [`ConflictResolution`] can flip that, and every dropped value is reported
//! as a [`MergeOverlap`].
//!
//! ## Quick Start
//!
//! ```rust
//! use clubsync_engine::{LocalStore, LogicalKey, MemoryBackend, Merger};
//! use serde_json::json;
//!
//! let mut store = LocalStore::new(MemoryBackend::new());
//! store
//!     .write(LogicalKey::Roster, &json!([{"id": "p1", "name": "Jonas B"}]), 1_000)
//!     .unwrap();
//! assert_eq!(store.dirty_keys(), vec![LogicalKey::Roster]);
//!
//! // Another device added a player in the meantime.
//! let remote = json!({"roster": [
//!     {"id": "p1", "name": "Jonas"},
//!     {"id": "p2", "name": "Maik"}
//! ]});
//! let remote = remote.as_object().unwrap().clone();
//!
//! let merged = Merger::default().merge(&remote, &store.snapshot(), &store.dirty_keys());
//! assert_eq!(
//!     merged.document["roster"],
//!     json!([{"id": "p1", "name": "Jonas B"}, {"id": "p2", "name": "Maik"}])
//! );
//! ```

pub mod backup;
pub mod club;
pub mod error;
pub mod keys;
pub mod merge;
pub mod store;

// Re-export main types at crate root
pub use backup::{BackupPayload, BackupSnapshot, MAX_BACKUPS};
pub use error::Error;
pub use keys::{EmptyValue, KeyShape, KeySpec, LogicalKey, KEY_TABLE};
pub use merge::{merge, ConflictResolution, MergeOverlap, MergeResult, Merger};
pub use store::{DirtySnapshot, LocalStore, MemoryBackend, StorageBackend};

/// The shared document: logical key name -> value.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

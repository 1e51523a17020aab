//! In-process remote with the same compare-and-swap rules as the endpoint.

use super::{GetOutcome, RemoteTransport, SetOutcome, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use clubsync_engine::Document;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct RemoteState {
    version: i64,
    updated_at: Option<String>,
    data: Document,
    writes: Vec<Document>,
}

/// A remote document kept in memory.
///
/// Every accepted write bumps a version counter and gets an RFC 3339 stamp
/// one second after the previous one, so stamps order like real ones.
/// Failures and conflicts can be injected to exercise the sync paths.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
    fail_gets: AtomicBool,
    fail_sets: AtomicBool,
    forced_conflicts: AtomicUsize,
    latency_ms: AtomicUsize,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stamp of the `version`-th accepted write.
    pub fn stamp_for(version: i64) -> String {
        let epoch = DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(20_089);
        (epoch + TimeDelta::seconds(version)).to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Overwrite the document as another device would. Returns the new stamp.
    pub fn replace(&self, data: Document) -> String {
        let mut state = self.state();
        state.version += 1;
        let stamp = Self::stamp_for(state.version);
        state.updated_at = Some(stamp.clone());
        state.data = data;
        stamp
    }

    /// Current document and stamp.
    pub fn current(&self) -> (Option<String>, Document) {
        let state = self.state();
        (state.updated_at.clone(), state.data.clone())
    }

    /// Documents accepted through [`RemoteTransport::set`], oldest first.
    pub fn accepted_writes(&self) -> Vec<Document> {
        self.state().writes.clone()
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Make reads fail until reset.
    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Make writes fail until reset.
    pub fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    /// Reject the next `count` writes as conflicts regardless of their base.
    pub fn force_conflicts(&self, count: usize) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = usize::try_from(latency.as_millis()).unwrap_or(usize::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    async fn delay(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        }
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteTransport for MemoryRemote {
    async fn get(&self) -> GetOutcome {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if self.fail_gets.load(Ordering::SeqCst) {
            return GetOutcome::Failed(TransportError::Request("connection refused".into()));
        }
        let (updated_at, data) = self.current();
        GetOutcome::Ok { updated_at, data }
    }

    async fn set(&self, data: &Document, base_updated_at: Option<&str>) -> SetOutcome {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if self.fail_sets.load(Ordering::SeqCst) {
            return SetOutcome::Failed(TransportError::Request("connection refused".into()));
        }
        if self.take_forced_conflict() {
            return SetOutcome::Conflict;
        }

        let mut state = self.state();
        let current = state.updated_at.as_deref().unwrap_or("");
        if base_updated_at.unwrap_or("") != current {
            return SetOutcome::Conflict;
        }

        state.version += 1;
        let updated_at = Self::stamp_for(state.version);
        state.updated_at = Some(updated_at.clone());
        state.data = data.clone();
        state.writes.push(data.clone());
        SetOutcome::Ok { updated_at }
    }
}

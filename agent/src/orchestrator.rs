//! Sync orchestrator - moves the local store and the remote document
//! towards each other.
//!
//! # Flow
//!
//! ```text
//! write ──► store (dirty) ──► debounce ──► push ──► SET(base = cursor)
//!                                               │
//!                                  conflict ◄───┘
//!                                     │
//!                         GET ──► merge dirty keys ──► apply ──► SET once more
//!
//! interval ──► push pending ──► pull ──► GET ──► overwrite synced keys
//! ```
//!
//! Pull and push each run at most once at a time. A second call of the same
//! kind while one is in flight returns [`PullOutcome::Skipped`] or
//! [`PushOutcome::Skipped`] instead of queueing.

use crate::transport::{GetOutcome, RemoteTransport, SetOutcome, TransportError};
use clubsync_engine::{
    backup, club, error::Result, ConflictResolution, DirtySnapshot, Document, LocalStore,
    LogicalKey, MergeOverlap, Merger, StorageBackend, Timestamp,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// The store type the orchestrator works on.
pub type Store = LocalStore<Box<dyn StorageBackend>>;

/// Timing and merge settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Quiet period after the last write before a push
    pub push_debounce: Duration,
    /// Time between scheduled pulls
    pub pull_interval: Duration,
    /// Upper bound for every remote call
    pub request_timeout: Duration,
    pub conflict_resolution: ConflictResolution,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            push_debounce: Duration::from_millis(900),
            pull_interval: Duration::from_millis(8000),
            request_timeout: Duration::from_millis(5000),
            conflict_resolution: ConflictResolution::LocalWins,
        }
    }
}

/// Connection state shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// No remote call has completed yet
    Connecting,
    /// The last remote call succeeded
    Live,
    /// The last remote call failed
    Degraded,
}

/// What a pull did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum PullOutcome {
    /// Another pull was in flight
    Skipped,
    /// The remote document was written into the store
    #[serde(rename_all = "camelCase")]
    Applied {
        updated_at: Option<String>,
        keys: Vec<LogicalKey>,
    },
    /// The response was older than the pull cursor and was dropped
    #[serde(rename_all = "camelCase")]
    Stale { updated_at: String },
    /// The remote was empty, so the local state was pushed instead
    InitialPush { push: Box<PushOutcome> },
    Failed { error: TransportError },
    /// The local store could not be written
    StoreFailed { error: String },
}

/// What a push did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum PushOutcome {
    /// Another push was in flight
    Skipped,
    /// Nothing was dirty
    Clean,
    /// The remote accepted the local snapshot
    #[serde(rename_all = "camelCase")]
    Pushed {
        updated_at: String,
        cleared: Vec<LogicalKey>,
    },
    /// The first write conflicted; the merged document was accepted
    #[serde(rename_all = "camelCase")]
    Merged {
        updated_at: String,
        cleared: Vec<LogicalKey>,
        overlaps: Vec<MergeOverlap>,
    },
    /// The retry conflicted too; dirty keys stay for the next cycle
    Deferred,
    Failed { error: TransportError },
    StoreFailed { error: String },
}

/// Result of the startup maintenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub cleanup: club::CleanupReport,
    /// Id of the automatic backup taken, if one was due
    pub backup_id: Option<String>,
}

/// Clears an in-flight flag when dropped.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Milliseconds since the epoch.
pub fn now_ms() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

/// Coordinates the local store with a remote transport.
pub struct SyncOrchestrator {
    store: Mutex<Store>,
    transport: Arc<dyn RemoteTransport>,
    merger: Merger,
    settings: SyncSettings,
    pulling: AtomicBool,
    pushing: AtomicBool,
    push_tx: mpsc::UnboundedSender<()>,
    push_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    status: watch::Sender<SyncStatus>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncOrchestrator {
    pub fn new<B>(backend: B, transport: Arc<dyn RemoteTransport>, settings: SyncSettings) -> Self
    where
        B: StorageBackend + 'static,
    {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(SyncStatus::Connecting);
        Self {
            store: Mutex::new(LocalStore::new(Box::new(backend))),
            transport,
            merger: Merger::new(settings.conflict_resolution),
            settings,
            pulling: AtomicBool::new(false),
            pushing: AtomicBool::new(false),
            push_tx,
            push_rx: Mutex::new(Some(push_rx)),
            status,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Create a shared orchestrator.
    pub fn new_shared<B>(
        backend: B,
        transport: Arc<dyn RemoteTransport>,
        settings: SyncSettings,
    ) -> Arc<Self>
    where
        B: StorageBackend + 'static,
    {
        Arc::new(Self::new(backend, transport, settings))
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Local access
    // ------------------------------------------------------------------

    /// Raw value of a key, `None` if missing or unreadable.
    pub fn read_value(&self, key: LogicalKey) -> Option<Value> {
        self.store().read_value(key)
    }

    /// Typed value of a key, `fallback` if missing or unreadable.
    pub fn read<T: serde::de::DeserializeOwned>(&self, key: LogicalKey, fallback: T) -> T {
        self.store().read(key, fallback)
    }

    /// Write a key and schedule a push.
    pub fn write<T: Serialize + ?Sized>(&self, key: LogicalKey, value: &T) -> Result<()> {
        self.transact(|store| store.write(key, value, now_ms()))
    }

    /// Reset a key to its empty default and schedule a push.
    pub fn reset(&self, key: LogicalKey) -> Result<()> {
        self.transact(|store| store.reset(key, now_ms()))
    }

    /// Run `f` against the store under the lock.
    ///
    /// A push is scheduled if `f` changed any dirty mark.
    pub fn transact<R>(&self, f: impl FnOnce(&mut Store) -> Result<R>) -> Result<R> {
        let (result, changed) = {
            let mut store = self.store();
            let before = store.dirty_snapshot();
            let result = f(&mut store);
            (result, store.dirty_snapshot() != before)
        };
        if changed {
            self.schedule_push();
        }
        result
    }

    pub fn dirty_keys(&self) -> Vec<LogicalKey> {
        self.store().dirty_keys()
    }

    pub fn pull_cursor(&self) -> Option<String> {
        self.store().pull_cursor()
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Receive status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    fn set_status(&self, status: SyncStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            tracing::info!(from = ?*current, to = ?status, "Sync status changed");
            *current = status;
            true
        });
    }

    /// Request a debounced push.
    pub fn schedule_push(&self) {
        // the receiver only goes away with the orchestrator
        let _ = self.push_tx.send(());
    }

    // ------------------------------------------------------------------
    // Remote calls
    // ------------------------------------------------------------------

    async fn bounded<T>(&self, call: impl Future<Output = T>, on_timeout: T) -> T {
        match tokio::time::timeout(self.settings.request_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => on_timeout,
        }
    }

    async fn fetch(&self) -> GetOutcome {
        let outcome = self
            .bounded(
                self.transport.get(),
                GetOutcome::Failed(TransportError::Timeout),
            )
            .await;
        match &outcome {
            GetOutcome::Ok { .. } => self.set_status(SyncStatus::Live),
            GetOutcome::Failed(error) => self.transport_failed("get", error),
        }
        outcome
    }

    async fn send(&self, data: &Document, base: Option<&str>) -> SetOutcome {
        let outcome = self
            .bounded(
                self.transport.set(data, base),
                SetOutcome::Failed(TransportError::Timeout),
            )
            .await;
        match &outcome {
            SetOutcome::Ok { .. } | SetOutcome::Conflict => self.set_status(SyncStatus::Live),
            SetOutcome::Failed(error) => self.transport_failed("set", error),
        }
        outcome
    }

    fn transport_failed(&self, call: &'static str, error: &TransportError) {
        match error {
            TransportError::Offline => tracing::debug!(call, "Offline, remote call skipped"),
            _ => tracing::warn!(call, error = %error, "Remote call failed"),
        }
        self.set_status(SyncStatus::Degraded);
    }

    // ------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------

    /// Fetch the remote document and overwrite the local synced keys.
    ///
    /// An empty remote is seeded with a full push of the local state.
    pub async fn pull_once(&self) -> PullOutcome {
        let Some(_guard) = FlagGuard::acquire(&self.pulling) else {
            tracing::debug!("Pull already in flight, skipping");
            return PullOutcome::Skipped;
        };

        let (updated_at, data) = match self.fetch().await {
            GetOutcome::Ok { updated_at, data } => (updated_at, data),
            GetOutcome::Failed(error) => return PullOutcome::Failed { error },
        };

        if data.is_empty() {
            tracing::info!("Remote document is empty, pushing local state");
            let push = self.push_now(true).await;
            return PullOutcome::InitialPush {
                push: Box::new(push),
            };
        }

        let mut store = self.store();
        if let Some(stamp) = &updated_at {
            if store.is_stale(stamp) {
                tracing::debug!(updated_at = %stamp, "Dropping stale pull response");
                return PullOutcome::Stale {
                    updated_at: stamp.clone(),
                };
            }
        }

        let applied = store.apply_document(&data).and_then(|keys| {
            if let Some(stamp) = &updated_at {
                store.advance_cursor(stamp)?;
            }
            Ok(keys)
        });

        match applied {
            Ok(keys) => {
                tracing::debug!(updated_at = ?updated_at, keys = keys.len(), "Pulled remote document");
                PullOutcome::Applied { updated_at, keys }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to apply remote document");
                PullOutcome::StoreFailed {
                    error: e.to_string(),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Ship the full local snapshot to the remote.
    ///
    /// Without `force_all` nothing is sent unless a key is dirty. A rejected
    /// write is merged with a fresh remote copy and retried exactly once.
    pub async fn push_now(&self, force_all: bool) -> PushOutcome {
        let Some(_guard) = FlagGuard::acquire(&self.pushing) else {
            tracing::debug!("Push already in flight, skipping");
            return PushOutcome::Skipped;
        };

        let outcome = self.push_locked(force_all).await;

        let accepted = matches!(
            outcome,
            PushOutcome::Pushed { .. } | PushOutcome::Merged { .. }
        );
        if accepted && self.store().has_dirty() {
            // written while the push was in flight
            self.schedule_push();
        }
        outcome
    }

    async fn push_locked(&self, force_all: bool) -> PushOutcome {
        let (dirty, base, local) = {
            let store = self.store();
            let mut dirty = store.dirty_snapshot();
            if force_all {
                // a forced push also settles keys that were never written
                for key in LogicalKey::synced() {
                    dirty.entry(key).or_insert(0);
                }
            }
            (dirty, store.pull_cursor(), store.snapshot())
        };

        if dirty.is_empty() {
            return PushOutcome::Clean;
        }

        match self.send(&local, base.as_deref()).await {
            SetOutcome::Ok { updated_at } => self.settle(&dirty, &updated_at, |cleared| {
                PushOutcome::Pushed {
                    updated_at: updated_at.clone(),
                    cleared,
                }
            }),
            SetOutcome::Failed(error) => PushOutcome::Failed { error },
            SetOutcome::Conflict => {
                tracing::info!(base = ?base, "Push rejected, remote moved on");
                self.resolve_conflict(&dirty, &local).await
            }
        }
    }

    async fn resolve_conflict(&self, dirty: &DirtySnapshot, local: &Document) -> PushOutcome {
        let (fresh_base, remote) = match self.fetch().await {
            GetOutcome::Ok { updated_at, data } => (updated_at, data),
            GetOutcome::Failed(error) => return PushOutcome::Failed { error },
        };

        let (document, overlaps) = if remote.is_empty() {
            (local.clone(), Vec::new())
        } else {
            let keys: Vec<LogicalKey> = dirty.keys().copied().collect();
            let result = self.merger.merge(&remote, local, &keys);
            for overlap in &result.overlaps {
                tracing::info!(
                    key = %overlap.key,
                    path = %overlap.path,
                    resolution = ?overlap.resolution,
                    "Merge overlap"
                );
            }

            // keys rewritten since the snapshot keep their newer local value
            let applied = {
                let mut store = self.store();
                let renewed: BTreeSet<LogicalKey> = store
                    .dirty_snapshot()
                    .into_iter()
                    .filter(|(key, mark)| dirty.get(key) != Some(mark))
                    .map(|(key, _)| key)
                    .collect();
                store.apply_document_except(&result.document, &renewed)
            };
            if let Err(e) = applied {
                tracing::error!(error = %e, "Failed to apply merged document");
                return PushOutcome::StoreFailed {
                    error: e.to_string(),
                };
            }
            (result.document, result.overlaps)
        };

        match self.send(&document, fresh_base.as_deref()).await {
            SetOutcome::Ok { updated_at } => self.settle(dirty, &updated_at, |cleared| {
                PushOutcome::Merged {
                    updated_at: updated_at.clone(),
                    cleared,
                    overlaps,
                }
            }),
            SetOutcome::Conflict => {
                tracing::info!("Retry rejected again, keeping changes for the next cycle");
                PushOutcome::Deferred
            }
            SetOutcome::Failed(error) => PushOutcome::Failed { error },
        }
    }

    /// Record an accepted write: advance the cursor and clear settled marks.
    fn settle(
        &self,
        dirty: &DirtySnapshot,
        updated_at: &str,
        outcome: impl FnOnce(Vec<LogicalKey>) -> PushOutcome,
    ) -> PushOutcome {
        let mut store = self.store();
        let settled = store
            .advance_cursor(updated_at)
            .and_then(|_| store.clear_dirty_snapshot(dirty));
        match settled {
            Ok(cleared) => {
                tracing::debug!(updated_at, cleared = cleared.len(), "Push accepted");
                outcome(cleared)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to record accepted push");
                PushOutcome::StoreFailed {
                    error: e.to_string(),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Drop orphaned entries and take the daily backup if one is due.
    pub fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let cleanup = self.cleanup_orphans(club::CleanupOptions::default())?;
        let backup = self.transact(|store| backup::auto_backup_daily(store, today(), now_ms()))?;
        Ok(MaintenanceReport {
            cleanup,
            backup_id: backup.map(|b| b.id),
        })
    }

    pub fn cleanup_orphans(&self, options: club::CleanupOptions) -> Result<club::CleanupReport> {
        let report = self.transact(|store| club::cleanup_orphans(store, options, now_ms()))?;
        if !report.changed_keys.is_empty() {
            tracing::info!(
                removed_events = report.removed_events,
                removed_players = report.removed_players,
                "Cleaned up orphaned entries"
            );
        }
        Ok(report)
    }

    pub fn delete_event(&self, event_id: &str) -> Result<bool> {
        self.transact(|store| club::delete_event_cascade(store, event_id, now_ms()))
    }

    // ------------------------------------------------------------------
    // Club records
    // ------------------------------------------------------------------

    /// Stored events with the season filled in.
    pub fn events(&self) -> Result<Vec<Value>> {
        self.transact(|store| club::load_events(store, today(), now_ms()))
    }

    pub fn create_event(&self, new: club::NewEvent) -> Result<club::Event> {
        let event = self.transact(|store| club::create_event(store, new, today(), now_ms()))?;
        tracing::info!(id = %event.id, "Event created");
        Ok(event)
    }

    pub fn upsert_player(&self, player: &club::Player) -> Result<()> {
        self.transact(|store| club::upsert_player(store, player, now_ms()))
    }

    pub fn set_attendance(&self, event_id: &str, player_id: &str, present: bool) -> Result<()> {
        self.transact(|store| club::set_attendance(store, event_id, player_id, present, now_ms()))
    }

    pub fn set_rating(&self, event_id: &str, player_id: &str, rating: &club::Rating) -> Result<()> {
        self.transact(|store| club::set_rating(store, event_id, player_id, rating, now_ms()))
    }

    pub fn set_match_stats(
        &self,
        event_id: &str,
        player_id: &str,
        stats: &club::MatchStats,
    ) -> Result<()> {
        self.transact(|store| club::set_match_stats(store, event_id, player_id, stats, now_ms()))
    }

    pub fn set_lineup(&self, event_id: &str, lineup: &club::Lineup) -> Result<()> {
        self.transact(|store| club::set_lineup(store, event_id, lineup, now_ms()))
    }

    pub fn add_fitness_test(
        &self,
        player_id: &str,
        entry: &club::FitnessTestEntry,
    ) -> Result<club::TestGrade> {
        self.transact(|store| club::add_fitness_test(store, player_id, entry, now_ms()))
    }

    pub fn backups(&self) -> Vec<backup::BackupSnapshot> {
        backup::load_backups(&*self.store())
    }

    /// Take a backup now and store it with the others.
    pub fn create_backup(&self) -> Result<backup::BackupSnapshot> {
        self.transact(|store| {
            let now = now_ms();
            let season = club::load_season(store, today(), now)?;
            let snapshot = backup::make_backup(store, &season, now)?;
            backup::push_backup(store, snapshot.clone(), now)?;
            Ok(snapshot)
        })
    }

    pub fn restore_backup(&self, id: &str) -> Result<backup::BackupSnapshot> {
        self.transact(|store| {
            let snapshot = backup::find_backup(store, id)?;
            backup::restore_backup(store, &snapshot, now_ms())?;
            Ok(snapshot)
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Spawn the pull loop and the debounced pusher.
    ///
    /// The pull loop pulls once, runs maintenance, then pulls on every
    /// interval tick. Calling `start` twice has no effect.
    pub fn start(self: &Arc<Self>) {
        let Some(rx) = self
            .push_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            tracing::warn!("Sync orchestrator already started");
            return;
        };

        let pusher = tokio::spawn(Arc::clone(self).debounce_loop(rx));
        let puller = tokio::spawn(Arc::clone(self).pull_loop());

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([pusher, puller]);

        tracing::info!(
            debounce_ms = self.settings.push_debounce.as_millis() as u64,
            interval_ms = self.settings.pull_interval.as_millis() as u64,
            "Sync orchestrator started"
        );
    }

    /// Abort the background tasks.
    pub fn stop(&self) {
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in &tasks {
            task.abort();
        }
        if !tasks.is_empty() {
            tracing::info!("Sync orchestrator stopped");
        }
    }

    async fn debounce_loop(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<()>) {
        while rx.recv().await.is_some() {
            // every further request restarts the quiet period
            loop {
                match tokio::time::timeout(self.settings.push_debounce, rx.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }
            let outcome = self.push_now(false).await;
            tracing::debug!(?outcome, "Debounced push finished");
        }
    }

    async fn pull_loop(self: Arc<Self>) {
        let outcome = self.pull_once().await;
        tracing::debug!(?outcome, "Initial pull finished");

        if let Err(e) = self.run_maintenance() {
            tracing::error!(error = %e, "Startup maintenance failed");
        }

        let mut interval = tokio::time::interval(self.settings.pull_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            // pending changes go out before the pull overwrites them
            let pending = self.store().has_dirty();
            if pending {
                let outcome = self.push_now(false).await;
                tracing::debug!(?outcome, "Pending push before pull");
            }
            let outcome = self.pull_once().await;
            tracing::debug!(?outcome, "Scheduled pull finished");
        }
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

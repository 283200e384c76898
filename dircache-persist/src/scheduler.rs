//! Periodic snapshot persistence.
//!
//! A [`PersistenceScheduler`] owns one background task that snapshots the
//! cache on a fixed interval and hands the snapshot to a [`FileStore`].
//! Lookups never wait on disk: the only shared step is `cache.snapshot()`,
//! which holds the cache lock just long enough to clone entry handles.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use dircache_cache::ResultCache;
use dircache_core::constants::MAX_PERSIST_INTERVAL_SECS;
use dircache_core::error::{DirCacheError, Result};

use crate::store::{FileStore, SaveReport};

// ═══════════════════════════════════════════════════════════════════════════════
// STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle of the persistence task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, not started
    Idle,
    /// Waiting for the next tick
    Armed,
    /// Snapshotting and saving
    Firing,
    /// Task has exited; no further saves
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Armed => "armed",
            SchedulerState::Firing => "firing",
            SchedulerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Counters for persistence activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Interval ticks handled
    pub ticks: u64,
    /// Successful saves (ticks, `save_now`, and the shutdown save)
    pub saves: u64,
    /// Failed saves
    pub failures: u64,
    /// Entry count of the most recent successful save
    pub last_saved_entries: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SchedulerState>,
    ticks: AtomicU64,
    saves: AtomicU64,
    failures: AtomicU64,
    last_saved_entries: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(SchedulerState::Idle),
            ticks: AtomicU64::new(0),
            saves: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_saved_entries: AtomicU64::new(0),
        }
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock() = state;
    }

    fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            saves: self.saves.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_saved_entries: self.last_saved_entries.load(Ordering::Relaxed),
        }
    }
}

/// Snapshots the cache and saves it, updating counters either way.
async fn persist_once(cache: &ResultCache, store: &FileStore, shared: &Shared) -> Result<SaveReport> {
    match store.save_with(|| cache.snapshot()).await {
        Ok(report) => {
            shared.saves.fetch_add(1, Ordering::Relaxed);
            shared
                .last_saved_entries
                .store(report.entries as u64, Ordering::Relaxed);
            debug!(entries = report.entries, bytes = report.bytes, "Cache snapshot saved");
            Ok(report)
        }
        Err(e) => {
            shared.failures.fetch_add(1, Ordering::Relaxed);
            Err(e)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULER
// ═══════════════════════════════════════════════════════════════════════════════

/// Builder for the background persistence task.
///
/// ```rust,ignore
/// let handle = PersistenceScheduler::new(cache, store, Duration::from_secs(600))?
///     .save_on_shutdown(true)
///     .start();
/// // ...
/// handle.shutdown().await;
/// ```
pub struct PersistenceScheduler {
    cache: Arc<ResultCache>,
    store: Arc<FileStore>,
    interval: Duration,
    save_on_shutdown: bool,
    shared: Arc<Shared>,
}

impl PersistenceScheduler {
    /// Creates an idle scheduler.
    ///
    /// # Errors
    /// Returns a configuration error if `interval` is zero or longer than
    /// [`MAX_PERSIST_INTERVAL_SECS`].
    pub fn new(cache: Arc<ResultCache>, store: Arc<FileStore>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(DirCacheError::ConfigError(
                "persistence interval must be positive".into(),
            ));
        }
        if interval > Duration::from_secs(MAX_PERSIST_INTERVAL_SECS) {
            return Err(DirCacheError::ConfigError(format!(
                "persistence interval {:?} exceeds the maximum of {} seconds",
                interval, MAX_PERSIST_INTERVAL_SECS
            )));
        }

        Ok(Self {
            cache,
            store,
            interval,
            save_on_shutdown: true,
            shared: Arc::new(Shared::new()),
        })
    }

    /// Whether shutdown performs one last save. Defaults to true.
    pub fn save_on_shutdown(mut self, enabled: bool) -> Self {
        self.save_on_shutdown = enabled;
        self
    }

    /// Returns the tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the current state (always `Idle` before `start`).
    pub fn state(&self) -> SchedulerState {
        self.shared.state()
    }

    /// Arms the timer and spawns the background task.
    ///
    /// The first tick fires one full interval after start. Must be called
    /// from within a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let Self {
            cache,
            store,
            interval,
            save_on_shutdown,
            shared,
        } = self;

        shared.set_state(SchedulerState::Armed);
        info!(
            interval = ?interval,
            path = ?store.path(),
            "Persistence scheduler started"
        );

        let task = {
            let cache = Arc::clone(&cache);
            let store = Arc::clone(&store);
            let shared = Arc::clone(&shared);

            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;

                        changed = shutdown_rx.changed() => {
                            // A dropped sender also means shutdown
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }

                        _ = ticker.tick() => {
                            shared.ticks.fetch_add(1, Ordering::Relaxed);
                            shared.set_state(SchedulerState::Firing);
                            if let Err(e) = persist_once(&cache, &store, &shared).await {
                                warn!(error = %e, "Scheduled cache save failed; retrying next tick");
                            }
                            shared.set_state(SchedulerState::Armed);
                        }
                    }
                }

                if save_on_shutdown {
                    shared.set_state(SchedulerState::Firing);
                    if let Err(e) = persist_once(&cache, &store, &shared).await {
                        warn!(error = %e, "Final cache save failed");
                    }
                }

                shared.set_state(SchedulerState::Stopped);
                let stats = shared.stats();
                info!(
                    ticks = stats.ticks,
                    saves = stats.saves,
                    failures = stats.failures,
                    "Persistence scheduler stopped"
                );
            })
        };

        SchedulerHandle {
            cache,
            store,
            shared,
            shutdown_tx,
            task,
        }
    }
}

/// Handle to a running persistence task.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) also
/// stops the task, but nothing waits for its final save.
pub struct SchedulerHandle {
    cache: Arc<ResultCache>,
    store: Arc<FileStore>,
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Returns the current state.
    pub fn state(&self) -> SchedulerState {
        self.shared.state()
    }

    /// Returns a copy of the counters.
    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats()
    }

    /// Saves immediately, outside the tick schedule.
    ///
    /// Concurrent saves are serialized by the store.
    pub async fn save_now(&self) -> Result<SaveReport> {
        persist_once(&self.cache, &self.store, &self.shared).await
    }

    /// Signals cancellation and waits for the task to exit.
    ///
    /// An in-flight save completes first. With `save_on_shutdown` enabled
    /// one more save runs before the state becomes `Stopped`.
    pub async fn shutdown(self) -> SchedulerStats {
        // Err only if the task already exited
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.task.await {
            warn!(error = %e, "Persistence task did not exit cleanly");
            self.shared.set_state(SchedulerState::Stopped);
        }

        self.shared.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LoadOutcome;
    use dircache_core::types::{CacheKey, ResultRecord};
    use tempfile::tempdir;

    const TICK: Duration = Duration::from_millis(40);

    fn cache_with(n: u8) -> Arc<ResultCache> {
        let cache = ResultCache::new(100, Duration::from_secs(300)).unwrap();
        for i in 0..n {
            cache.put(
                CacheKey::from_array([i; 32]),
                ResultRecord::new().with("sn", format!("user{}", i)),
            );
        }
        Arc::new(cache)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn saved_len(store: &FileStore) -> usize {
        match store.load().await.unwrap() {
            LoadOutcome::Loaded(s) => s.len(),
            LoadOutcome::NotFound => panic!("no snapshot on disk"),
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        let store = Arc::new(FileStore::new("unused.bin"));
        let result = PersistenceScheduler::new(cache_with(0), store, Duration::ZERO);
        assert!(matches!(result, Err(DirCacheError::ConfigError(_))));
    }

    #[test]
    fn test_oversized_interval_rejected() {
        let store = Arc::new(FileStore::new("unused.bin"));
        for interval in [
            Duration::from_secs(u64::MAX),
            Duration::from_secs(MAX_PERSIST_INTERVAL_SECS + 1),
        ] {
            let result = PersistenceScheduler::new(cache_with(0), Arc::clone(&store), interval);
            assert!(matches!(result, Err(DirCacheError::ConfigError(_))));
        }

        let longest = Duration::from_secs(MAX_PERSIST_INTERVAL_SECS);
        let scheduler = PersistenceScheduler::new(cache_with(0), store, longest).unwrap();
        assert_eq!(scheduler.interval(), longest);
    }

    #[tokio::test]
    async fn test_longest_interval_starts_and_stops() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("cache.bin")));

        let handle = PersistenceScheduler::new(
            cache_with(1),
            store,
            Duration::from_secs(MAX_PERSIST_INTERVAL_SECS),
        )
        .unwrap()
        .save_on_shutdown(false)
        .start();

        let stats = handle.shutdown().await;
        assert_eq!(stats.ticks, 0);
    }

    #[tokio::test]
    async fn test_save_now_and_tick_keep_newest_snapshot() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("cache.bin")));
        let cache = cache_with(2);

        let handle = PersistenceScheduler::new(Arc::clone(&cache), Arc::clone(&store), TICK)
            .unwrap()
            .save_on_shutdown(false)
            .start();

        // Grow the cache while ticks and manual saves interleave
        for i in 2..12u8 {
            cache.put(CacheKey::from_array([i; 32]), ResultRecord::new().with("sn", "late"));
            handle.save_now().await.unwrap();
            tokio::time::sleep(TICK / 4).await;
        }
        handle.shutdown().await;

        assert_eq!(saved_len(&store).await, 12);
    }

    #[tokio::test]
    async fn test_state_lifecycle() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("cache.bin")));
        let scheduler =
            PersistenceScheduler::new(cache_with(1), store, Duration::from_secs(3600)).unwrap();

        assert_eq!(scheduler.state(), SchedulerState::Idle);
        let handle = scheduler.start();
        assert_eq!(handle.state(), SchedulerState::Armed);

        let shared = Arc::clone(&handle.shared);
        handle.shutdown().await;
        assert_eq!(shared.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_ticks_save_snapshot() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("cache.bin")));
        let cache = cache_with(3);

        let handle = PersistenceScheduler::new(Arc::clone(&cache), Arc::clone(&store), TICK)
            .unwrap()
            .start();

        wait_until(|| handle.stats().saves >= 2).await;
        let stats = handle.stats();
        assert!(stats.ticks >= 2);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.last_saved_entries, 3);

        handle.shutdown().await;
        assert_eq!(saved_len(&store).await, 3);
    }

    #[tokio::test]
    async fn test_failed_save_retries_next_tick() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("not-yet");
        let store = Arc::new(FileStore::new(missing.join("cache.bin")));

        let handle = PersistenceScheduler::new(cache_with(2), Arc::clone(&store), TICK)
            .unwrap()
            .start();

        wait_until(|| handle.stats().failures >= 1).await;
        assert_eq!(handle.stats().saves, 0);
        assert_ne!(handle.state(), SchedulerState::Stopped);

        // Directory appears; the schedule recovers without intervention
        std::fs::create_dir(&missing).unwrap();
        wait_until(|| handle.stats().saves >= 1).await;

        handle.shutdown().await;
        assert_eq!(saved_len(&store).await, 2);
    }

    #[tokio::test]
    async fn test_shutdown_performs_final_save() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("cache.bin")));
        let cache = cache_with(1);

        let handle = PersistenceScheduler::new(
            Arc::clone(&cache),
            Arc::clone(&store),
            Duration::from_secs(3600),
        )
        .unwrap()
        .start();

        // Written after start; only the shutdown save can capture it
        cache.put(CacheKey::from_array([9; 32]), ResultRecord::new().with("sn", "late"));

        let stats = handle.shutdown().await;
        assert_eq!(stats.ticks, 0);
        assert_eq!(stats.saves, 1);
        assert_eq!(stats.last_saved_entries, 2);
        assert_eq!(saved_len(&store).await, 2);
    }

    #[tokio::test]
    async fn test_shutdown_without_final_save() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("cache.bin")));

        let handle = PersistenceScheduler::new(cache_with(1), Arc::clone(&store), Duration::from_secs(3600))
            .unwrap()
            .save_on_shutdown(false)
            .start();

        let stats = handle.shutdown().await;
        assert_eq!(stats.saves, 0);
        assert_eq!(store.load().await.unwrap(), LoadOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_save_now() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("cache.bin")));

        let handle = PersistenceScheduler::new(cache_with(4), Arc::clone(&store), Duration::from_secs(3600))
            .unwrap()
            .save_on_shutdown(false)
            .start();

        let report = handle.save_now().await.unwrap();
        assert_eq!(report.entries, 4);
        assert_eq!(handle.stats().saves, 1);
        assert_eq!(saved_len(&store).await, 4);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_save_now_failure_is_counted() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("missing").join("cache.bin")));

        let handle = PersistenceScheduler::new(cache_with(1), store, Duration::from_secs(3600))
            .unwrap()
            .save_on_shutdown(false)
            .start();

        let err = handle.save_now().await.unwrap_err();
        assert!(matches!(err, DirCacheError::Save { .. }));
        assert_eq!(handle.stats().failures, 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropped_handle_stops_task() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("cache.bin")));

        let handle = PersistenceScheduler::new(cache_with(1), Arc::clone(&store), Duration::from_secs(3600))
            .unwrap()
            .start();
        let shared = Arc::clone(&handle.shared);
        drop(handle);

        wait_until(|| shared.state() == SchedulerState::Stopped).await;
        assert_eq!(saved_len(&store).await, 1);
    }
}

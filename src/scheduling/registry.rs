//! Cross-interval image reuse registry
//!
//! Donor intervals publish the outcome of each camera capture under
//! `(camera, tick, donor interval)`. Consumer intervals due on the same tick
//! wait on that key instead of requesting the same frame again. Each entry
//! carries a `watch` channel, so every waiter is woken by a single publish.
//!
//! Entries older than the retention window are invisible to lookups and are
//! dropped by [`ReuseRegistry::purge`] once no task is waiting on them.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::{CameraId, ImageArtifact, IntervalSpec};

/// Minimum spacing between opportunistic purges.
const OPPORTUNISTIC_PURGE_EVERY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub camera: CameraId,
    pub tick: u64,
    pub donor: IntervalSpec,
}

impl RegistryKey {
    pub fn new(camera: CameraId, tick: u64, donor: IntervalSpec) -> Self {
        Self {
            camera,
            tick,
            donor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Ready(ImageArtifact),
    Failed(String),
}

impl EntryState {
    fn is_terminal(&self) -> bool {
        !matches!(self, EntryState::Pending)
    }
}

/// Result of [`ReuseRegistry::await_ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitResult {
    Ready(ImageArtifact),
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Result of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishResult {
    Stored,
    /// Same terminal state already present.
    Duplicate,
    /// A different terminal state is present; the new one was dropped.
    Conflict,
}

#[derive(Debug)]
struct Entry {
    tx: watch::Sender<EntryState>,
    created_at: Instant,
}

impl Entry {
    fn new(now: Instant) -> Self {
        let (tx, _rx) = watch::channel(EntryState::Pending);
        Self { tx, created_at: now }
    }

    fn waiters(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<RegistryKey, Entry>,
    last_purge: Instant,
}

/// Process-wide reuse table shared by all interval runners.
#[derive(Debug)]
pub struct ReuseRegistry {
    inner: Mutex<Inner>,
    window: Duration,
}

impl ReuseRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                last_purge: Instant::now(),
            }),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // No code path panics while holding the lock; recover the data anyway.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) > self.window
    }

    /// Live entry for `key`, replacing an expired one with a fresh `Pending`.
    fn live_entry<'a>(&self, inner: &'a mut Inner, key: &RegistryKey, now: Instant) -> &'a Entry {
        let expired = inner
            .entries
            .get(key)
            .is_some_and(|e| self.is_expired(e, now));
        if expired {
            inner.entries.remove(key);
        }
        inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(now))
    }

    fn maybe_purge(&self, inner: &mut Inner, now: Instant) {
        if now.saturating_duration_since(inner.last_purge) >= OPPORTUNISTIC_PURGE_EVERY {
            self.purge_locked(inner, now);
        }
    }

    /// Mark a donor capture as started. Idempotent.
    pub fn begin(&self, key: &RegistryKey) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.maybe_purge(&mut inner, now);
        self.live_entry(&mut inner, key, now);
    }

    pub fn publish_ready(&self, key: &RegistryKey, artifact: ImageArtifact) -> PublishResult {
        self.publish(key, EntryState::Ready(artifact))
    }

    pub fn publish_failed(&self, key: &RegistryKey, reason: impl Into<String>) -> PublishResult {
        self.publish(key, EntryState::Failed(reason.into()))
    }

    /// Store a terminal state and wake every waiter.
    ///
    /// The first terminal state wins; a later identical publish is a no-op and
    /// a later conflicting one is logged and ignored.
    fn publish(&self, key: &RegistryKey, state: EntryState) -> PublishResult {
        let now = Instant::now();
        let mut inner = self.lock();
        let entry = self.live_entry(&mut inner, key, now);

        let current = entry.tx.borrow().clone();
        if current.is_terminal() {
            if current == state {
                debug!(camera = %key.camera, tick = key.tick, "Duplicate registry publish ignored");
                return PublishResult::Duplicate;
            }
            warn!(
                camera = %key.camera,
                tick = key.tick,
                donor = %key.donor,
                existing = ?current,
                rejected = ?state,
                "Conflicting registry publish, keeping first outcome"
            );
            return PublishResult::Conflict;
        }

        entry.tx.send_replace(state);
        PublishResult::Stored
    }

    /// Current state of `key`; `None` when absent or expired.
    pub fn lookup(&self, key: &RegistryKey) -> Option<EntryState> {
        let now = Instant::now();
        let inner = self.lock();
        inner
            .entries
            .get(key)
            .filter(|e| !self.is_expired(e, now))
            .map(|e| e.tx.borrow().clone())
    }

    /// Wait until `key` is terminal, `timeout` elapses or `cancel` fires.
    ///
    /// An absent key registers interest with a `Pending` entry so a later
    /// publish wakes this waiter. The waiter is detached on every exit path.
    pub async fn await_ready(
        &self,
        key: &RegistryKey,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitResult {
        let mut rx = {
            let now = Instant::now();
            let mut inner = self.lock();
            self.maybe_purge(&mut inner, now);
            self.live_entry(&mut inner, key, now).tx.subscribe()
        };

        let wait = async move {
            loop {
                let state = rx.borrow_and_update().clone();
                match state {
                    EntryState::Ready(artifact) => return WaitResult::Ready(artifact),
                    EntryState::Failed(reason) => return WaitResult::Failed(reason),
                    EntryState::Pending => {}
                }
                if rx.changed().await.is_err() {
                    return WaitResult::Failed("registry entry dropped".to_string());
                }
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => WaitResult::Cancelled,
            res = tokio::time::timeout(timeout, wait) => res.unwrap_or(WaitResult::TimedOut),
        }
    }

    /// Drop expired entries that nobody waits on. Returns how many were removed.
    pub fn purge(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        self.purge_locked(&mut inner, now)
    }

    fn purge_locked(&self, inner: &mut Inner, now: Instant) -> usize {
        let before = inner.entries.len();
        let window = self.window;
        inner.entries.retain(|_, e| {
            now.saturating_duration_since(e.created_at) <= window || e.waiters() > 0
        });
        inner.last_purge = now;
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(removed, remaining = inner.entries.len(), "Purged reuse registry");
        }
        removed
    }

    /// Periodic purge until cancelled.
    pub async fn run_purger(&self, cancel: CancellationToken) {
        let period = (self.window / 2).max(Duration::from_secs(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = interval.tick() => {
                    self.purge();
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks currently blocked in `await_ready` on `key`.
    pub fn waiter_count(&self, key: &RegistryKey) -> usize {
        self.lock().entries.get(key).map_or(0, Entry::waiters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn key(tick: u64) -> RegistryKey {
        RegistryKey::new(CameraId::new("Front"), tick, IntervalSpec::new(60).unwrap())
    }

    fn artifact(name: &str) -> ImageArtifact {
        ImageArtifact {
            path: PathBuf::from(name),
            bytes: 2048,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_wakes_all_waiters() {
        let reg = Arc::new(ReuseRegistry::new(Duration::from_secs(120)));
        let cancel = CancellationToken::new();
        reg.begin(&key(180));

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let reg = Arc::clone(&reg);
            let cancel = cancel.clone();
            waiters.push(tokio::spawn(async move {
                reg.await_ready(&key(180), Duration::from_secs(30), &cancel).await
            }));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(reg.waiter_count(&key(180)), 3);

        assert_eq!(reg.publish_ready(&key(180), artifact("a.jpg")), PublishResult::Stored);
        for w in waiters {
            assert_eq!(w.await.unwrap(), WaitResult::Ready(artifact("a.jpg")));
        }
        assert_eq!(reg.waiter_count(&key(180)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_before_begin_registers_interest() {
        let reg = Arc::new(ReuseRegistry::new(Duration::from_secs(120)));
        let cancel = CancellationToken::new();
        let waiter = {
            let reg = Arc::clone(&reg);
            tokio::spawn(async move {
                reg.await_ready(&key(60), Duration::from_secs(30), &cancel).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(reg.lookup(&key(60)), Some(EntryState::Pending));

        reg.publish_failed(&key(60), "timeout");
        assert_eq!(waiter.await.unwrap(), WaitResult::Failed("timeout".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_detaches_waiter() {
        let reg = ReuseRegistry::new(Duration::from_secs(120));
        let cancel = CancellationToken::new();
        reg.begin(&key(60));
        let res = reg.await_ready(&key(60), Duration::from_secs(5), &cancel).await;
        assert_eq!(res, WaitResult::TimedOut);
        assert_eq!(reg.waiter_count(&key(60)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_promptly() {
        let reg = Arc::new(ReuseRegistry::new(Duration::from_secs(120)));
        let cancel = CancellationToken::new();
        let waiter = {
            let reg = Arc::clone(&reg);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                reg.await_ready(&key(60), Duration::from_secs(3600), &cancel).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), WaitResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_terminal_write_wins() {
        let reg = ReuseRegistry::new(Duration::from_secs(120));
        assert_eq!(reg.publish_ready(&key(60), artifact("a.jpg")), PublishResult::Stored);
        assert_eq!(reg.publish_ready(&key(60), artifact("a.jpg")), PublishResult::Duplicate);
        assert_eq!(reg.publish_failed(&key(60), "late"), PublishResult::Conflict);
        assert_eq!(reg.lookup(&key(60)), Some(EntryState::Ready(artifact("a.jpg"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_invisible_and_purged() {
        let reg = ReuseRegistry::new(Duration::from_secs(120));
        reg.publish_ready(&key(60), artifact("a.jpg"));
        tokio::time::advance(Duration::from_secs(121)).await;

        assert_eq!(reg.lookup(&key(60)), None);
        assert_eq!(reg.purge(), 1);
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_keeps_entries_with_waiters() {
        let reg = Arc::new(ReuseRegistry::new(Duration::from_secs(10)));
        let cancel = CancellationToken::new();
        reg.begin(&key(60));
        let waiter = {
            let reg = Arc::clone(&reg);
            tokio::spawn(async move {
                reg.await_ready(&key(60), Duration::from_secs(30), &cancel).await
            })
        };
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(reg.purge(), 0, "entry with a waiter must survive purge");

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(waiter.await.unwrap(), WaitResult::TimedOut);
        assert_eq!(reg.purge(), 1);
    }
}

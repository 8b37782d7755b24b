//! Reference-counted registry of named locks.

use super::adapter::LockAdapter;
use super::diagnostics::BlockingDiagnostics;
use super::interrupt::Interrupter;
use super::types::{FairLockProvider, Lock, LockProvider};
use crate::config::Config;
use crate::error::LockError;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Live state of one named lock.
struct LockEntry {
    lock: Arc<dyn Lock>,
    references: AtomicUsize,
}

/// Registry guaranteeing one underlying lock per identifier while contended.
///
/// Every `lock`/`try_lock`/`lock_interruptibly` first registers the caller as
/// a reference on the identifier's entry, creating it if needed; the reference
/// is dropped again on `unlock` or on a failed acquisition, and the entry is
/// removed when no references remain. Registration and deregistration happen
/// under one monitor, while the blocking acquisition itself happens outside it
/// so that contention on one identifier never stalls the others.
pub struct LockGroup {
    locks: Mutex<HashMap<String, Arc<LockEntry>>>,
    drained: Condvar,
    provider: Arc<dyn LockProvider>,
    shutdown_timeout: Duration,
    diagnostics: BlockingDiagnostics,
}

impl std::fmt::Debug for LockGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGroup")
            .field("tracked", &self.tracked_identifiers())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl LockGroup {
    pub fn new(provider: Arc<dyn LockProvider>, shutdown_timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            drained: Condvar::new(),
            provider,
            shutdown_timeout,
            diagnostics: BlockingDiagnostics::disabled(),
        }
    }

    /// Group of fair locks with the given disposal deadline.
    pub fn with_timeout(shutdown_timeout: Duration) -> Self {
        Self::new(Arc::new(FairLockProvider::fair()), shutdown_timeout)
    }

    /// Group configured from `config`: lock fairness, disposal deadline and
    /// non-blocking thread diagnostics.
    pub fn from_config(config: &Config) -> Self {
        let provider = if config.fair_locks {
            FairLockProvider::fair()
        } else {
            FairLockProvider::barging()
        };
        Self::new(Arc::new(provider), config.shutdown_timeout())
            .with_diagnostics(BlockingDiagnostics::new(
                config.non_blocking_thread_prefixes.iter().cloned(),
            ))
    }

    pub fn with_diagnostics(mut self, diagnostics: BlockingDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub(super) fn diagnostics(&self) -> &BlockingDiagnostics {
        &self.diagnostics
    }

    /// Per-identifier handle delegating to this group.
    pub fn adapter(self: &Arc<Self>, identifier: impl Into<String>) -> LockAdapter {
        LockAdapter::new(identifier, Arc::clone(self))
    }

    /// Block until the lock for `identifier` is acquired.
    pub fn lock(&self, identifier: &str) {
        let entry = self.register(identifier);
        entry.lock.lock();
    }

    /// Block until the lock is acquired or `interrupter` fires.
    ///
    /// On interruption the caller's reference is dropped before the error is returned.
    pub fn lock_interruptibly(
        &self,
        identifier: &str,
        interrupter: &Interrupter,
    ) -> Result<(), LockError> {
        let entry = self.register(identifier);
        entry.lock.lock_interruptibly(interrupter).inspect_err(|_| {
            self.deregister(identifier);
        })
    }

    /// Acquire the lock only if it is free right now.
    pub fn try_lock(&self, identifier: &str) -> bool {
        let entry = self.register(identifier);
        let acquired = entry.lock.try_lock();
        if !acquired {
            self.deregister(identifier);
        }
        acquired
    }

    /// Acquire the lock, waiting at most `timeout`.
    pub fn try_lock_for(&self, identifier: &str, timeout: Duration) -> bool {
        let entry = self.register(identifier);
        let acquired = entry.lock.try_lock_for(timeout);
        if !acquired {
            self.deregister(identifier);
        }
        acquired
    }

    /// Release the lock for `identifier`.
    ///
    /// Unlocking an identifier the group does not track is logged and ignored.
    /// A release refused by the underlying lock leaves the reference in place.
    pub fn unlock(&self, identifier: &str) -> Result<(), LockError> {
        let mut locks = self.locks.lock();
        let Some(entry) = locks.get(identifier).cloned() else {
            tracing::warn!(lock = identifier, "unlock requested for an untracked lock");
            return Ok(());
        };

        entry.lock.unlock()?;
        Self::release_reference(&mut locks, identifier, &entry);
        if locks.is_empty() {
            self.drained.notify_all();
        }
        Ok(())
    }

    /// Whether the underlying lock for `identifier` is currently held.
    pub fn is_locked(&self, identifier: &str) -> bool {
        self.entry(identifier)
            .is_some_and(|entry| entry.lock.is_locked())
    }

    /// Whether the calling thread holds the lock for `identifier`.
    pub fn is_held_by_current_thread(&self, identifier: &str) -> bool {
        self.entry(identifier)
            .is_some_and(|entry| entry.lock.is_held_by_current_thread())
    }

    /// Outstanding acquire-without-release count for `identifier`.
    pub fn reference_count(&self, identifier: &str) -> usize {
        self.entry(identifier)
            .map_or(0, |entry| entry.references.load(Ordering::SeqCst))
    }

    /// Whether the group has an entry for `identifier`.
    pub fn is_tracked(&self, identifier: &str) -> bool {
        self.locks.lock().contains_key(identifier)
    }

    /// Identifiers with a live entry, sorted.
    pub fn tracked_identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.locks.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Wait for every entry to drain, up to the shutdown timeout.
    ///
    /// Identifiers still tracked at the deadline are logged as a warning.
    /// Returns whether the group drained.
    pub fn dispose(&self) -> bool {
        let deadline = Instant::now().checked_add(self.shutdown_timeout);
        let mut locks = self.locks.lock();

        while !locks.is_empty() {
            match deadline {
                Some(deadline) => {
                    if self.drained.wait_until(&mut locks, deadline).timed_out() {
                        break;
                    }
                }
                None => self.drained.wait(&mut locks),
            }
        }

        if locks.is_empty() {
            tracing::debug!("lock group disposed");
            return true;
        }

        let mut outstanding: Vec<&str> = locks.keys().map(String::as_str).collect();
        outstanding.sort_unstable();
        tracing::warn!(
            timeout_ms = self.shutdown_timeout.as_millis() as u64,
            outstanding = ?outstanding,
            "lock group disposed with locks still in use"
        );
        false
    }

    fn entry(&self, identifier: &str) -> Option<Arc<LockEntry>> {
        self.locks.lock().get(identifier).cloned()
    }

    /// Get or create the entry and add one reference, atomically.
    fn register(&self, identifier: &str) -> Arc<LockEntry> {
        let mut locks = self.locks.lock();
        let entry = locks.entry(identifier.to_string()).or_insert_with(|| {
            tracing::trace!(lock = identifier, "creating lock entry");
            Arc::new(LockEntry {
                lock: self.provider.create_lock(identifier),
                references: AtomicUsize::new(0),
            })
        });
        entry.references.fetch_add(1, Ordering::SeqCst);
        Arc::clone(entry)
    }

    /// Drop one reference, removing the entry at zero, atomically.
    fn deregister(&self, identifier: &str) {
        let mut locks = self.locks.lock();
        if let Some(entry) = locks.get(identifier).cloned() {
            Self::release_reference(&mut locks, identifier, &entry);
        }
        if locks.is_empty() {
            self.drained.notify_all();
        }
    }

    fn release_reference(
        locks: &mut HashMap<String, Arc<LockEntry>>,
        identifier: &str,
        entry: &LockEntry,
    ) {
        let previous = entry.references.fetch_sub(1, Ordering::SeqCst);
        if previous > 1 {
            return;
        }

        if entry.lock.is_locked() {
            tracing::warn!(
                lock = identifier,
                "lock entry released while its lock is still held; acquire and release calls are unbalanced"
            );
        }
        locks.remove(identifier);
    }
}

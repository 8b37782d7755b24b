//! Lock contract and provider definitions.

use super::fair::FairLock;
use super::interrupt::Interrupter;
use crate::error::LockError;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

/// Mutual-exclusion contract shared by raw locks and group adapters.
///
/// Locks are reentrant and owned by the acquiring thread: every successful
/// acquisition must be paired with exactly one [`Lock::unlock`] from the same
/// thread.
pub trait Lock: Send + Sync {
    /// Block until the lock is acquired.
    fn lock(&self);

    /// Block until the lock is acquired or `interrupter` fires.
    fn lock_interruptibly(&self, interrupter: &Interrupter) -> Result<(), LockError>;

    /// Acquire the lock only if it is free right now.
    fn try_lock(&self) -> bool;

    /// Acquire the lock, waiting at most `timeout`.
    fn try_lock_for(&self, timeout: Duration) -> bool;

    /// Release one hold of the lock.
    fn unlock(&self) -> Result<(), LockError>;

    /// Whether any thread holds the lock.
    fn is_locked(&self) -> bool;

    /// Whether the calling thread holds the lock.
    fn is_held_by_current_thread(&self) -> bool;

    /// Condition variables are not offered; this never succeeds.
    fn new_condition(&self) -> Result<Infallible, LockError> {
        Err(LockError::Unsupported("new_condition"))
    }
}

/// Factory for the underlying lock of each identifier.
///
/// Called exactly once per get-or-create of a group entry, never per acquire.
pub trait LockProvider: Send + Sync {
    fn create_lock(&self, identifier: &str) -> Arc<dyn Lock>;
}

impl<F> LockProvider for F
where
    F: Fn(&str) -> Arc<dyn Lock> + Send + Sync,
{
    fn create_lock(&self, identifier: &str) -> Arc<dyn Lock> {
        self(identifier)
    }
}

/// Default provider producing [`FairLock`]s.
#[derive(Debug, Clone, Copy)]
pub struct FairLockProvider {
    fair: bool,
}

impl FairLockProvider {
    /// Provider of FIFO-fair locks.
    pub fn fair() -> Self {
        Self { fair: true }
    }

    /// Provider of locks that let a free lock be taken ahead of queued waiters.
    pub fn barging() -> Self {
        Self { fair: false }
    }
}

impl Default for FairLockProvider {
    fn default() -> Self {
        Self::fair()
    }
}

impl LockProvider for FairLockProvider {
    fn create_lock(&self, identifier: &str) -> Arc<dyn Lock> {
        Arc::new(FairLock::new(identifier, self.fair))
    }
}

//! Per-identifier lock handle over a shared [`LockGroup`].

use super::group::LockGroup;
use super::guard::LockGuard;
use super::interrupt::Interrupter;
use super::types::Lock;
use crate::error::LockError;
use std::sync::Arc;
use std::time::Duration;

/// Makes one identifier of a [`LockGroup`] look like an ordinary lock.
///
/// The adapter only remembers the identifier and the group; the group owns
/// the underlying lock and its reference count. Blocking acquisitions from
/// threads that must never block are reported through the group's
/// diagnostics before proceeding.
#[derive(Debug, Clone)]
pub struct LockAdapter {
    identifier: String,
    group: Arc<LockGroup>,
}

impl LockAdapter {
    pub fn new(identifier: impl Into<String>, group: Arc<LockGroup>) -> Self {
        Self {
            identifier: identifier.into(),
            group,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn group(&self) -> &Arc<LockGroup> {
        &self.group
    }

    /// Acquire the lock and return a guard releasing it on drop.
    pub fn guard(&self) -> LockGuard<'_> {
        self.lock();
        LockGuard::new(self)
    }

    /// Acquire the lock if free and return a guard releasing it on drop.
    pub fn try_guard(&self) -> Option<LockGuard<'_>> {
        self.try_lock().then(|| LockGuard::new(self))
    }
}

impl Lock for LockAdapter {
    fn lock(&self) {
        self.group.diagnostics().check_blocking(&self.identifier);
        self.group.lock(&self.identifier);
    }

    fn lock_interruptibly(&self, interrupter: &Interrupter) -> Result<(), LockError> {
        self.group.diagnostics().check_blocking(&self.identifier);
        self.group.lock_interruptibly(&self.identifier, interrupter)
    }

    fn try_lock(&self) -> bool {
        self.group.try_lock(&self.identifier)
    }

    fn try_lock_for(&self, timeout: Duration) -> bool {
        self.group.diagnostics().check_blocking(&self.identifier);
        self.group.try_lock_for(&self.identifier, timeout)
    }

    fn unlock(&self) -> Result<(), LockError> {
        self.group.unlock(&self.identifier)
    }

    fn is_locked(&self) -> bool {
        self.group.is_locked(&self.identifier)
    }

    fn is_held_by_current_thread(&self) -> bool {
        self.group.is_held_by_current_thread(&self.identifier)
    }
}

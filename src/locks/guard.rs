//! RAII lock guard implementation.

use super::adapter::LockAdapter;
use super::types::Lock;
use crate::error::LockError;

/// RAII guard for a held group lock.
///
/// When dropped, the lock is released.
/// If the release fails, a warning is logged but no panic occurs.
#[derive(Debug)]
pub struct LockGuard<'a> {
    adapter: &'a LockAdapter,

    /// Whether the lock has been released manually.
    released: bool,
}

impl<'a> LockGuard<'a> {
    pub(super) fn new(adapter: &'a LockAdapter) -> Self {
        Self {
            adapter,
            released: false,
        }
    }

    /// Identifier of the held lock.
    pub fn identifier(&self) -> &str {
        self.adapter.identifier()
    }

    /// Manually release the lock.
    ///
    /// This is useful when you want to release the lock before the guard
    /// goes out of scope, and want to handle errors explicitly.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.adapter.unlock()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.adapter.unlock()
        {
            tracing::warn!(
                lock = self.adapter.identifier(),
                error = %e,
                "failed to release lock"
            );
        }
    }
}

//! Cooperative interruption of blocking lock acquisitions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shareable interruption flag.
///
/// One party calls [`Interrupter::interrupt`]; an interruptible acquisition
/// waiting with a clone of the same handle observes the flag, consumes it and
/// fails with `LockError::Interrupted`.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request interruption.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether interruption is pending, without consuming it.
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Consume a pending interruption, returning whether there was one.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

//! Reporting of blocking lock acquisitions on threads that must never block.

use std::backtrace::Backtrace;
use std::sync::Arc;
use std::thread;

/// Detects blocking acquisitions from threads of "must never block" pools.
///
/// A thread belongs to such a pool when its name starts with one of the
/// configured prefixes. Detection only logs; it never prevents the call.
#[derive(Debug, Clone, Default)]
pub struct BlockingDiagnostics {
    prefixes: Arc<[String]>,
}

impl BlockingDiagnostics {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Diagnostics that never report anything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether the named thread belongs to a non-blocking pool.
    pub fn is_non_blocking(&self, thread_name: &str) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| thread_name.starts_with(prefix.as_str()))
    }

    /// Warn if the current thread is about to block on `identifier` but must not.
    ///
    /// Returns whether a warning was emitted.
    pub fn check_blocking(&self, identifier: &str) -> bool {
        if self.prefixes.is_empty() {
            return false;
        }

        let current = thread::current();
        let Some(name) = current.name() else {
            return false;
        };

        if !self.is_non_blocking(name) {
            return false;
        }

        tracing::warn!(
            lock = identifier,
            thread = name,
            backtrace = %Backtrace::force_capture(),
            "blocking lock acquisition from a thread that must not block"
        );
        true
    }
}

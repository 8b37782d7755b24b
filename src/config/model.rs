//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for lock groups and execution templates.
///
/// This struct represents the contents of `interlock.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Maximum time `LockGroup::dispose` waits for outstanding locks to drain.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Whether group locks hand over to the longest waiter (FIFO) instead of barging.
    #[serde(default = "default_true")]
    pub fair_locks: bool,

    /// Thread-name prefixes of pools whose threads must never block.
    ///
    /// Blocking lock acquisitions from such threads are reported with a warning.
    #[serde(default = "default_non_blocking_thread_prefixes")]
    pub non_blocking_thread_prefixes: Vec<String>,

    // =========================================================================
    // Transaction settings
    // =========================================================================
    /// Timeout applied to begun transactions when the template does not set one.
    #[serde(default = "default_transaction_timeout_ms")]
    pub default_transaction_timeout_ms: u64,

    /// Demarcation used by templates built from this configuration.
    #[serde(default)]
    pub transaction: TransactionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            fair_locks: default_true(),
            non_blocking_thread_prefixes: default_non_blocking_thread_prefixes(),
            default_transaction_timeout_ms: default_transaction_timeout_ms(),
            transaction: TransactionSettings::default(),
        }
    }
}

//! Configuration types and defaults for interlock.
//!
//! This module defines enums, constants, and default value functions
//! used by the Config struct.

use crate::transaction::TransactionAction;
use serde::{Deserialize, Serialize};

/// Which transactional template variant to build from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemplateMode {
    /// Begin/resolve around the call; a timed-out transaction fails the call (default).
    #[default]
    Standard,
    /// Nested execution that participates in, but never independently
    /// resolves, the ambient transaction.
    Scope,
    /// Resolve any previous transaction before beginning, as older runtimes did.
    Compatibility,
}

impl TemplateMode {
    /// Parse a template mode from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "scope" => Some(Self::Scope),
            "compatibility" => Some(Self::Compatibility),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Scope => "scope",
            Self::Compatibility => "compatibility",
        }
    }
}

/// Transaction demarcation settings for a transactional template.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransactionSettings {
    /// Demarcation action.
    pub action: TransactionAction,

    /// Timeout for transactions begun by the template, overriding the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Join an externally started transaction when none is bound.
    #[serde(default)]
    pub interact_with_external: bool,

    /// Template variant.
    #[serde(default)]
    pub mode: TemplateMode,
}

/// Default thread-name prefixes of pools that must never block.
pub fn default_non_blocking_thread_prefixes() -> Vec<String> {
    vec!["cpu-light".to_string(), "cpu-lite".to_string()]
}

// Default value functions for serde
pub(crate) fn default_shutdown_timeout_ms() -> u64 {
    5_000
}
pub(crate) fn default_transaction_timeout_ms() -> u64 {
    30_000
}
pub(crate) fn default_true() -> bool {
    true
}

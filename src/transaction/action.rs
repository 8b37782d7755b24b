//! Demarcation actions and the per-template transaction configuration.

use super::types::TransactionFactory;
use crate::config::TransactionSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What a transactional template does about the ambient transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionAction {
    /// Always begin a new transaction.
    AlwaysBegin,
    /// Join the ambient transaction, or begin one if there is none.
    BeginOrJoin,
    /// Join the ambient transaction; fail if there is none.
    AlwaysJoin,
    /// Join the ambient transaction if there is one.
    JoinIfPossible,
    /// Do not take part in any transaction.
    None,
    /// Fail if a transaction is bound.
    Never,
    /// Run detached from the ambient transaction.
    NotSupported,
    /// No transactional behaviour at all (default).
    #[default]
    Indifferent,
}

impl TransactionAction {
    pub const ALL: [TransactionAction; 8] = [
        Self::AlwaysBegin,
        Self::BeginOrJoin,
        Self::AlwaysJoin,
        Self::JoinIfPossible,
        Self::None,
        Self::Never,
        Self::NotSupported,
        Self::Indifferent,
    ];

    /// Parse an action from its snake_case name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlwaysBegin => "always_begin",
            Self::BeginOrJoin => "begin_or_join",
            Self::AlwaysJoin => "always_join",
            Self::JoinIfPossible => "join_if_possible",
            Self::None => "none",
            Self::Never => "never",
            Self::NotSupported => "not_supported",
            Self::Indifferent => "indifferent",
        }
    }

    /// Whether the action begins a transaction given whether one is bound.
    pub fn begins(&self, transaction_bound: bool) -> bool {
        match self {
            Self::AlwaysBegin => true,
            Self::BeginOrJoin => !transaction_bound,
            _ => false,
        }
    }

    /// Whether a bound XA transaction is suspended around the call.
    pub fn suspends_xa(&self) -> bool {
        matches!(self, Self::None | Self::AlwaysBegin | Self::NotSupported)
    }

    /// Whether a previously bound transaction is resolved before the call
    /// when the template resolves previous transactions.
    pub fn resolves_previous(&self) -> bool {
        matches!(self, Self::None | Self::AlwaysBegin)
    }

    /// Whether an external transaction may be joined for this action.
    pub fn joins_external(&self) -> bool {
        !matches!(self, Self::Never | Self::NotSupported)
    }
}

impl fmt::Display for TransactionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction demarcation of one template.
#[derive(Clone, Default)]
pub struct TransactionConfig {
    pub action: TransactionAction,

    /// Timeout for transactions begun by the template; the template default
    /// applies when unset.
    pub timeout: Option<Duration>,

    /// Source of new and external transactions. Required whenever the
    /// action begins a transaction.
    pub factory: Option<Arc<dyn TransactionFactory>>,

    /// Join an externally started transaction through the factory when none
    /// is bound.
    pub interact_with_external: bool,
}

impl fmt::Debug for TransactionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionConfig")
            .field("action", &self.action)
            .field("timeout", &self.timeout)
            .field("factory", &self.factory.is_some())
            .field("interact_with_external", &self.interact_with_external)
            .finish()
    }
}

impl TransactionConfig {
    pub fn new(action: TransactionAction) -> Self {
        Self {
            action,
            ..Self::default()
        }
    }

    /// Configuration built from settings loaded from YAML.
    pub fn from_settings(
        settings: &TransactionSettings,
        factory: Option<Arc<dyn TransactionFactory>>,
    ) -> Self {
        Self {
            action: settings.action,
            timeout: settings.timeout_ms.map(Duration::from_millis),
            factory,
            interact_with_external: settings.interact_with_external,
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn TransactionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn interacting_with_external(mut self, interact: bool) -> Self {
        self.interact_with_external = interact;
        self
    }
}

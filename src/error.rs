//! Error types for interlock.
//!
//! Uses thiserror for derive macros. Each concern has its own enum so that
//! interceptors can pattern-match on failures instead of inspecting types at
//! runtime; [`InterlockError`] ties them together for the CLI.

use crate::exit_codes;
use std::error::Error as StdError;
use thiserror::Error;

/// Boxed error produced by user callbacks.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failures of the named-lock primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The acquiring thread was interrupted while waiting.
    #[error("interrupted while acquiring lock '{0}'")]
    Interrupted(String),

    /// A release was attempted by a thread that does not hold the lock.
    #[error("lock '{0}' is not held by the current thread")]
    NotOwner(String),

    /// The operation is not available on this kind of lock.
    #[error("{0} is not supported")]
    Unsupported(&'static str),
}

/// Failures reported by a transaction or transaction factory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("failed to begin transaction: {0}")]
    Begin(String),

    #[error("failed to commit transaction {id}: {reason}")]
    Commit { id: String, reason: String },

    #[error("failed to roll back transaction {id}: {reason}")]
    Rollback { id: String, reason: String },

    #[error("failed to suspend transaction {id}: {reason}")]
    Suspend { id: String, reason: String },

    #[error("failed to resume transaction {id}: {reason}")]
    Resume { id: String, reason: String },

    /// The transaction outlived its timeout and was rolled back.
    #[error("transaction {0} timed out")]
    Timeout(String),
}

/// Failure of a single `execute` call.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The user callback failed. The original error is kept as the source.
    #[error("{0}")]
    Callback(#[source] BoxError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The requested transaction action is incompatible with the ambient transaction.
    #[error("illegal transaction state: {0}")]
    IllegalTransactionState(String),

    #[error("execution interrupted")]
    Interrupted,
}

impl ExecutionError {
    /// Wrap a callback failure.
    pub fn callback<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        ExecutionError::Callback(error.into())
    }

    /// The callback failure as its concrete type, if that is what this is.
    pub fn callback_error<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            ExecutionError::Callback(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Whether this is an illegal-transaction-state failure.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, ExecutionError::IllegalTransactionState(_))
    }
}

impl From<LockError> for ExecutionError {
    fn from(error: LockError) -> Self {
        match error {
            LockError::Interrupted(_) => ExecutionError::Interrupted,
            other => ExecutionError::Callback(Box::new(other)),
        }
    }
}

/// Top-level error type for interlock operations.
#[derive(Error, Debug)]
pub enum InterlockError {
    /// Invalid configuration or arguments.
    #[error("{0}")]
    Config(String),

    /// An API was used in a way its contract forbids.
    #[error("usage error: {0}")]
    Usage(String),

    #[error("lock failure: {0}")]
    Lock(#[from] LockError),

    /// Two threads were observed inside the same named lock.
    #[error("mutual exclusion violated: {0}")]
    Exclusion(String),

    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),
}

impl InterlockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            InterlockError::Config(_) => exit_codes::USER_ERROR,
            InterlockError::Usage(_) => exit_codes::USER_ERROR,
            InterlockError::Lock(_) | InterlockError::Exclusion(_) => exit_codes::LOCK_FAILURE,
            InterlockError::Execution(_) => exit_codes::EXECUTION_FAILURE,
        }
    }
}

/// Result type alias for interlock operations.
pub type Result<T> = std::result::Result<T, InterlockError>;

//! Contracts of the transaction manager consumed by execution templates.

use crate::error::TransactionError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A transaction managed outside this crate.
///
/// Templates only demarcate: they begin, bind, suspend and resolve
/// transactions, but the resources enlisted in them are the manager's concern.
pub trait Transaction: Send + Sync + fmt::Debug {
    /// Stable identifier used in logs and errors.
    fn id(&self) -> &str;

    /// Whether this is a distributed (XA) transaction that can be suspended.
    fn is_xa(&self) -> bool;

    fn commit(&self) -> Result<(), TransactionError>;

    fn rollback(&self) -> Result<(), TransactionError>;

    /// Mark the transaction so that resolving it rolls back.
    fn set_rollback_only(&self);

    fn is_rollback_only(&self) -> bool;

    /// Detach the transaction from the current unit of work.
    fn suspend(&self) -> Result<(), TransactionError>;

    /// Reattach a suspended transaction.
    fn resume(&self) -> Result<(), TransactionError>;

    fn set_timeout(&self, timeout: Duration);

    /// Whether the transaction has outlived its timeout.
    fn is_timed_out(&self) -> bool;
}

/// Source of transactions for one template.
pub trait TransactionFactory: Send + Sync {
    /// Begin a new transaction.
    fn begin(&self) -> Result<Arc<dyn Transaction>, TransactionError>;

    /// Join a transaction started outside the runtime, if there is one.
    fn join_external(&self) -> Result<Option<Arc<dyn Transaction>>, TransactionError> {
        Ok(None)
    }
}

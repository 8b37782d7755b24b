//! Per-invocation state threaded through an interceptor chain.

use crate::error::{ExecutionError, TransactionError};
use crate::transaction::Transaction;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Mutable state of one `execute` call.
///
/// Holds the ambient transaction slot that interceptors bind, suspend and
/// resolve, plus the component and event handed to exception handlers. A
/// context belongs to one call at a time; callers that already run inside a
/// transaction pass their own context to `execute_in`.
#[derive(Default)]
pub struct ExecutionContext {
    transaction: Option<Arc<dyn Transaction>>,
    transaction_started: bool,
    component: Option<String>,
    event: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("transaction", &self.transaction.as_ref().map(|tx| tx.id()))
            .field("transaction_started", &self.transaction_started)
            .field("component", &self.component)
            .field("event", &self.event.is_some())
            .finish()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the component the unit of work belongs to.
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Opaque event being processed. Never inspected by the chain.
    pub fn with_event<E>(mut self, event: E) -> Self
    where
        E: Any + Send + Sync,
    {
        self.event = Some(Arc::new(event));
        self
    }

    /// Context running inside an already bound transaction.
    pub fn with_transaction(mut self, transaction: Arc<dyn Transaction>) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    /// The event as its concrete type, if one of that type was attached.
    pub fn event<E>(&self) -> Option<&E>
    where
        E: Any + Send + Sync,
    {
        self.event.as_deref()?.downcast_ref::<E>()
    }

    /// The bound transaction, if any.
    pub fn transaction(&self) -> Option<&Arc<dyn Transaction>> {
        self.transaction.as_ref()
    }

    /// Bind `transaction` as the ambient transaction.
    ///
    /// Fails if another transaction is already bound.
    pub fn bind(&mut self, transaction: Arc<dyn Transaction>) -> Result<(), ExecutionError> {
        if let Some(bound) = &self.transaction {
            return Err(ExecutionError::IllegalTransactionState(format!(
                "cannot bind transaction {}: transaction {} is already bound",
                transaction.id(),
                bound.id()
            )));
        }
        self.transaction = Some(transaction);
        Ok(())
    }

    /// Unbind and return the ambient transaction without resolving it.
    pub fn unbind(&mut self) -> Option<Arc<dyn Transaction>> {
        self.transaction.take()
    }

    /// Put `transaction` back as the ambient transaction, returning whatever
    /// was bound in its place.
    pub(crate) fn rebind(
        &mut self,
        transaction: Arc<dyn Transaction>,
    ) -> Option<Arc<dyn Transaction>> {
        self.transaction.replace(transaction)
    }

    /// Commit the bound transaction, or roll it back if it is marked
    /// rollback-only. The transaction is unbound either way.
    pub fn resolve_transaction(&mut self) -> Result<(), TransactionError> {
        let Some(transaction) = self.transaction.take() else {
            return Ok(());
        };
        if transaction.is_rollback_only() {
            tracing::debug!(
                transaction = transaction.id(),
                "rolling back rollback-only transaction"
            );
            transaction.rollback()
        } else {
            tracing::debug!(transaction = transaction.id(), "committing transaction");
            transaction.commit()
        }
    }

    /// Roll back and unbind the bound transaction.
    pub fn rollback_transaction(&mut self) -> Result<(), TransactionError> {
        match self.transaction.take() {
            Some(transaction) => {
                tracing::debug!(transaction = transaction.id(), "rolling back transaction");
                transaction.rollback()
            }
            None => Ok(()),
        }
    }

    /// Suspend the bound transaction and unbind it.
    ///
    /// On failure the transaction stays bound.
    pub fn suspend(&mut self) -> Result<Arc<dyn Transaction>, ExecutionError> {
        let Some(transaction) = self.transaction.take() else {
            return Err(ExecutionError::IllegalTransactionState(
                "no transaction is bound to suspend".to_string(),
            ));
        };
        if let Err(e) = transaction.suspend() {
            self.transaction = Some(transaction);
            return Err(e.into());
        }
        tracing::debug!(transaction = transaction.id(), "suspended transaction");
        Ok(transaction)
    }

    /// Resume a suspended transaction and bind it again.
    ///
    /// A transaction left bound in its place is rolled back with a warning.
    /// The resumed transaction is bound even if resuming it fails.
    pub fn resume(&mut self, transaction: Arc<dyn Transaction>) -> Result<(), ExecutionError> {
        let resumed = transaction.resume();
        if let Some(leftover) = self.rebind(Arc::clone(&transaction)) {
            discard_leftover(&leftover, "resuming a suspended transaction");
        }
        resumed?;
        tracing::debug!(transaction = transaction.id(), "resumed transaction");
        Ok(())
    }

    /// Record that this invocation began the bound transaction.
    pub fn mark_transaction_started(&mut self) {
        self.transaction_started = true;
    }

    /// Whether this invocation began a transaction.
    pub fn is_transaction_started(&self) -> bool {
        self.transaction_started
    }

    pub(crate) fn replace_transaction_started(&mut self, started: bool) -> bool {
        std::mem::replace(&mut self.transaction_started, started)
    }
}

/// Roll back a transaction nobody will ever resolve.
pub(crate) fn discard_leftover(leftover: &Arc<dyn Transaction>, during: &str) {
    tracing::warn!(
        transaction = leftover.id(),
        "unresolved transaction still bound while {}; rolling it back",
        during
    );
    if let Err(e) = leftover.rollback() {
        tracing::error!(
            transaction = leftover.id(),
            error = %e,
            "failed to roll back unresolved transaction"
        );
    }
}

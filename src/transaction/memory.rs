//! In-memory transaction manager that journals every demarcation call.
//!
//! Backs the `execute` CLI command and serves as the transaction double in
//! tests: nothing is enlisted, but every begin, join, suspend, resume, commit
//! and rollback is recorded with a timestamp so callers can inspect exactly
//! what a template did.

use super::types::{Transaction, TransactionFactory};
use crate::error::TransactionError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Something that happened to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    Begun,
    Joined,
    TimeoutSet,
    MarkedRollbackOnly,
    Suspended,
    Resumed,
    Committed,
    RolledBack,
    Failed,
}

impl JournalEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Begun => "begun",
            Self::Joined => "joined",
            Self::TimeoutSet => "timeout_set",
            Self::MarkedRollbackOnly => "marked_rollback_only",
            Self::Suspended => "suspended",
            Self::Resumed => "resumed",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Failed => "failed",
        }
    }
}

/// One journal line.
#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub at: DateTime<Utc>,
    pub transaction: String,
    pub event: JournalEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Lifecycle state of a [`MemoryTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Active,
    Suspended,
    Committed,
    RolledBack,
}

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<JournalEntry>>>);

impl Journal {
    fn record(&self, transaction: &str, event: JournalEvent, detail: Option<String>) {
        tracing::debug!(transaction, event = event.as_str(), "transaction event");
        self.0.lock().push(JournalEntry {
            at: Utc::now(),
            transaction: transaction.to_string(),
            event,
            detail,
        });
    }
}

#[derive(Debug)]
struct State {
    status: TransactionStatus,
    rollback_only: bool,
    deadline: Option<Instant>,
}

/// Transaction created by an [`InMemoryTransactionManager`].
pub struct MemoryTransaction {
    id: String,
    xa: bool,
    fail_commit: bool,
    state: Mutex<State>,
    journal: Journal,
}

impl fmt::Debug for MemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("id", &self.id)
            .field("xa", &self.xa)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl MemoryTransaction {
    pub fn status(&self) -> TransactionStatus {
        self.state.lock().status
    }

    fn finish(
        &self,
        status: TransactionStatus,
        event: JournalEvent,
        error: impl FnOnce(String, String) -> TransactionError,
    ) -> Result<(), TransactionError> {
        let mut state = self.state.lock();
        if !matches!(state.status, TransactionStatus::Active) {
            let reason = format!("transaction is {:?}", state.status);
            self.journal
                .record(&self.id, JournalEvent::Failed, Some(reason.clone()));
            return Err(error(self.id.clone(), reason));
        }
        state.status = status;
        self.journal.record(&self.id, event, None);
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_xa(&self) -> bool {
        self.xa
    }

    fn commit(&self) -> Result<(), TransactionError> {
        if self.fail_commit {
            let reason = "commit refused by resource".to_string();
            self.journal
                .record(&self.id, JournalEvent::Failed, Some(reason.clone()));
            return Err(TransactionError::Commit {
                id: self.id.clone(),
                reason,
            });
        }
        self.finish(
            TransactionStatus::Committed,
            JournalEvent::Committed,
            |id, reason| TransactionError::Commit { id, reason },
        )
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        self.finish(
            TransactionStatus::RolledBack,
            JournalEvent::RolledBack,
            |id, reason| TransactionError::Rollback { id, reason },
        )
    }

    fn set_rollback_only(&self) {
        self.state.lock().rollback_only = true;
        self.journal
            .record(&self.id, JournalEvent::MarkedRollbackOnly, None);
    }

    fn is_rollback_only(&self) -> bool {
        self.state.lock().rollback_only
    }

    fn suspend(&self) -> Result<(), TransactionError> {
        let mut state = self.state.lock();
        if !self.xa {
            return Err(TransactionError::Suspend {
                id: self.id.clone(),
                reason: "only XA transactions can be suspended".to_string(),
            });
        }
        if state.status != TransactionStatus::Active {
            return Err(TransactionError::Suspend {
                id: self.id.clone(),
                reason: format!("transaction is {:?}", state.status),
            });
        }
        state.status = TransactionStatus::Suspended;
        self.journal.record(&self.id, JournalEvent::Suspended, None);
        Ok(())
    }

    fn resume(&self) -> Result<(), TransactionError> {
        let mut state = self.state.lock();
        if state.status != TransactionStatus::Suspended {
            return Err(TransactionError::Resume {
                id: self.id.clone(),
                reason: format!("transaction is {:?}", state.status),
            });
        }
        state.status = TransactionStatus::Active;
        self.journal.record(&self.id, JournalEvent::Resumed, None);
        Ok(())
    }

    fn set_timeout(&self, timeout: Duration) {
        // A deadline past the representable clock never expires.
        self.state.lock().deadline = Instant::now().checked_add(timeout);
        self.journal.record(
            &self.id,
            JournalEvent::TimeoutSet,
            Some(format!("{}ms", timeout.as_millis())),
        );
    }

    fn is_timed_out(&self) -> bool {
        self.state
            .lock()
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Journaling [`TransactionFactory`].
///
/// Begins local transactions by default, or XA transactions when built with
/// [`InMemoryTransactionManager::xa`]. An external transaction can be offered
/// for templates that interact with external transactions.
#[derive(Default)]
pub struct InMemoryTransactionManager {
    xa: bool,
    fail_begin: bool,
    fail_commit: bool,
    external: Mutex<Option<Arc<MemoryTransaction>>>,
    journal: Journal,
}

impl fmt::Debug for InMemoryTransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransactionManager")
            .field("xa", &self.xa)
            .field("journal_len", &self.journal.0.lock().len())
            .finish()
    }
}

impl InMemoryTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager beginning XA transactions.
    pub fn xa() -> Self {
        Self {
            xa: true,
            ..Self::default()
        }
    }

    /// Make every `begin` fail.
    pub fn failing_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    /// Make every commit of a transaction created by this manager fail.
    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Create a transaction outside any template, e.g. to act as the ambient
    /// transaction of a caller.
    pub fn create(&self, xa: bool) -> Arc<MemoryTransaction> {
        let transaction = Arc::new(MemoryTransaction {
            id: Uuid::new_v4().to_string(),
            xa,
            fail_commit: self.fail_commit,
            state: Mutex::new(State {
                status: TransactionStatus::Active,
                rollback_only: false,
                deadline: None,
            }),
            journal: self.journal.clone(),
        });
        self.journal.record(
            &transaction.id,
            JournalEvent::Begun,
            Some(if xa { "xa" } else { "local" }.to_string()),
        );
        transaction
    }

    /// Offer a transaction to be joined by the next `join_external`.
    pub fn offer_external(&self, xa: bool) -> Arc<MemoryTransaction> {
        let transaction = self.create(xa);
        *self.external.lock() = Some(Arc::clone(&transaction));
        transaction
    }

    /// Every event recorded so far, oldest first.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal.0.lock().clone()
    }

    /// Events recorded for one transaction, oldest first.
    pub fn journal_for(&self, transaction: &str) -> Vec<JournalEvent> {
        self.journal
            .0
            .lock()
            .iter()
            .filter(|entry| entry.transaction == transaction)
            .map(|entry| entry.event)
            .collect()
    }

    /// How many times `event` was recorded for `transaction`.
    pub fn count(&self, transaction: &str, event: JournalEvent) -> usize {
        self.journal_for(transaction)
            .into_iter()
            .filter(|recorded| *recorded == event)
            .count()
    }

    /// Identifiers of every transaction created so far, in order.
    pub fn begun(&self) -> Vec<String> {
        self.journal
            .0
            .lock()
            .iter()
            .filter(|entry| entry.event == JournalEvent::Begun)
            .map(|entry| entry.transaction.clone())
            .collect()
    }
}

impl TransactionFactory for InMemoryTransactionManager {
    fn begin(&self) -> Result<Arc<dyn Transaction>, TransactionError> {
        if self.fail_begin {
            return Err(TransactionError::Begin(
                "transaction manager unavailable".to_string(),
            ));
        }
        let transaction: Arc<dyn Transaction> = self.create(self.xa);
        Ok(transaction)
    }

    fn join_external(&self) -> Result<Option<Arc<dyn Transaction>>, TransactionError> {
        let Some(external) = self.external.lock().take() else {
            return Ok(None);
        };
        self.journal.record(&external.id, JournalEvent::Joined, None);
        let transaction: Arc<dyn Transaction> = external;
        Ok(Some(transaction))
    }
}

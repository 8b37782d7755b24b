//! Transaction demarcation vocabulary shared by execution templates.
//!
//! The crate does not manage transactions itself. It consumes them through
//! the [`Transaction`] and [`TransactionFactory`] traits and decides, per
//! [`TransactionAction`], whether to begin, join, suspend or resolve them.
//! [`InMemoryTransactionManager`] is a journaling implementation used by the
//! CLI and by tests.

mod action;
mod memory;
mod types;


// Re-export public API
pub use action::{TransactionAction, TransactionConfig};
pub use memory::{
    InMemoryTransactionManager, JournalEntry, JournalEvent, MemoryTransaction, TransactionStatus,
};
pub use types::{Transaction, TransactionFactory};

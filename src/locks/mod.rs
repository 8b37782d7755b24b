//! Named-lock coordination for interlock.
//!
//! This module implements identifier-keyed mutual exclusion shared across
//! components:
//! - [`LockGroup`]: reference-counted registry holding one underlying lock
//!   per identifier for as long as anyone contends for or holds it
//! - [`LockAdapter`]: per-identifier handle implementing the [`Lock`] contract
//!   by delegating to a group
//! - [`FairLock`]: the default underlying lock, reentrant and FIFO-fair
//!
//! # Reference Counting
//!
//! Each acquisition attempt registers a reference on the identifier's entry
//! before blocking, and the reference is dropped on release or on a failed
//! acquisition. An entry is removed as soon as its count returns to zero, so
//! the registry only ever holds contended identifiers.
//!
//! # RAII Guards
//!
//! [`LockAdapter::guard`] returns a guard that releases the lock when
//! dropped. If the release fails during drop, a warning is logged but the
//! program does not crash.

mod adapter;
mod diagnostics;
mod fair;
mod group;
mod guard;
mod interrupt;
mod types;


// Re-export public API
pub use adapter::LockAdapter;
pub use diagnostics::BlockingDiagnostics;
pub use fair::FairLock;
pub use group::LockGroup;
pub use guard::LockGuard;
pub use interrupt::Interrupter;
pub use types::{FairLockProvider, Lock, LockProvider};

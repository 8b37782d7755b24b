//! Interlock: named lock groups and transactional execution templates.
//!
//! - [`locks`]: reference-counted named locks shared through a [`locks::LockGroup`]
//!   and handed out per identifier as [`locks::LockAdapter`]s.
//! - [`execution`]: interceptor chains that demarcate transactions and route
//!   failures to exception handlers around a callback.
//! - [`transaction`]: transaction actions, the transaction traits the chain
//!   drives, and a journaling in-memory implementation.

pub mod config;
pub mod error;
pub mod execution;
pub mod exit_codes;
pub mod locks;
pub mod transaction;

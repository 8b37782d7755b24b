//! Exit code constants for the interlock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid configuration)
//! - 2: Execution failure (callback, transaction or illegal transactional state)
//! - 3: Lock failure (interruption, ownership violation, mutual exclusion broken)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or API misuse.
pub const USER_ERROR: i32 = 1;

/// Execution failure: the callback, the transaction manager or the
/// transactional state check failed.
pub const EXECUTION_FAILURE: i32 = 2;

/// Lock failure: acquisition interrupted, release by a non-owner, or exclusion violated.
pub const LOCK_FAILURE: i32 = 3;

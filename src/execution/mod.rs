//! Execution templates and the interceptor chain behind them.
//!
//! A template wraps one unit of work (a callback) in a fixed, ordered chain
//! of interceptors. Each interceptor contributes one concern:
//! - joining, isolating, validating or suspending the ambient transaction
//! - beginning and resolving a transaction of its own
//! - handing failures to an exception handler
//!
//! # Ambient Transaction
//!
//! The ambient transaction travels in the [`ExecutionContext`] passed down
//! the chain and into the callback. [`ExecutionTemplate::execute`] starts
//! from an empty context; [`ExecutionTemplate::execute_in`] continues the
//! caller's.
//!
//! # Handled Failures
//!
//! When an exception handler substitutes a result, the failure keeps
//! travelling outward as [`Failure::Handled`] so that no outer stage commits,
//! and the outermost stage of the error-handling template converts it into
//! the substitute value.

mod context;
mod failure;
mod handler;
mod interceptor;
mod result;
mod stages;
mod template;

#[cfg(test)]
mod tests;

// Re-export public API
pub use context::ExecutionContext;
pub use failure::{Failure, Outcome};
pub use handler::{ExceptionHandler, HandlerOutcome};
pub use interceptor::{ChainBuilder, Interceptor, InterceptorChain, Next, ResolveOptions};
pub use result::{InvocationResult, InvocationStatus};
pub use template::{DEFAULT_TRANSACTION_TIMEOUT, ErrorHandlingBuilder, ExecutionTemplate};

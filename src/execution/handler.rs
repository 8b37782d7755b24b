//! Exception handlers consulted by the `HandleException` stage.

use super::context::ExecutionContext;
use crate::error::ExecutionError;

/// What an exception handler decided.
#[derive(Debug)]
pub enum HandlerOutcome<T> {
    /// The failure is handled; the call returns this value instead.
    Handled(T),
    /// Let the original failure continue outward.
    Propagate,
    /// Continue outward with a different failure.
    Replace(ExecutionError),
}

/// Handler for failures raised by the callback or the inner stages.
pub trait ExceptionHandler<T>: Send + Sync {
    /// Whether this handler wants to see `error`.
    fn accepts(&self, _error: &ExecutionError) -> bool {
        true
    }

    fn handle(&self, error: &ExecutionError, context: &mut ExecutionContext) -> HandlerOutcome<T>;
}

impl<T, F> ExceptionHandler<T> for F
where
    F: Fn(&ExecutionError, &mut ExecutionContext) -> HandlerOutcome<T> + Send + Sync,
{
    fn handle(&self, error: &ExecutionError, context: &mut ExecutionContext) -> HandlerOutcome<T> {
        self(error, context)
    }
}

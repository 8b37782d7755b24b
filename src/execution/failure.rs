//! Failure type propagated between interceptors.

use crate::error::{ExecutionError, TransactionError};

/// How an interceptor chain failed.
///
/// A failure becomes [`Failure::Handled`] once an exception handler produced a
/// substitute result. It still travels outward as a failure so that outer
/// stages do not commit, and the outermost `Rethrow` stage turns it back into
/// a success.
#[derive(Debug)]
pub enum Failure<T> {
    Raised(ExecutionError),
    Handled { cause: ExecutionError, substitute: T },
}

impl<T> Failure<T> {
    pub fn error(&self) -> &ExecutionError {
        match self {
            Failure::Raised(error) => error,
            Failure::Handled { cause, .. } => cause,
        }
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, Failure::Handled { .. })
    }

    /// The underlying error, discarding any substitute.
    pub fn into_error(self) -> ExecutionError {
        match self {
            Failure::Raised(error) => error,
            Failure::Handled { cause, .. } => cause,
        }
    }
}

impl<T> From<ExecutionError> for Failure<T> {
    fn from(error: ExecutionError) -> Self {
        Failure::Raised(error)
    }
}

impl<T> From<TransactionError> for Failure<T> {
    fn from(error: TransactionError) -> Self {
        Failure::Raised(ExecutionError::Transaction(error))
    }
}

/// Result of running (part of) an interceptor chain.
pub type Outcome<T> = Result<T, Failure<T>>;

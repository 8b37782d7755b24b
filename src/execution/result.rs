//! Tri-state outcome of an invocation.

use crate::error::{ExecutionError, InterlockError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    /// The call was refused by the transactional state check.
    NotSupported,
    Successful,
    Failed,
}

impl InvocationStatus {
    /// Name as it appears in serialized results.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSupported => "not_supported",
            Self::Successful => "successful",
            Self::Failed => "failed",
        }
    }
}

/// Outcome of [`ExecutionTemplate::invoke`](super::ExecutionTemplate::invoke).
///
/// The payload is present only when successful; an error message can only be
/// attached when not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResult<T> {
    status: InvocationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl<T> InvocationResult<T> {
    pub fn successful(payload: T) -> Self {
        Self {
            status: InvocationStatus::Successful,
            payload: Some(payload),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: InvocationStatus::Failed,
            payload: None,
            error_message: Some(message.into()),
        }
    }

    pub fn not_supported() -> Self {
        Self {
            status: InvocationStatus::NotSupported,
            payload: None,
            error_message: None,
        }
    }

    /// Result describing `error`: refused calls are not supported, anything
    /// else failed.
    pub fn from_error(error: &ExecutionError) -> Self {
        let status = if error.is_illegal_state() {
            InvocationStatus::NotSupported
        } else {
            InvocationStatus::Failed
        };
        Self {
            status,
            payload: None,
            error_message: Some(error.to_string()),
        }
    }

    pub fn status(&self) -> InvocationStatus {
        self.status
    }

    pub fn is_successful(&self) -> bool {
        self.status == InvocationStatus::Successful
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<T> {
        self.payload
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Attach an error message.
    ///
    /// Successful results cannot carry one; trying is a usage error.
    pub fn set_error_message(&mut self, message: impl Into<String>) -> Result<()> {
        if self.is_successful() {
            return Err(InterlockError::Usage(
                "cannot set an error message on a successful invocation result".to_string(),
            ));
        }
        self.error_message = Some(message.into());
        Ok(())
    }
}

impl<T> From<std::result::Result<T, ExecutionError>> for InvocationResult<T> {
    fn from(outcome: std::result::Result<T, ExecutionError>) -> Self {
        match outcome {
            Ok(payload) => Self::successful(payload),
            Err(error) => Self::from_error(&error),
        }
    }
}

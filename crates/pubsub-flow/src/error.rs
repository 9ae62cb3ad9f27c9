//! # Flow Errors
//!
//! This module defines the error types shared by every part of the flow.
//! Provider failures, setup-step failures and loop failures all end up in
//! [`FlowError`], so callers only ever match on one enum at the top level.

use std::time::Duration;

/// Failure reported by the messaging provider for a single operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Operation abandoned before completion")]
    Abandoned,
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Whether the operation may succeed if issued again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Abandoned => false,
            Self::NotFound(_) => false,
            Self::AccessDenied(_) => false,
            Self::InvalidRequest(_) => false,
        }
    }
}

/// Errors a single setup step can produce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Context field `{0}` read before it was written")]
    MissingInput(&'static str),
    #[error("Context field `{0}` already written")]
    AlreadyWritten(&'static str),
}

/// An operation kept failing until its retry policy ran out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct RetriesExhausted {
    pub operation: &'static str,
    pub attempts: u32,
    #[source]
    pub source: ProviderError,
}

/// Top-level errors surfaced to whoever drives the flow.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Setup step {position} ({step}) failed: {source}")]
    StepFailed {
        position: usize,
        step: &'static str,
        #[source]
        source: StepError,
    },
    #[error("Setup finished incomplete: {0}")]
    IncompleteSetup(#[source] StepError),
    #[error("Receive failed: {0}")]
    ReceiveFailed(#[from] RetriesExhausted),
    #[error("Publish failed: {0}")]
    PublishFailed(#[source] ProviderError),
    #[error("Publish did not complete within {0:?}")]
    PublishTimeout(Duration),
    #[error("Completion signal `{0}` dropped before it was resolved")]
    SignalDropped(&'static str),
    #[error("Poll loop task failed: {0}")]
    LoopPanicked(String),
}

impl FlowError {
    /// The 1-based position of the failed setup step, if this is a setup failure.
    pub fn failed_step(&self) -> Option<(usize, &'static str)> {
        match self {
            Self::StepFailed { position, step, .. } => Some((*position, *step)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(ProviderError::Unavailable("throttled".into()).is_transient());
        assert!(!ProviderError::Abandoned.is_transient());
        assert!(!ProviderError::NotFound("demo".into()).is_transient());
        assert!(!ProviderError::InvalidRequest("bad".into()).is_transient());
    }

    #[test]
    fn test_step_failure_message_names_step() {
        let err = FlowError::StepFailed {
            position: 3,
            step: "get_queue_arn",
            source: StepError::Provider(ProviderError::NotFound("demo".into())),
        };
        assert_eq!(err.failed_step(), Some((3, "get_queue_arn")));
        assert_eq!(
            err.to_string(),
            "Setup step 3 (get_queue_arn) failed: Resource not found: demo"
        );
    }
}

//! # Asynchronous Operations
//!
//! Every call into the messaging provider returns an [`AsyncOperation`]: a future
//! backed by a one-shot completion channel. The provider keeps the sending half
//! (a [`Completer`]) and resolves it from whatever thread finishes the work, which
//! is the same shape as a callback-based SDK but without tying the caller to the
//! SDK's own executor.
//!
//! ```rust
//! use pubsub_flow::operation::AsyncOperation;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (completer, operation) = AsyncOperation::<u32>::pending();
//!     tokio::spawn(async move { completer.succeed(7) });
//!     assert_eq!(operation.await, Ok(7));
//! }
//! ```

use crate::error::ProviderError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Outcome of a single provider operation.
pub type OperationResult<T> = Result<T, ProviderError>;

/// The provider-side half of an [`AsyncOperation`].
///
/// Consumed on completion, so an operation can only ever be resolved once.
/// Dropping it unresolved makes the operation resolve to [`ProviderError::Abandoned`].
#[derive(Debug)]
pub struct Completer<T> {
    respond_to: oneshot::Sender<OperationResult<T>>,
}

impl<T> Completer<T> {
    /// Resolves the operation. A no-op if the issuer is no longer waiting.
    pub fn complete(self, result: OperationResult<T>) {
        let _ = self.respond_to.send(result);
    }

    pub fn succeed(self, value: T) {
        self.complete(Ok(value));
    }

    pub fn fail(self, error: ProviderError) {
        self.complete(Err(error));
    }

    /// True once the issuer has dropped its [`AsyncOperation`].
    pub fn is_abandoned(&self) -> bool {
        self.respond_to.is_closed()
    }
}

/// A pending provider call that resolves to `Result<T, ProviderError>`.
#[must_use = "operations do nothing observable unless awaited"]
#[derive(Debug)]
pub struct AsyncOperation<T> {
    response: oneshot::Receiver<OperationResult<T>>,
}

impl<T> AsyncOperation<T> {
    /// Creates an unresolved operation together with the handle that resolves it.
    pub fn pending() -> (Completer<T>, Self) {
        let (respond_to, response) = oneshot::channel();
        (Completer { respond_to }, Self { response })
    }

    /// An operation that is already resolved.
    pub fn ready(result: OperationResult<T>) -> Self {
        let (completer, operation) = Self::pending();
        completer.complete(result);
        operation
    }

    /// Runs `work` on the runtime's worker pool and resolves with its output.
    pub fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = OperationResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (completer, operation) = Self::pending();
        tokio::spawn(async move {
            completer.complete(work.await);
        });
        operation
    }
}

impl<T> Future for AsyncOperation<T> {
    type Output = OperationResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.response)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ProviderError::Abandoned)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_operation_resolves_immediately() {
        let operation = AsyncOperation::ready(Ok("topic"));
        assert_eq!(operation.await, Ok("topic"));
    }

    #[tokio::test]
    async fn test_completer_resolves_from_another_task() {
        let (completer, operation) = AsyncOperation::<u32>::pending();
        tokio::spawn(async move { completer.fail(ProviderError::Unavailable("busy".into())) });
        assert_eq!(
            operation.await,
            Err(ProviderError::Unavailable("busy".into()))
        );
    }

    #[tokio::test]
    async fn test_dropped_completer_abandons_operation() {
        let (completer, operation) = AsyncOperation::<()>::pending();
        drop(completer);
        assert_eq!(operation.await, Err(ProviderError::Abandoned));
    }

    #[tokio::test]
    async fn test_spawned_operation_runs_on_runtime() {
        let operation = AsyncOperation::spawn(async { Ok(vec![1, 2, 3]) });
        assert_eq!(operation.await, Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_completer_sees_dropped_issuer() {
        let (completer, operation) = AsyncOperation::<()>::pending();
        assert!(!completer.is_abandoned());
        drop(operation);
        assert!(completer.is_abandoned());
        completer.succeed(());
    }
}

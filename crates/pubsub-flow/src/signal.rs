//! # Completion Signals
//!
//! A completion signal is a one-shot hand-off between the task that finishes a
//! piece of work and the single task waiting for it. [`channel`] splits it into a
//! [`SignalResolver`] and a [`SignalWaiter`]; both are consumed on use, so a
//! signal is resolved at most once and observed by exactly one waiter.
//!
//! The flow uses one signal for "setup finished" and one for "drain finished".

use crate::error::FlowError;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Creates a new completion signal. `label` names it in logs and errors.
pub fn channel<T>(label: &'static str) -> (SignalResolver<T>, SignalWaiter<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        SignalResolver { label, sender },
        SignalWaiter { label, receiver },
    )
}

/// Resolving half of a completion signal.
#[derive(Debug)]
pub struct SignalResolver<T> {
    label: &'static str,
    sender: oneshot::Sender<T>,
}

impl<T> SignalResolver<T> {
    /// Resolves the signal. Returns `false` if the waiter is already gone.
    pub fn resolve(self, value: T) -> bool {
        let delivered = self.sender.send(value).is_ok();
        debug!(signal = self.label, delivered, "Completion signal resolved");
        delivered
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

/// Waiting half of a completion signal.
#[derive(Debug)]
pub struct SignalWaiter<T> {
    label: &'static str,
    receiver: oneshot::Receiver<T>,
}

impl<T> SignalWaiter<T> {
    /// Waits for the signal. Fails if the resolver was dropped unresolved.
    pub async fn wait(self) -> Result<T, FlowError> {
        let label = self.label;
        self.receiver
            .await
            .map_err(|_| FlowError::SignalDropped(label))
    }

    /// Waits for the signal for at most `limit`.
    ///
    /// On timeout the waiter is handed back so the caller can keep waiting.
    pub async fn wait_for(mut self, limit: Duration) -> Result<Result<T, FlowError>, Self> {
        match tokio::time::timeout(limit, &mut self.receiver).await {
            Ok(received) => Ok(received.map_err(|_| FlowError::SignalDropped(self.label))),
            Err(_) => Err(self),
        }
    }

    /// Returns the value if the signal has already been resolved, without waiting.
    pub fn try_take(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolved_signal_delivers_value() {
        let (resolver, waiter) = channel::<u32>("setup");
        assert!(resolver.resolve(5));
        assert_eq!(waiter.wait().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_dropped_resolver_reports_signal_dropped() {
        let (resolver, waiter) = channel::<()>("drain");
        drop(resolver);
        assert!(matches!(
            waiter.wait().await,
            Err(FlowError::SignalDropped("drain"))
        ));
    }

    #[tokio::test]
    async fn test_resolve_without_waiter_reports_undelivered() {
        let (resolver, waiter) = channel::<()>("drain");
        drop(waiter);
        assert!(!resolver.resolve(()));
    }

    #[tokio::test]
    async fn test_wait_for_hands_back_waiter_on_timeout() {
        let (resolver, waiter) = channel::<&str>("publish");
        let waiter = waiter
            .wait_for(Duration::from_millis(10))
            .await
            .expect_err("nothing resolved yet");

        resolver.resolve("done");
        let value = waiter
            .wait_for(Duration::from_secs(1))
            .await
            .expect("resolved");
        assert_eq!(value.unwrap(), "done");
    }

    #[test]
    fn test_try_take_does_not_block() {
        let (resolver, mut waiter) = channel::<u8>("setup");
        assert_eq!(waiter.try_take(), None);
        resolver.resolve(1);
        assert_eq!(waiter.try_take(), Some(1));
    }
}

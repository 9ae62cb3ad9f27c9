//! # Mock Provider & Testing Guide
//!
//! [`MockProvider`] implements [`MessagingProvider`] entirely in memory. Tests script
//! what each operation returns, run the component under test against it, and then
//! inspect the calls it recorded.
//!
//! ## When to use the mock vs the in-memory broker
//!
//! | Feature | MockProvider | A real (or in-memory) broker |
//! |---------|--------------|------------------------------|
//! | **Determinism** | Fully scripted | Depends on broker state |
//! | **Timing control** | `hold()` lets the test decide when a call completes | None |
//! | **Error injection** | `return_err`, `never` | Hard |
//! | **Use case** | Ordering and failure properties of the flow | End-to-end behaviour |
//!
//! ## Scripting
//!
//! Each operation has its own queue of expectations, consumed in order:
//!
//! - `return_ok(value)` / `return_err(error)` resolve the call immediately.
//! - `hold()` hands the test a [`HeldOperation`]; awaiting
//!   [`HeldOperation::arrived`] yields the [`Completer`] once the call is made, so
//!   the test can change the world (set a stop flag, say) before completing it.
//! - `never()` leaves the call pending forever.
//!
//! Calls with no scripted expectation get a permissive default: empty receive
//! batches, successful deletes and publishes, and synthesized identifiers for
//! the setup operations.
//!
//! ```rust
//! use pubsub_flow::mock::{message, MockProvider};
//! use pubsub_flow::poll::{DrainConfig, PollDrainLoop};
//! use pubsub_flow::QueueUrl;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = Arc::new(MockProvider::new());
//!     mock.expect_receive().return_ok(vec![message("1", "hello")]);
//!
//!     let handle = PollDrainLoop::new(mock.clone(), QueueUrl::new("q"), DrainConfig::default()).start();
//!     handle.request_stop();
//!     let report = handle.wait().await.unwrap();
//!
//!     assert_eq!(report.received, 1);
//!     assert_eq!(mock.count("delete_message"), 1);
//!     mock.verify();
//! }
//! ```

use crate::error::ProviderError;
use crate::operation::{AsyncOperation, Completer, OperationResult};
use crate::provider::{
    Message, MessageId, MessagingProvider, QueueArn, QueueUrl, ReceiptHandle, SubscriptionArn,
    TopicArn,
};
use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::{oneshot, Notify};

/// Builds a message whose receipt handle is derived from its id.
pub fn message(id: &str, body: &str) -> Message {
    Message {
        message_id: MessageId::new(id),
        body: body.to_string(),
        receipt_handle: ReceiptHandle::new(format!("receipt-{id}")),
    }
}

/// A call observed by the mock, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateTopic {
        name: String,
    },
    CreateQueue {
        name: String,
    },
    GetQueueArn {
        queue: QueueUrl,
    },
    Subscribe {
        topic: TopicArn,
        protocol: String,
        endpoint: QueueArn,
    },
    SetQueuePolicy {
        queue: QueueUrl,
        policy: String,
    },
    ReceiveBatch {
        queue: QueueUrl,
        max_items: usize,
    },
    DeleteMessage {
        queue: QueueUrl,
        receipt: ReceiptHandle,
    },
    Publish {
        topic: TopicArn,
        body: String,
        /// Sequence number of the operation handed back for this call.
        operation: u64,
    },
}

impl Call {
    /// The provider operation this call corresponds to.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateTopic { .. } => "create_topic",
            Self::CreateQueue { .. } => "create_queue",
            Self::GetQueueArn { .. } => "get_queue_arn",
            Self::Subscribe { .. } => "subscribe",
            Self::SetQueuePolicy { .. } => "set_queue_policy",
            Self::ReceiveBatch { .. } => "receive_batch",
            Self::DeleteMessage { .. } => "delete_message",
            Self::Publish { .. } => "publish",
        }
    }
}

enum Expectation<T> {
    Respond(OperationResult<T>),
    Hold(oneshot::Sender<Completer<T>>),
    Never,
}

struct Script<T> {
    expectations: Mutex<VecDeque<Expectation<T>>>,
}

impl<T: Send + 'static> Script<T> {
    fn new() -> Self {
        Self {
            expectations: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, expectation: Expectation<T>) {
        self.expectations.lock().unwrap().push_back(expectation);
    }

    fn remaining(&self) -> usize {
        self.expectations.lock().unwrap().len()
    }

    fn respond(
        &self,
        parked: &Mutex<Vec<Box<dyn Any + Send>>>,
        default: impl FnOnce() -> OperationResult<T>,
    ) -> AsyncOperation<T> {
        let next = self.expectations.lock().unwrap().pop_front();
        match next {
            Some(Expectation::Respond(result)) => AsyncOperation::ready(result),
            Some(Expectation::Hold(hand_over)) => {
                let (completer, operation) = AsyncOperation::pending();
                // If the test dropped its handle the operation is abandoned.
                let _ = hand_over.send(completer);
                operation
            }
            Some(Expectation::Never) => {
                let (completer, operation) = AsyncOperation::pending();
                parked.lock().unwrap().push(Box::new(completer));
                operation
            }
            None => AsyncOperation::ready(default()),
        }
    }
}

/// Fluent builder returned by the `expect_*` methods.
pub struct ExpectationBuilder<'a, T> {
    script: &'a Script<T>,
}

impl<T: Send + 'static> ExpectationBuilder<'_, T> {
    /// The next call succeeds with `value`.
    pub fn return_ok(self, value: T) {
        self.script.push(Expectation::Respond(Ok(value)));
    }

    /// The next call fails with `error`.
    pub fn return_err(self, error: ProviderError) {
        self.script.push(Expectation::Respond(Err(error)));
    }

    /// The next call stays pending until the test completes it.
    pub fn hold(self) -> HeldOperation<T> {
        let (hand_over, arrived) = oneshot::channel();
        self.script.push(Expectation::Hold(hand_over));
        HeldOperation { arrived }
    }

    /// The next call never completes.
    pub fn never(self) {
        self.script.push(Expectation::Never);
    }
}

/// A scripted call whose completion is controlled by the test.
pub struct HeldOperation<T> {
    arrived: oneshot::Receiver<Completer<T>>,
}

impl<T> HeldOperation<T> {
    /// Waits until the call is made and returns the handle that completes it.
    pub async fn arrived(self) -> Completer<T> {
        self.arrived
            .await
            .expect("mock provider dropped before the held call was made")
    }
}

/// In-memory, scriptable [`MessagingProvider`].
pub struct MockProvider {
    create_topic: Script<TopicArn>,
    create_queue: Script<QueueUrl>,
    get_queue_arn: Script<QueueArn>,
    subscribe: Script<SubscriptionArn>,
    set_queue_policy: Script<()>,
    receive_batch: Script<Vec<Message>>,
    delete_message: Script<()>,
    publish: Script<MessageId>,
    calls: Mutex<Vec<Call>>,
    next_operation: AtomicU64,
    parked: Mutex<Vec<Box<dyn Any + Send>>>,
    activity: Notify,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            create_topic: Script::new(),
            create_queue: Script::new(),
            get_queue_arn: Script::new(),
            subscribe: Script::new(),
            set_queue_policy: Script::new(),
            receive_batch: Script::new(),
            delete_message: Script::new(),
            publish: Script::new(),
            calls: Mutex::new(Vec::new()),
            next_operation: AtomicU64::new(1),
            parked: Mutex::new(Vec::new()),
            activity: Notify::new(),
        }
    }

    pub fn expect_create_topic(&self) -> ExpectationBuilder<'_, TopicArn> {
        ExpectationBuilder {
            script: &self.create_topic,
        }
    }

    pub fn expect_create_queue(&self) -> ExpectationBuilder<'_, QueueUrl> {
        ExpectationBuilder {
            script: &self.create_queue,
        }
    }

    pub fn expect_get_queue_arn(&self) -> ExpectationBuilder<'_, QueueArn> {
        ExpectationBuilder {
            script: &self.get_queue_arn,
        }
    }

    pub fn expect_subscribe(&self) -> ExpectationBuilder<'_, SubscriptionArn> {
        ExpectationBuilder {
            script: &self.subscribe,
        }
    }

    pub fn expect_set_queue_policy(&self) -> ExpectationBuilder<'_, ()> {
        ExpectationBuilder {
            script: &self.set_queue_policy,
        }
    }

    pub fn expect_receive(&self) -> ExpectationBuilder<'_, Vec<Message>> {
        ExpectationBuilder {
            script: &self.receive_batch,
        }
    }

    pub fn expect_delete(&self) -> ExpectationBuilder<'_, ()> {
        ExpectationBuilder {
            script: &self.delete_message,
        }
    }

    pub fn expect_publish(&self) -> ExpectationBuilder<'_, MessageId> {
        ExpectationBuilder {
            script: &self.publish,
        }
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made to `operation` (e.g. `"receive_batch"`).
    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Names of the operations called so far, oldest first.
    pub fn operations(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(Call::operation)
            .collect()
    }

    pub fn published_bodies(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                Call::Publish { body, .. } => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_receipts(&self) -> Vec<ReceiptHandle> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                Call::DeleteMessage { receipt, .. } => Some(receipt.clone()),
                _ => None,
            })
            .collect()
    }

    /// Waits until the recorded calls satisfy `condition`.
    pub async fn wait_until<F>(&self, condition: F)
    where
        F: Fn(&[Call]) -> bool,
    {
        loop {
            let notified = self.activity.notified();
            if condition(&self.calls.lock().unwrap()) {
                return;
            }
            notified.await;
        }
    }

    /// Waits until `operation` has been called at least `n` times.
    pub async fn wait_for_calls(&self, operation: &str, n: usize) {
        self.wait_until(|calls| calls.iter().filter(|c| c.operation() == operation).count() >= n)
            .await
    }

    /// Panics if any scripted expectation was never consumed.
    pub fn verify(&self) {
        let remaining = [
            ("create_topic", self.create_topic.remaining()),
            ("create_queue", self.create_queue.remaining()),
            ("get_queue_arn", self.get_queue_arn.remaining()),
            ("subscribe", self.subscribe.remaining()),
            ("set_queue_policy", self.set_queue_policy.remaining()),
            ("receive_batch", self.receive_batch.remaining()),
            ("delete_message", self.delete_message.remaining()),
            ("publish", self.publish.remaining()),
        ];
        let unmet: Vec<String> = remaining
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(op, n)| format!("{op}: {n}"))
            .collect();
        if !unmet.is_empty() {
            panic!("Not all expectations were met. Remaining {}", unmet.join(", "));
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
        self.activity.notify_waiters();
    }
}

impl MessagingProvider for MockProvider {
    fn create_topic(&self, name: &str) -> AsyncOperation<TopicArn> {
        self.record(Call::CreateTopic {
            name: name.to_string(),
        });
        self.create_topic.respond(&self.parked, || {
            Ok(TopicArn::new(format!("arn:mock:sns:{name}")))
        })
    }

    fn create_queue(&self, name: &str) -> AsyncOperation<QueueUrl> {
        self.record(Call::CreateQueue {
            name: name.to_string(),
        });
        self.create_queue.respond(&self.parked, || {
            Ok(QueueUrl::new(format!("mock://queues/{name}")))
        })
    }

    fn get_queue_arn(&self, queue: &QueueUrl) -> AsyncOperation<QueueArn> {
        self.record(Call::GetQueueArn {
            queue: queue.clone(),
        });
        self.get_queue_arn.respond(&self.parked, || {
            let name = queue.as_str().rsplit('/').next().unwrap_or_default();
            Ok(QueueArn::new(format!("arn:mock:sqs:{name}")))
        })
    }

    fn subscribe(
        &self,
        topic: &TopicArn,
        protocol: &str,
        endpoint: &QueueArn,
    ) -> AsyncOperation<SubscriptionArn> {
        self.record(Call::Subscribe {
            topic: topic.clone(),
            protocol: protocol.to_string(),
            endpoint: endpoint.clone(),
        });
        self.subscribe.respond(&self.parked, || {
            Ok(SubscriptionArn::new(format!("{topic}:subscription")))
        })
    }

    fn set_queue_policy(&self, queue: &QueueUrl, policy: &str) -> AsyncOperation<()> {
        self.record(Call::SetQueuePolicy {
            queue: queue.clone(),
            policy: policy.to_string(),
        });
        self.set_queue_policy.respond(&self.parked, || Ok(()))
    }

    fn receive_batch(&self, queue: &QueueUrl, max_items: usize) -> AsyncOperation<Vec<Message>> {
        self.record(Call::ReceiveBatch {
            queue: queue.clone(),
            max_items,
        });
        self.receive_batch.respond(&self.parked, || Ok(Vec::new()))
    }

    fn delete_message(&self, queue: &QueueUrl, receipt: &ReceiptHandle) -> AsyncOperation<()> {
        self.record(Call::DeleteMessage {
            queue: queue.clone(),
            receipt: receipt.clone(),
        });
        self.delete_message.respond(&self.parked, || Ok(()))
    }

    fn publish(&self, topic: &TopicArn, body: &str) -> AsyncOperation<MessageId> {
        let operation = self.next_operation.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Publish {
            topic: topic.clone(),
            body: body.to_string(),
            operation,
        });
        self.publish.respond(&self.parked, || {
            Ok(MessageId::new(format!("mock-message-{operation}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_are_consumed_in_order() {
        let mock = MockProvider::new();
        mock.expect_create_topic()
            .return_ok(TopicArn::new("arn:custom"));
        mock.expect_create_topic()
            .return_err(ProviderError::AccessDenied("demo".into()));

        assert_eq!(
            mock.create_topic("demo").await,
            Ok(TopicArn::new("arn:custom"))
        );
        assert_eq!(
            mock.create_topic("demo").await,
            Err(ProviderError::AccessDenied("demo".into()))
        );
        assert_eq!(
            mock.create_topic("demo").await,
            Ok(TopicArn::new("arn:mock:sns:demo"))
        );
        assert_eq!(mock.count("create_topic"), 3);
        mock.verify();
    }

    #[tokio::test]
    async fn test_held_call_completes_when_released() {
        let mock = MockProvider::new();
        let held = mock.expect_delete().hold();

        let operation = mock.delete_message(&QueueUrl::new("q"), &ReceiptHandle::new("r"));
        let completer = held.arrived().await;
        completer.fail(ProviderError::Unavailable("later".into()));

        assert_eq!(
            operation.await,
            Err(ProviderError::Unavailable("later".into()))
        );
        assert_eq!(mock.deleted_receipts(), vec![ReceiptHandle::new("r")]);
    }

    #[tokio::test]
    async fn test_never_stays_pending() {
        let mock = MockProvider::new();
        mock.expect_publish().never();

        let operation = mock.publish(&TopicArn::new("t"), "body");
        let waited = tokio::time::timeout(std::time::Duration::from_millis(20), operation).await;
        assert!(waited.is_err());
        assert_eq!(mock.published_bodies(), vec!["body".to_string()]);
    }

    #[tokio::test]
    async fn test_publish_operations_are_numbered() {
        let mock = MockProvider::new();
        let first = mock.publish(&TopicArn::new("t"), "a").await.unwrap();
        let second = mock.publish(&TopicArn::new("t"), "b").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(mock.operations(), vec!["publish", "publish"]);
    }

    #[test]
    #[should_panic(expected = "Not all expectations were met")]
    fn test_verify_reports_unmet_expectations() {
        let mock = MockProvider::new();
        mock.expect_receive().return_ok(Vec::new());
        mock.verify();
    }
}

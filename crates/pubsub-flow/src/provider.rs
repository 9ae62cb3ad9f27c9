//! # Messaging Provider Interface
//!
//! The [`MessagingProvider`] trait is the only seam between the flow and a concrete
//! pub/sub backend. Each method issues one request and hands back an
//! [`AsyncOperation`] immediately; the work finishes on the provider's side.
//!
//! Identifiers are newtypes so a queue URL can never be passed where a queue ARN
//! is expected.

use crate::operation::AsyncOperation;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Protocol tag used when subscribing a queue to a topic.
pub const SQS_PROTOCOL: &str = "sqs";

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Fully-qualified identifier of a topic.
    TopicArn
);
identifier!(
    /// Reference used to address a queue in queue operations.
    QueueUrl
);
identifier!(
    /// Fully-qualified identifier of a queue, used as a subscription endpoint.
    QueueArn
);
identifier!(
    /// Identifier of a topic-to-queue subscription.
    SubscriptionArn
);
identifier!(
    /// Opaque token identifying one delivery of a message.
    ReceiptHandle
);
identifier!(MessageId);

/// A message delivered from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_id: MessageId,
    pub body: String,
    pub receipt_handle: ReceiptHandle,
}

/// The operations the flow needs from a pub/sub backend.
///
/// Implementations must be cheap to share; the flow holds them behind an `Arc`
/// and issues acknowledgments from spawned tasks.
pub trait MessagingProvider: Send + Sync + 'static {
    fn create_topic(&self, name: &str) -> AsyncOperation<TopicArn>;

    fn create_queue(&self, name: &str) -> AsyncOperation<QueueUrl>;

    fn get_queue_arn(&self, queue: &QueueUrl) -> AsyncOperation<QueueArn>;

    fn subscribe(
        &self,
        topic: &TopicArn,
        protocol: &str,
        endpoint: &QueueArn,
    ) -> AsyncOperation<SubscriptionArn>;

    /// Attaches a JSON access policy to the queue.
    fn set_queue_policy(&self, queue: &QueueUrl, policy: &str) -> AsyncOperation<()>;

    /// Receives up to `max_items` messages. An empty batch means nothing is pending.
    fn receive_batch(&self, queue: &QueueUrl, max_items: usize) -> AsyncOperation<Vec<Message>>;

    fn delete_message(&self, queue: &QueueUrl, receipt: &ReceiptHandle) -> AsyncOperation<()>;

    fn publish(&self, topic: &TopicArn, body: &str) -> AsyncOperation<MessageId>;
}

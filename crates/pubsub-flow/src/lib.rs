//! # Pub/Sub Flow
//!
//! This crate provides the client-side orchestration for a publish/subscribe
//! round trip: a chain of dependent setup calls, a consumer loop that drains a
//! queue before it stops, and a gate that publishes one message at a time. It
//! knows nothing about a particular backend; everything talks to a
//! [`MessagingProvider`].
//!
//! ## Architecture Overview
//!
//! 1. **Operation Layer** ([`AsyncOperation`]) - one provider call, resolved
//!    through a one-shot [`Completer`]
//! 2. **Coordination Layer** ([`StepSequencer`], [`PollDrainLoop`], [`PublishGate`]) -
//!    ordering and shutdown
//! 3. **Synchronization Primitives** ([`StopFlag`], [`signal`]) - the only state
//!    the producer and consumer share
//!
//! ## Core Abstractions
//!
//! ### [`MessagingProvider`] - The Backend Seam
//!
//! Each method issues one request and returns an [`AsyncOperation`] right away.
//! Awaiting it yields `Result<T, ProviderError>`. A provider that drops the
//! completer without resolving it produces [`ProviderError::Abandoned`], so an
//! operation can never hang because its backend forgot about it.
//!
//! ### [`StepSequencer`] - Dependent Setup
//!
//! Steps implement [`PipelineStep`] and share a context value by `&mut`. They run
//! strictly one after another; the first failure ends the sequence with
//! [`FlowError::StepFailed`].
//!
//! ### [`PollDrainLoop`] - Drain-Aware Consumption
//!
//! Receives batches until a stop has been requested *and* a batch comes back
//! empty, acknowledging every message on the way. Its completion resolves only
//! after every acknowledgment has settled.
//!
//! ### [`PublishGate`] - Serialized Publishing
//!
//! One publish in flight at a time, with an optional timeout.
//!
//! ## Quick Start
//!
//! ```rust
//! use pubsub_flow::mock::MockProvider;
//! use pubsub_flow::{DrainConfig, MessagingProvider, PollDrainLoop, PublishGate};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = Arc::new(MockProvider::new());
//!     let topic = provider.create_topic("demo").await.unwrap();
//!     let queue = provider.create_queue("demo").await.unwrap();
//!
//!     let drain = PollDrainLoop::new(provider.clone(), queue, DrainConfig::default()).start();
//!
//!     let mut gate = PublishGate::new(provider.clone(), topic);
//!     for i in 1..=3 {
//!         gate.publish(&format!("message: {i}")).await.unwrap();
//!     }
//!
//!     drain.request_stop();
//!     let report = drain.wait().await.unwrap();
//!     assert_eq!(gate.published(), 3);
//!     assert_eq!(report.ack_failures, 0);
//! }
//! ```
//!
//! ## Testing
//!
//! The [`mock`] module provides [`MockProvider`](mock::MockProvider), a scriptable
//! provider that records every call. See its module documentation for the
//! expectation API.

pub mod error;
pub mod gate;
pub mod mock;
pub mod operation;
pub mod poll;
pub mod provider;
pub mod retry;
pub mod sequencer;
pub mod signal;
pub mod stop;
pub mod tracing;

pub use error::{FlowError, ProviderError, RetriesExhausted, StepError};
pub use gate::PublishGate;
pub use operation::{AsyncOperation, Completer, OperationResult};
pub use poll::{DrainConfig, DrainHandle, DrainReport, LoopState, PollDrainLoop};
pub use provider::{
    Message, MessageId, MessagingProvider, QueueArn, QueueUrl, ReceiptHandle, SubscriptionArn,
    TopicArn, SQS_PROTOCOL,
};
pub use retry::{retry_operation, RetryPolicy};
pub use sequencer::{PipelineStep, StepSequencer};
pub use signal::{SignalResolver, SignalWaiter};
pub use stop::StopFlag;

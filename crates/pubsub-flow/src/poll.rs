//! # Poll / Drain Loop
//!
//! [`PollDrainLoop`] consumes a queue until it is told to stop *and* the queue has
//! run dry. It is the consumer half of the flow; the producer only ever touches
//! it through a [`StopFlag`] and the completion signal in [`DrainHandle`].
//!
//! ## State machine
//!
//! ```text
//!             stop observed,              stop observed,
//!             batch non-empty             batch empty
//!   RUNNING ------------------> DRAINING -------------> STOPPED
//!      |                          ^   |
//!      |                          +---+ batch non-empty
//!      +-- stop observed, batch empty ----------------> STOPPED
//! ```
//!
//! The stop flag is sampled just before each receive is issued. Only a receive
//! that was issued after the stop was requested can end the loop by coming
//! back empty: an earlier receive may have run before the producer's last
//! publishes landed, so its empty result says nothing about what is pending
//! now. A stop request that lands while a receive is in flight is therefore
//! acted on one receive later. See [`LoopState::after_batch`].
//!
//! ## Acknowledgments
//!
//! Every received message is acknowledged (deleted) on its own task, without
//! holding up the next receive. Those tasks are tracked in a [`JoinSet`]: finished
//! ones are reaped after each batch, and once the loop reaches `STOPPED` it waits
//! for every outstanding acknowledgment before resolving its completion signal.
//! A failed acknowledgment is retried per [`DrainConfig::ack_retry`], then logged
//! and counted; it never stops the loop.
//!
//! ## Receive failures
//!
//! A failed receive is retried per [`DrainConfig::receive_retry`]. When the policy
//! is exhausted the loop stops and resolves its completion signal with
//! [`FlowError::ReceiveFailed`].
//!
//! ## Idle cadence
//!
//! While running, the loop resubmits immediately after every batch, empty or
//! not. [`DrainConfig::idle_backoff_ms`] adds a pause after empty batches; it is
//! off by default.

use crate::error::{FlowError, RetriesExhausted};
use crate::provider::{Message, MessageId, MessagingProvider, QueueUrl};
use crate::retry::{retry_operation, RetryPolicy};
use crate::signal::{self, SignalResolver, SignalWaiter};
use crate::stop::StopFlag;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Lifecycle of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Draining,
    Stopped,
}

impl LoopState {
    /// The state the loop enters when a receive completes.
    ///
    /// `stop_requested` is the flag as sampled when that receive was issued.
    pub fn after_batch(stop_requested: bool, batch_len: usize) -> Self {
        match (stop_requested, batch_len) {
            (false, _) => Self::Running,
            (true, 0) => Self::Stopped,
            (true, _) => Self::Draining,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }
}

/// Tuning for the poll loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DrainConfig {
    /// Upper bound passed to every receive.
    pub max_batch_size: usize,
    /// Pause after an empty batch while running. `None` polls continuously.
    pub idle_backoff_ms: Option<u64>,
    pub receive_retry: RetryPolicy,
    pub ack_retry: RetryPolicy,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            idle_backoff_ms: None,
            receive_retry: RetryPolicy::default(),
            ack_retry: RetryPolicy::default(),
        }
    }
}

/// Counters reported when the loop finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub batches: u64,
    pub received: u64,
    pub acknowledged: u64,
    pub ack_failures: u64,
}

/// Called for every received message before it is acknowledged.
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

type AckOutcome = Result<MessageId, (MessageId, RetriesExhausted)>;

/// Receives, processes and acknowledges messages until stopped and drained.
pub struct PollDrainLoop<P> {
    provider: Arc<P>,
    queue: QueueUrl,
    config: DrainConfig,
    stop: StopFlag,
    handler: Option<MessageHandler>,
}

impl<P: MessagingProvider> PollDrainLoop<P> {
    pub fn new(provider: Arc<P>, queue: QueueUrl, config: DrainConfig) -> Self {
        Self {
            provider,
            queue,
            config,
            stop: StopFlag::new(),
            handler: None,
        }
    }

    /// Installs a handler invoked for each message before its acknowledgment.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Spawns the loop and returns immediately.
    pub fn start(self) -> DrainHandle {
        let stop = self.stop.clone();
        let (resolver, completion) = signal::channel("drain");
        let span = info_span!("poll_loop", queue = %self.queue);
        let task = tokio::spawn(self.run(resolver).instrument(span));
        DrainHandle {
            stop,
            completion,
            task,
        }
    }

    /// Runs the loop to completion on the current task and resolves `done`.
    pub async fn run(self, done: SignalResolver<Result<DrainReport, FlowError>>) {
        info!(max_batch_size = self.config.max_batch_size, "Poll loop started");
        let outcome = self.drive().await;
        match &outcome {
            Ok(report) => info!(
                batches = report.batches,
                received = report.received,
                acknowledged = report.acknowledged,
                ack_failures = report.ack_failures,
                "Poll loop drained"
            ),
            Err(e) => error!(error = %e, "Poll loop failed"),
        }
        done.resolve(outcome);
    }

    async fn drive(&self) -> Result<DrainReport, FlowError> {
        let mut report = DrainReport::default();
        let mut acks: JoinSet<AckOutcome> = JoinSet::new();
        let mut state = LoopState::Running;

        loop {
            let stop_requested = self.stop.is_stop_requested();
            let received = retry_operation("receive_batch", &self.config.receive_retry, || {
                self.provider
                    .receive_batch(&self.queue, self.config.max_batch_size)
            })
            .await;

            let batch = match received {
                Ok(batch) => batch,
                Err(exhausted) => {
                    Self::settle(&mut acks, &mut report).await;
                    return Err(FlowError::ReceiveFailed(exhausted));
                }
            };

            report.batches += 1;
            let batch_len = batch.len();
            let next = LoopState::after_batch(stop_requested, batch_len);
            if next != state {
                info!(from = ?state, to = ?next, batch_len, "Poll loop state changed");
                state = next;
            }

            for message in batch {
                report.received += 1;
                info!(message_id = %message.message_id, body = %message.body, "Message received");
                if let Some(handler) = &self.handler {
                    handler(&message);
                }
                self.acknowledge(&mut acks, message);
            }

            while let Some(finished) = acks.try_join_next() {
                Self::tally(finished, &mut report);
            }

            if state.is_terminal() {
                break;
            }

            if batch_len == 0 && state == LoopState::Running {
                if let Some(pause) = self.config.idle_backoff_ms {
                    tokio::time::sleep(Duration::from_millis(pause)).await;
                }
            }
        }

        Self::settle(&mut acks, &mut report).await;
        Ok(report)
    }

    fn acknowledge(&self, acks: &mut JoinSet<AckOutcome>, message: Message) {
        let provider = self.provider.clone();
        let queue = self.queue.clone();
        let policy = self.config.ack_retry.clone();
        let Message {
            message_id,
            receipt_handle,
            ..
        } = message;

        acks.spawn(async move {
            match retry_operation("delete_message", &policy, || {
                provider.delete_message(&queue, &receipt_handle)
            })
            .await
            {
                Ok(()) => Ok(message_id),
                Err(exhausted) => Err((message_id, exhausted)),
            }
        });
    }

    /// Waits for every outstanding acknowledgment.
    async fn settle(acks: &mut JoinSet<AckOutcome>, report: &mut DrainReport) {
        if !acks.is_empty() {
            debug!(outstanding = acks.len(), "Waiting for acknowledgments");
        }
        while let Some(finished) = acks.join_next().await {
            Self::tally(finished, report);
        }
    }

    fn tally(finished: Result<AckOutcome, JoinError>, report: &mut DrainReport) {
        match finished {
            Ok(Ok(message_id)) => {
                report.acknowledged += 1;
                debug!(%message_id, "Acknowledged");
            }
            Ok(Err((message_id, exhausted))) => {
                report.ack_failures += 1;
                warn!(%message_id, error = %exhausted, "Acknowledgment failed");
            }
            Err(join_error) => {
                report.ack_failures += 1;
                error!(error = %join_error, "Acknowledgment task failed");
            }
        }
    }
}

/// Handle to a running [`PollDrainLoop`].
#[derive(Debug)]
pub struct DrainHandle {
    stop: StopFlag,
    completion: SignalWaiter<Result<DrainReport, FlowError>>,
    task: JoinHandle<()>,
}

impl DrainHandle {
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Asks the loop to stop once the queue is empty.
    pub fn request_stop(&self) -> bool {
        let first = self.stop.request_stop();
        if first {
            info!("Stop requested");
        }
        first
    }

    /// True once the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the loop to reach `STOPPED` and all acknowledgments to settle.
    pub async fn wait(self) -> Result<DrainReport, FlowError> {
        match self.completion.wait().await {
            Ok(outcome) => outcome,
            Err(dropped) => match self.task.await {
                Err(join_error) if join_error.is_panic() => {
                    Err(FlowError::LoopPanicked(join_error.to_string()))
                }
                _ => Err(dropped),
            },
        }
    }
}

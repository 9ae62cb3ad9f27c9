//! # In-Memory Broker
//!
//! A [`MessagingProvider`] that keeps topics, queues and subscriptions in process
//! memory, shaped after SNS and SQS closely enough for the demo to run without
//! a cloud account:
//!
//! - identifiers look like AWS ARNs and queue URLs for the configured region and
//!   account
//! - creating a topic or queue that already exists returns the existing one
//! - a publish reaches a subscribed queue only if that queue's policy allows the
//!   topic as its source
//! - receiving moves messages in-flight under a fresh receipt handle; deleting
//!   by that handle removes them
//!
//! Every operation completes on a spawned task, like a network round trip
//! would.

use crate::model::PolicyDocument;
use pubsub_flow::{
    AsyncOperation, Message, MessageId, MessagingProvider, OperationResult, ProviderError,
    QueueArn, QueueUrl, ReceiptHandle, SubscriptionArn, TopicArn, SQS_PROTOCOL,
};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Largest batch a single receive may ask for.
pub const MAX_RECEIVE_BATCH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub region: String,
    pub account_id: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            account_id: "000000000000".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
}

#[derive(Debug)]
struct QueueState {
    arn: QueueArn,
    visible: VecDeque<StoredMessage>,
    in_flight: HashMap<ReceiptHandle, StoredMessage>,
    policy: Option<PolicyDocument>,
}

#[derive(Debug, Default)]
struct TopicState {
    subscriptions: Vec<(SubscriptionArn, QueueArn)>,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<TopicArn, TopicState>,
    queues: HashMap<QueueUrl, QueueState>,
    next_id: u64,
}

impl BrokerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn queue_mut(&mut self, url: &QueueUrl) -> OperationResult<&mut QueueState> {
        self.queues
            .get_mut(url)
            .ok_or_else(|| ProviderError::NotFound(url.to_string()))
    }
}

fn require_name(kind: &str, name: &str) -> OperationResult<()> {
    if name.is_empty() {
        return Err(ProviderError::InvalidRequest(format!("{kind} name is empty")));
    }
    Ok(())
}

/// Process-local SNS/SQS stand-in.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    config: BrokerConfig,
    state: Arc<Mutex<BrokerState>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl InMemoryBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(BrokerState::default())),
        }
    }

    fn topic_arn(&self, name: &str) -> TopicArn {
        TopicArn::new(format!(
            "arn:aws:sns:{}:{}:{name}",
            self.config.region, self.config.account_id
        ))
    }

    fn queue_url(&self, name: &str) -> QueueUrl {
        QueueUrl::new(format!(
            "https://sqs.{}.amazonaws.com/{}/{name}",
            self.config.region, self.config.account_id
        ))
    }

    fn queue_arn(&self, name: &str) -> QueueArn {
        QueueArn::new(format!(
            "arn:aws:sqs:{}:{}:{name}",
            self.config.region, self.config.account_id
        ))
    }

    /// Runs `work` against the broker state on a spawned task.
    fn execute<T, F>(&self, work: F) -> AsyncOperation<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut BrokerState) -> OperationResult<T> + Send + 'static,
    {
        let state = self.state.clone();
        AsyncOperation::spawn(async move {
            let mut state = state.lock().await;
            work(&mut state)
        })
    }

    /// Messages waiting to be received. Zero for an unknown queue.
    pub async fn visible_messages(&self, queue: &QueueUrl) -> usize {
        let state = self.state.lock().await;
        state.queues.get(queue).map_or(0, |q| q.visible.len())
    }

    /// Messages received but not yet deleted. Zero for an unknown queue.
    pub async fn in_flight_messages(&self, queue: &QueueUrl) -> usize {
        let state = self.state.lock().await;
        state.queues.get(queue).map_or(0, |q| q.in_flight.len())
    }
}

impl MessagingProvider for InMemoryBroker {
    fn create_topic(&self, name: &str) -> AsyncOperation<TopicArn> {
        let name = name.to_string();
        let arn = self.topic_arn(&name);
        self.execute(move |state| {
            require_name("Topic", &name)?;
            state.topics.entry(arn.clone()).or_default();
            Ok(arn)
        })
    }

    fn create_queue(&self, name: &str) -> AsyncOperation<QueueUrl> {
        let name = name.to_string();
        let url = self.queue_url(&name);
        let arn = self.queue_arn(&name);
        self.execute(move |state| {
            require_name("Queue", &name)?;
            state.queues.entry(url.clone()).or_insert_with(|| QueueState {
                arn,
                visible: VecDeque::new(),
                in_flight: HashMap::new(),
                policy: None,
            });
            Ok(url)
        })
    }

    fn get_queue_arn(&self, queue: &QueueUrl) -> AsyncOperation<QueueArn> {
        let queue = queue.clone();
        self.execute(move |state| Ok(state.queue_mut(&queue)?.arn.clone()))
    }

    fn subscribe(
        &self,
        topic: &TopicArn,
        protocol: &str,
        endpoint: &QueueArn,
    ) -> AsyncOperation<SubscriptionArn> {
        let topic = topic.clone();
        let protocol = protocol.to_string();
        let endpoint = endpoint.clone();
        self.execute(move |state| {
            if protocol != SQS_PROTOCOL {
                return Err(ProviderError::InvalidRequest(format!(
                    "Unsupported protocol: {protocol}"
                )));
            }
            if !state.queues.values().any(|q| q.arn == endpoint) {
                return Err(ProviderError::NotFound(endpoint.to_string()));
            }
            let id = state.next_id();
            let subscriptions = &mut state
                .topics
                .get_mut(&topic)
                .ok_or_else(|| ProviderError::NotFound(topic.to_string()))?
                .subscriptions;

            if let Some((existing, _)) = subscriptions.iter().find(|(_, q)| *q == endpoint) {
                return Ok(existing.clone());
            }
            let arn = SubscriptionArn::new(format!("{topic}:subscription-{id}"));
            subscriptions.push((arn.clone(), endpoint));
            Ok(arn)
        })
    }

    fn set_queue_policy(&self, queue: &QueueUrl, policy: &str) -> AsyncOperation<()> {
        let queue = queue.clone();
        let policy = PolicyDocument::from_json(policy)
            .map_err(|e| ProviderError::InvalidRequest(format!("Malformed policy: {e}")));
        self.execute(move |state| {
            let policy = policy?;
            state.queue_mut(&queue)?.policy = Some(policy);
            Ok(())
        })
    }

    fn receive_batch(&self, queue: &QueueUrl, max_items: usize) -> AsyncOperation<Vec<Message>> {
        let queue = queue.clone();
        self.execute(move |state| {
            if !(1..=MAX_RECEIVE_BATCH).contains(&max_items) {
                return Err(ProviderError::InvalidRequest(format!(
                    "max_items must be between 1 and {MAX_RECEIVE_BATCH}, got {max_items}"
                )));
            }
            let first_receipt = state.next_id;
            let target = state.queue_mut(&queue)?;
            let take = max_items.min(target.visible.len());

            let mut batch = Vec::with_capacity(take);
            for (offset, stored) in target.visible.drain(..take).enumerate() {
                let serial = first_receipt + offset as u64 + 1;
                let receipt_handle = ReceiptHandle::new(format!("{}#{serial}", stored.message_id));
                batch.push(Message {
                    message_id: stored.message_id.clone(),
                    body: stored.body.clone(),
                    receipt_handle: receipt_handle.clone(),
                });
                target.in_flight.insert(receipt_handle, stored);
            }
            state.next_id += take as u64;
            Ok(batch)
        })
    }

    fn delete_message(&self, queue: &QueueUrl, receipt: &ReceiptHandle) -> AsyncOperation<()> {
        let queue = queue.clone();
        let receipt = receipt.clone();
        self.execute(move |state| {
            state
                .queue_mut(&queue)?
                .in_flight
                .remove(&receipt)
                .map(|_| ())
                .ok_or_else(|| ProviderError::NotFound(receipt.to_string()))
        })
    }

    fn publish(&self, topic: &TopicArn, body: &str) -> AsyncOperation<MessageId> {
        let topic = topic.clone();
        let body = body.to_string();
        self.execute(move |state| {
            let message_id = MessageId::new(format!("{:016x}", state.next_id()));
            let endpoints: Vec<QueueArn> = state
                .topics
                .get(&topic)
                .ok_or_else(|| ProviderError::NotFound(topic.to_string()))?
                .subscriptions
                .iter()
                .map(|(_, endpoint)| endpoint.clone())
                .collect();

            for queue in state.queues.values_mut() {
                if !endpoints.contains(&queue.arn) {
                    continue;
                }
                let allowed = queue
                    .policy
                    .as_ref()
                    .is_some_and(|policy| policy.allows_source(&queue.arn, &topic));
                if !allowed {
                    debug!(%topic, queue = %queue.arn, "Delivery not allowed by queue policy");
                    continue;
                }
                queue.visible.push_back(StoredMessage {
                    message_id: message_id.clone(),
                    body: body.clone(),
                });
            }
            Ok(message_id)
        })
    }
}

//! # Setup Steps
//!
//! The five provider calls that prepare a topic-to-queue route, each wrapped as a
//! [`PipelineStep`] over [`SharedContext`]:
//!
//! 1. [`CreateTopic`] writes the topic ARN
//! 2. [`CreateQueue`] writes the queue URL
//! 3. [`GetQueueArn`] reads the queue URL, writes the queue ARN
//! 4. [`Subscribe`] reads both ARNs, writes the subscription ARN
//! 5. [`SetQueuePolicy`] reads the queue URL and both ARNs, installs the policy
//!
//! [`setup_sequence`] assembles them in that order.

use crate::lifecycle::config::AppConfig;
use crate::model::{PolicyDocument, SharedContext};
use async_trait::async_trait;
use pubsub_flow::{MessagingProvider, PipelineStep, ProviderError, StepError, StepSequencer};
use std::sync::Arc;
use tracing::{debug, info};

pub struct CreateTopic<P> {
    provider: Arc<P>,
    name: String,
}

impl<P> CreateTopic<P> {
    pub fn new(provider: Arc<P>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }
}

#[async_trait]
impl<P: MessagingProvider> PipelineStep<SharedContext> for CreateTopic<P> {
    fn name(&self) -> &'static str {
        "create_topic"
    }

    async fn execute(&self, ctx: &mut SharedContext) -> Result<(), StepError> {
        let topic_arn = self.provider.create_topic(&self.name).await?;
        info!(name = %self.name, %topic_arn, "Topic created");
        ctx.set_topic_arn(topic_arn)
    }
}

pub struct CreateQueue<P> {
    provider: Arc<P>,
    name: String,
}

impl<P> CreateQueue<P> {
    pub fn new(provider: Arc<P>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }
}

#[async_trait]
impl<P: MessagingProvider> PipelineStep<SharedContext> for CreateQueue<P> {
    fn name(&self) -> &'static str {
        "create_queue"
    }

    async fn execute(&self, ctx: &mut SharedContext) -> Result<(), StepError> {
        let queue_url = self.provider.create_queue(&self.name).await?;
        info!(name = %self.name, %queue_url, "Queue created");
        ctx.set_queue_url(queue_url)
    }
}

pub struct GetQueueArn<P> {
    provider: Arc<P>,
}

impl<P> GetQueueArn<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: MessagingProvider> PipelineStep<SharedContext> for GetQueueArn<P> {
    fn name(&self) -> &'static str {
        "get_queue_arn"
    }

    async fn execute(&self, ctx: &mut SharedContext) -> Result<(), StepError> {
        let queue_arn = self.provider.get_queue_arn(ctx.queue_url()?).await?;
        info!(%queue_arn, "Queue ARN resolved");
        ctx.set_queue_arn(queue_arn)
    }
}

pub struct Subscribe<P> {
    provider: Arc<P>,
    protocol: String,
}

impl<P> Subscribe<P> {
    pub fn new(provider: Arc<P>, protocol: impl Into<String>) -> Self {
        Self {
            provider,
            protocol: protocol.into(),
        }
    }
}

#[async_trait]
impl<P: MessagingProvider> PipelineStep<SharedContext> for Subscribe<P> {
    fn name(&self) -> &'static str {
        "subscribe"
    }

    async fn execute(&self, ctx: &mut SharedContext) -> Result<(), StepError> {
        let subscription_arn = self
            .provider
            .subscribe(ctx.topic_arn()?, &self.protocol, ctx.queue_arn()?)
            .await?;
        info!(%subscription_arn, protocol = %self.protocol, "Queue subscribed to topic");
        ctx.set_subscription_arn(subscription_arn)
    }
}

pub struct SetQueuePolicy<P> {
    provider: Arc<P>,
}

impl<P> SetQueuePolicy<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: MessagingProvider> PipelineStep<SharedContext> for SetQueuePolicy<P> {
    fn name(&self) -> &'static str {
        "set_queue_policy"
    }

    async fn execute(&self, ctx: &mut SharedContext) -> Result<(), StepError> {
        let millis = chrono::Utc::now().timestamp_millis();
        let policy = PolicyDocument::allow_topic(ctx.queue_arn()?, ctx.topic_arn()?, millis)
            .to_json()
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
        debug!(%policy, "Installing queue policy");

        self.provider
            .set_queue_policy(ctx.queue_url()?, &policy)
            .await?;
        info!("Queue policy installed");
        ctx.mark_policy_installed()
    }
}

/// The setup steps in dependency order.
pub fn setup_sequence<P: MessagingProvider>(
    provider: &Arc<P>,
    config: &AppConfig,
) -> StepSequencer<SharedContext> {
    StepSequencer::new()
        .then(CreateTopic::new(provider.clone(), &config.topic_name))
        .then(CreateQueue::new(provider.clone(), &config.queue_name))
        .then(GetQueueArn::new(provider.clone()))
        .then(Subscribe::new(provider.clone(), &config.protocol))
        .then(SetQueuePolicy::new(provider.clone()))
}

//! Publishes messages one at a time, each call returning only once the provider
//! has confirmed the publish.

use crate::error::FlowError;
use crate::provider::{MessageId, MessagingProvider, TopicArn};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};

/// Serializes publishes to a single topic.
///
/// `publish` takes `&mut self`, so the borrow checker rules out a second
/// publish being issued before the first has resolved.
pub struct PublishGate<P> {
    provider: Arc<P>,
    topic: TopicArn,
    timeout: Option<Duration>,
    published: u64,
}

impl<P: MessagingProvider> PublishGate<P> {
    pub fn new(provider: Arc<P>, topic: TopicArn) -> Self {
        Self {
            provider,
            topic,
            timeout: None,
            published: 0,
        }
    }

    /// Bounds how long a single publish may take. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of publishes that have completed successfully.
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn topic(&self) -> &TopicArn {
        &self.topic
    }

    /// Publishes `body` and waits for the provider to confirm it.
    pub async fn publish(&mut self, body: &str) -> Result<MessageId, FlowError> {
        let sequence = self.published + 1;
        let span = info_span!("publish", topic = %self.topic, sequence);
        let operation = self.provider.publish(&self.topic, body);

        let outcome = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, operation).await {
                    Ok(result) => result.map_err(FlowError::PublishFailed),
                    Err(_) => Err(FlowError::PublishTimeout(limit)),
                },
                None => operation.await.map_err(FlowError::PublishFailed),
            }
        }
        .instrument(span)
        .await;

        match outcome {
            Ok(message_id) => {
                self.published = sequence;
                debug!(%message_id, sequence, "Published");
                Ok(message_id)
            }
            Err(e) => {
                warn!(sequence, error = %e, "Publish failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::mock::MockProvider;

    #[tokio::test]
    async fn test_counts_successful_publishes() {
        let mock = Arc::new(MockProvider::new());
        mock.expect_publish()
            .return_err(ProviderError::AccessDenied("topic".into()));
        let mut gate = PublishGate::new(mock.clone(), TopicArn::new("arn:topic"));

        assert!(matches!(
            gate.publish("first").await,
            Err(FlowError::PublishFailed(ProviderError::AccessDenied(_)))
        ));
        gate.publish("second").await.unwrap();

        assert_eq!(gate.published(), 1);
        assert_eq!(mock.published_bodies(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_timeout_bounds_a_stuck_publish() {
        let mock = Arc::new(MockProvider::new());
        mock.expect_publish().never();
        let mut gate = PublishGate::new(mock, TopicArn::new("arn:topic"))
            .with_timeout(Some(Duration::from_millis(20)));

        let err = gate.publish("stuck").await.unwrap_err();
        assert!(matches!(err, FlowError::PublishTimeout(limit) if limit == Duration::from_millis(20)));
        assert_eq!(gate.published(), 0);
    }
}
